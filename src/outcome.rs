//! Request/response descriptors and the terminal result handed back to callers.
//!
//! The pipeline never inspects payloads. It only looks at the status code of a [`Response`]
//! (and its optional retry hint) to decide whether an attempt succeeded, failed transiently, or
//! failed for good.

use crate::ResilienceError;
use std::fmt;
use std::time::Duration;

/// Abstract description of one outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    path: String,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self { method: method.into(), path: path.into() }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Response produced by the underlying call (or substituted by fallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: String,
    retry_after: Option<Duration>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into(), retry_after: None }
    }

    /// Attach a server-supplied retry hint.
    pub fn with_retry_after(mut self, hint: Duration) -> Self {
        self.retry_after = Some(hint);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_body(self) -> String {
        self.body
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 408, 429 and every 5xx are worth another try.
    pub fn is_transient(&self) -> bool {
        is_transient_status(self.status)
    }
}

/// Status codes treated as transient failures.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Likely to succeed if tried again; counts toward breaker failures.
    Transient,
    /// Caller error or otherwise not worth retrying; not an upstream health signal.
    NonTransient,
}

/// Why the fallback substituted the degraded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    CircuitOpen,
    Timeout,
    Transport,
    RetryExhausted,
    /// A failing status reached the fallback directly (no retry layer in the stack).
    UpstreamStatus(u16),
    /// The fallback was configured to handle this failure regardless of its classification.
    Other,
}

impl FallbackReason {
    pub(crate) fn of(error: &ResilienceError) -> Self {
        match error {
            ResilienceError::CircuitOpen { .. } => FallbackReason::CircuitOpen,
            ResilienceError::Timeout { .. } => FallbackReason::Timeout,
            ResilienceError::Transport(_) => FallbackReason::Transport,
            ResilienceError::RetryExhausted { .. } => FallbackReason::RetryExhausted,
            ResilienceError::Status(resp) if resp.status() >= 500 || resp.status() == 429 => {
                FallbackReason::UpstreamStatus(resp.status())
            }
            ResilienceError::Status(_) => FallbackReason::Other,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::CircuitOpen => write!(f, "circuit_open"),
            FallbackReason::Timeout => write!(f, "timeout"),
            FallbackReason::Transport => write!(f, "transport"),
            FallbackReason::RetryExhausted => write!(f, "retry_exhausted"),
            FallbackReason::UpstreamStatus(code) => write!(f, "upstream_status_{}", code),
            FallbackReason::Other => write!(f, "other"),
        }
    }
}

/// Final result of one logical call through the pipeline.
#[derive(Debug, Clone)]
pub enum TerminalResult {
    /// The upstream answered with a 2xx.
    Success(Response),
    /// Inner layers were exhausted or short-circuited; the degraded result was served instead.
    FallbackServed { response: Response, reason: FallbackReason },
    /// A failure outside the fallback's handled set (non-transient), surfaced unchanged.
    Failed(ResilienceError),
}

impl TerminalResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalResult::Success(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TerminalResult::FallbackServed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TerminalResult::Failed(_))
    }

    /// The response the caller should see, if there is one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            TerminalResult::Success(r) | TerminalResult::FallbackServed { response: r, .. } => {
                Some(r)
            }
            TerminalResult::Failed(_) => None,
        }
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            TerminalResult::FallbackServed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Collapse into a plain `Result`, treating a served fallback as `Ok`.
    pub fn into_result(self) -> Result<Response, ResilienceError> {
        match self {
            TerminalResult::Success(r) | TerminalResult::FallbackServed { response: r, .. } => Ok(r),
            TerminalResult::Failed(e) => Err(e),
        }
    }
}

impl From<Result<Response, ResilienceError>> for TerminalResult {
    fn from(result: Result<Response, ResilienceError>) -> Self {
        match result {
            Ok(r) => TerminalResult::Success(r),
            Err(e) => TerminalResult::Failed(e),
        }
    }
}
