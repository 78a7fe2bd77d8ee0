use clap::{Parser, Subcommand};
use failsafe_pipeline::simulator::http::{serve, SimulatorState};
use failsafe_pipeline::simulator::{DeterministicSimulator, RandomSimulator, DEFAULT_FAILURES};
use failsafe_pipeline::telemetry::{LogSink, Telemetry};
use failsafe_pipeline::{
    presets, HttpTransport, InMemoryCircuitBreakerRegistry, Request, ResilienceConfig,
    ResilientService, TerminalResult,
};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "inventory-sim")]
#[command(about = "Failure simulator and resilience pipeline driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the failure simulator over HTTP
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:7168")]
        bind: String,
        /// Calls that fail before the deterministic endpoint recovers
        #[arg(short, long, default_value_t = DEFAULT_FAILURES)]
        failures: u64,
        /// Seed for the random endpoint
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Call a simulator through the inventory pipeline
    Call {
        #[arg(short, long, default_value = "http://127.0.0.1:7168")]
        url: String,
        #[arg(short, long, default_value = "/api/inventory")]
        path: String,
        /// TOML resilience configuration; defaults plus RESILIENCE__* overrides when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Logical calls to make
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "failsafe_pipeline=info,inventory_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Commands::Serve { bind, failures, seed } => {
            let random = seed.map(RandomSimulator::seeded).unwrap_or_default();
            let state = SimulatorState::new(DeterministicSimulator::new(failures), random);
            let listener = TcpListener::bind(&bind).await?;
            serve(listener, state, shutdown_signal()).await?;
        }
        Commands::Call { url, path, config, count } => {
            let config = match config {
                Some(path) => ResilienceConfig::load(&path)?,
                None => ResilienceConfig::from_env()?,
            };
            let telemetry = Telemetry::new(LogSink);
            let registry = InMemoryCircuitBreakerRegistry::new().with_telemetry(telemetry.clone());
            let stack = presets::inventory(&config, &registry, &telemetry)?;
            let svc = ResilientService::new(HttpTransport::new(url), stack);

            for n in 1..=count {
                match svc.execute(Request::get(path.as_str())).await {
                    TerminalResult::Success(resp) => {
                        println!("#{n} {} {}", resp.status(), resp.body())
                    }
                    TerminalResult::FallbackServed { response, reason } => {
                        println!("#{n} {} {} (fallback: {reason})", response.status(), response.body())
                    }
                    TerminalResult::Failed(e) => println!("#{n} failed: {e}"),
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
