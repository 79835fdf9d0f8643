use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use students_disciplines::config::{Config, Environment};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present (may supply CONFIG_PATH)
    let _ = dotenvy::dotenv();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    tracing::info!(env = ?config.env, "Starting students-disciplines");

    match students_disciplines::run(config).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "Stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.env {
        Environment::Prod => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init(),
        Environment::Local | Environment::Dev => {
            tracing_subscriber::fmt().with_env_filter(filter).init()
        }
    }
}
