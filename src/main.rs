use std::process::ExitCode;

use tracing::{error, warn};
use waypost::api::{self, v0};
use waypost::{Router, Server, ServerConfig, shutdown_signal, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    // Before the subscriber, so RUST_LOG from .env applies.
    let dotenv = dotenvy::dotenv();
    telemetry::init();
    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!(error = %e, "failed to load .env");
        }
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), waypost::Error> {
    // Installed before the listener binds, so an early SIGINT still drains.
    let shutdown = shutdown_signal();
    let config = ServerConfig::from_env()?;
    let router = Router::new().version(api::V0_PREFIX, v0::routes());
    Server::new(config, router).run(shutdown).await
}
