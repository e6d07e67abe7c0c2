use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_worker::types::environment::Environment;
use relay_worker::worker::RelayWorker;
use relay_worker::{bot, health};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Get environment
    let env = Environment::from_env();
    info!("Starting outbox relay worker in {:?} environment", env);

    // Create the worker; a missing credential is fatal here
    let worker = match RelayWorker::new(env.clone()).await {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to create relay worker: {:#}", e);
            return Err(e);
        }
    };

    // Get shutdown token for signal handling
    let shutdown_token = worker.shutdown_token();

    // Start health check server
    let health_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = health::start_health_server(health_shutdown).await {
            error!("Health server error: {}", e);
        }
    });

    // Start the Telegram command listener
    tokio::spawn(bot::run_command_listener(
        worker.bot(),
        shutdown_token.clone(),
    ));

    // Spawn signal handler
    tokio::spawn(shutdown_signal(shutdown_token));

    // Run the worker
    if let Err(e) = worker.start().await {
        error!("Worker error: {}", e);
        return Err(e);
    }

    info!("Outbox relay worker stopped");
    Ok(())
}

/// Cancels the shutdown token on SIGTERM or Ctrl+C
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
}
