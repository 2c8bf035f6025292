use anyhow::Context;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wss_relay::{RelayServer, Settings};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C elsewhere).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    init_tracing();

    let settings = Settings::new().context("failed to load configuration")?;
    info!(environment = %settings.environment, "Configuration loaded successfully");

    let relay = RelayServer::new(settings);
    relay.start().await.context("failed to start relay server")?;
    info!(address = %relay.address(), "Relay server listening on wss://{}/ws", relay.address());

    shutdown_signal().await.context("failed to listen for shutdown signals")?;
    info!("App shutting down...");

    relay.stop().await.context("failed to stop relay server")?;
    Ok(())
}
