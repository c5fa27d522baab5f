use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use stream_relay::audit::{AuditPipeline, AuditStore};
use stream_relay::config::load_config;
use stream_relay::lifecycle::{signals, Shutdown};
use stream_relay::observability::{logging, metrics};
use stream_relay::{GatewayServer, RelayEngine};

/// Streaming reverse proxy for token and audio APIs.
#[derive(Debug, Parser)]
#[command(name = "stream-relay", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stream-relay: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli.config)?;
    if cli.check {
        println!(
            "{}: configuration OK ({} routes)",
            cli.config.display(),
            config.routes.len()
        );
        return Ok(());
    }

    let _log_guard = logging::init(&config.observability.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "stream-relay starting");
    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.server.bind_address,
        routes = config.routes.len(),
        rate_limit = config.rate_limit.enabled,
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    let audit = AuditPipeline::new(AuditStore::from_config(&config.storage));
    let engine = Arc::new(RelayEngine::new(&config, audit)?);

    let shutdown = Shutdown::new();
    let mut server = GatewayServer::new(&config, engine, shutdown.clone());
    if config.observability.metrics_enabled {
        match metrics::install_recorder() {
            Ok(handle) => server = server.with_metrics(handle),
            Err(e) => tracing::error!(error = %e, "Failed to install metrics recorder"),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    signals::spawn_signal_handler(shutdown);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
