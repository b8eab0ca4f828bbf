use std::path::PathBuf;

use clap::{Arg, Command};
use ptun::{Supervisor, TunnelSpec};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    ptun::init_logging()?;

    let matches = Command::new("ptun")
        .version("0.1.0")
        .about("Self-healing SSH port-forwarding tunnel")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Tunnel configuration file path")
                .required(true),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .expect("config argument is required");
    let config_path = PathBuf::from(config_path);

    // A configuration error here is fatal; the retry loop never starts.
    let spec = TunnelSpec::from_file(&config_path)?;

    info!("Loaded configuration from {}", config_path.display());
    info!("Tunnel: {}", spec);

    let root = CancellationToken::new();
    let shutdown = root.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, draining...");
        shutdown.cancel();
    });

    // Blocks until the root token fires and the current attempt has drained.
    Supervisor::new(spec)?.start(root).await;

    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = signal::ctrl_c().await;
}
