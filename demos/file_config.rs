use ptun::{Supervisor, TunnelSpec};
use tokio_util::sync::CancellationToken;

/// Example: Load a tunnel spec from file and run it
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    ptun::init_logging()?;

    // Load the tunnel spec from file
    let spec = TunnelSpec::from_file("tunnel.json")?;

    println!("Loaded tunnel spec:");
    println!("  Remote: {}@{}:{}", spec.user(), spec.host, spec.port());
    println!("  Forwarding: {} -> {}", spec.bind_addr(), spec.dial_addr());

    let root = CancellationToken::new();
    let shutdown = root.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.cancel();
    });

    println!("Starting tunnel... (Press Ctrl+C to stop)");

    // Runs until the root token is cancelled
    Supervisor::new(spec)?.start(root).await;

    Ok(())
}
