use ptun::{KeepAliveSpec, Supervisor, TunnelSpec};
use tokio_util::sync::CancellationToken;

/// Example: Create a tunnel spec programmatically and run it
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    ptun::init_logging()?;

    // Create the tunnel spec programmatically
    let spec = TunnelSpec {
        host: "example.com".to_string(),
        port: 22,
        user: "username".to_string(),
        password: None,
        identity_key_path: None,
        bind_port: 3306,
        forward_port: 13306,
        keep_alive: KeepAliveSpec {
            interval: 15,
            count_max: 4,
        },
    };

    println!("Starting tunnel {spec}... (Press Ctrl+C to stop)");

    let root = CancellationToken::new();
    let shutdown = root.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.cancel();
    });

    Supervisor::new(spec)?.start(root).await;

    Ok(())
}
