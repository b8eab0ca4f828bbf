//! ptun - self-healing SSH port-forwarding tunnel
//!
//! Listens on a local address and, for every inbound connection, asks the
//! remote SSH peer to open a connection to a target address only reachable
//! from the peer's network, then splices bytes between the two sockets until
//! either side closes.
//!
//! # Features
//!
//! - Local TCP forwarding over a native SSH transport (password or key auth)
//! - Keep-alive probing that force-closes dead sessions
//! - Automatic reconnection with a fixed backoff
//! - Graceful shutdown that drains in-flight connections
//! - JSON configuration support
//! - Structured logging with tracing
//!
//! # Example
//!
//! ```rust,no_run
//! use ptun::{Supervisor, TunnelSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let spec = TunnelSpec::from_file("tunnel.json")?;
//!
//!     let root = CancellationToken::new();
//!     let shutdown = root.clone();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         shutdown.cancel();
//!     });
//!
//!     Supervisor::new(spec)?.start(root).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod keepalive;
pub mod notice;
pub mod proxy;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use config::{KeepAliveSpec, TunnelSpec};
pub use error::{PtunError, PtunResult};
pub use supervisor::Supervisor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with tracing
pub fn init_logging() -> PtunResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ptun=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| PtunError::Config(e.to_string()))?;

    Ok(())
}
