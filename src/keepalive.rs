use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::KeepAliveSpec, error::PtunError, notice::FailureNotice, transport::Transport,
};

/// Probe the transport's liveness until the attempt ends.
///
/// No-op when either keep-alive setting is 0. On every tick the miss counter
/// is incremented before the probe goes out; a probe reply resets it to 0.
/// Once the counter exceeds `count_max` the transport is force-closed, which
/// cascades into the session teardown. Probes are fire-and-forget: a slow
/// peer never blocks the ticker.
pub async fn run_monitor<T: Transport>(
    spec: KeepAliveSpec,
    transport: Arc<T>,
    cancel: CancellationToken,
    notice: FailureNotice,
    label: String,
) {
    if spec.interval == 0 || spec.count_max == 0 {
        return;
    }

    let misses = Arc::new(AtomicU32::new(0));
    let mut ticker = tokio::time::interval(Duration::from_secs(spec.interval));
    ticker.tick().await; // Skip the immediate first tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = transport.closed() => {
                if notice.first() {
                    debug!("({label}) SSH session closed by peer");
                }
                return;
            }
            _ = ticker.tick() => {
                let count = misses.fetch_add(1, Ordering::SeqCst) + 1;
                if count > spec.count_max {
                    if notice.first() {
                        warn!("({label}) {}", PtunError::KeepAliveTimeout);
                    }
                    transport.close().await;
                    return;
                }

                let transport = Arc::clone(&transport);
                let misses = Arc::clone(&misses);
                tokio::spawn(async move {
                    if transport.probe().await.is_ok() {
                        misses.store(0, Ordering::SeqCst);
                    }
                });
            }
        }
    }
}
