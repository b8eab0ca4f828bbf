use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    config::TunnelSpec,
    error::PtunResult,
    session::ForwardingSession,
    transport::{Connector, SshConnector},
};

/// Fixed delay between consecutive bind attempts
pub const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Supervisor state between bind attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Backoff,
}

/// Outer retry loop for one tunnel.
///
/// Runs bind attempts serially, sleeping a fixed backoff between them, until
/// the root token is cancelled. Attempt failures never escape the loop; the
/// next attempt starts from a clean slate with a fresh transport and
/// listener.
pub struct Supervisor<C: Connector = SshConnector> {
    spec: TunnelSpec,
    connector: C,
    backoff: Duration,
}

impl Supervisor<SshConnector> {
    /// Create a supervisor dialing real SSH transports
    pub fn new(spec: TunnelSpec) -> PtunResult<Self> {
        Self::with_connector(spec, SshConnector)
    }
}

impl<C: Connector> Supervisor<C> {
    /// Create a supervisor with a custom transport connector
    ///
    /// A spec that fails validation is rejected here, before the retry loop
    /// can start.
    pub fn with_connector(spec: TunnelSpec, connector: C) -> PtunResult<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            connector,
            backoff: RETRY_BACKOFF,
        })
    }

    /// Run the tunnel until `root` is cancelled.
    ///
    /// On cancellation no new attempt starts, and the current attempt's
    /// teardown finishes before this returns.
    pub async fn start(&self, root: CancellationToken) {
        let label = self.spec.to_string();
        info!("({label}) starting");

        let mut state = State::Connecting;
        while !root.is_cancelled() {
            state = match state {
                State::Connecting => {
                    let session = ForwardingSession::new(&self.spec, &self.connector);
                    session.run(&root).await;
                    State::Backoff
                }
                State::Backoff => {
                    if root.is_cancelled() {
                        break;
                    }
                    info!("({label}) retrying in {:?}", self.backoff);
                    tokio::select! {
                        _ = root.cancelled() => break,
                        _ = tokio::time::sleep(self.backoff) => State::Connecting,
                    }
                }
            };
        }

        info!("({label}) shutdown");
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{config::KeepAliveSpec, transport::fake::FakeConnector};

    fn test_spec() -> TunnelSpec {
        TunnelSpec {
            host: "192.0.2.10".to_string(),
            port: 22,
            user: "pi".to_string(),
            password: None,
            identity_key_path: None,
            bind_port: 3306,
            forward_port: 0, // ephemeral listen port
            keep_alive: KeepAliveSpec::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_with_fixed_backoff_then_stabilizes() {
        let supervisor = std::sync::Arc::new(
            Supervisor::with_connector(test_spec(), FakeConnector::new(2)).unwrap(),
        );
        let root = CancellationToken::new();

        let task = tokio::spawn({
            let supervisor = std::sync::Arc::clone(&supervisor);
            let root = root.clone();
            async move { supervisor.start(root).await }
        });

        // Two failing attempts separated by the fixed backoff, then success.
        sleep(2 * RETRY_BACKOFF + Duration::from_secs(1)).await;
        assert_eq!(supervisor.connector.attempt_count(), 3);

        // The healthy session keeps serving; no further attempts.
        sleep(10 * RETRY_BACKOFF).await;
        assert_eq!(supervisor.connector.attempt_count(), 3);

        root.cancel();
        timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor did not stop after root cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_with_connector_rejects_invalid_spec() {
        let mut spec = test_spec();
        spec.host = String::new();

        assert!(Supervisor::with_connector(spec, FakeConnector::new(0)).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_root_prevents_any_attempt() {
        let supervisor = Supervisor::with_connector(test_spec(), FakeConnector::new(0)).unwrap();
        let root = CancellationToken::new();
        root.cancel();

        timeout(Duration::from_secs(1), supervisor.start(root))
            .await
            .expect("supervisor did not return for a cancelled root");

        assert_eq!(supervisor.connector.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleep_aborts_on_cancellation() {
        let supervisor = std::sync::Arc::new(
            Supervisor::with_connector(test_spec(), FakeConnector::new(u32::MAX)).unwrap(),
        );
        let root = CancellationToken::new();

        let task = tokio::spawn({
            let supervisor = std::sync::Arc::clone(&supervisor);
            let root = root.clone();
            async move { supervisor.start(root).await }
        });

        // Land inside the first backoff sleep, then cancel.
        sleep(Duration::from_secs(1)).await;
        assert_eq!(supervisor.connector.attempt_count(), 1);
        root.cancel();

        timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor blocked through the backoff sleep")
            .unwrap();
        assert_eq!(supervisor.connector.attempt_count(), 1);
    }
}
