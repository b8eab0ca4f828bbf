use std::sync::Arc;

use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::TunnelSpec,
    error::PtunError,
    keepalive,
    notice::FailureNotice,
    proxy,
    transport::{Connector, Transport},
};

/// One bind attempt: authenticate, bind the local listener, serve.
///
/// The session exclusively owns its transport and listener; every exit path
/// (accept error, peer disconnect, keep-alive termination, outer shutdown)
/// converges on the same teardown: cancel the attempt scope, release the
/// listener and transport, wait for in-flight proxies to drain. At most one
/// failure notice is emitted per attempt no matter how many detectors fire.
pub struct ForwardingSession<'a, C: Connector> {
    spec: &'a TunnelSpec,
    connector: &'a C,
    label: String,
    notice: FailureNotice,
    #[cfg(test)]
    reaped: std::sync::atomic::AtomicUsize,
}

impl<'a, C: Connector> ForwardingSession<'a, C> {
    pub fn new(spec: &'a TunnelSpec, connector: &'a C) -> Self {
        Self {
            spec,
            connector,
            label: spec.to_string(),
            notice: FailureNotice::new(),
            #[cfg(test)]
            reaped: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Run the attempt to completion. Failures are reported, not returned;
    /// the supervisor decides whether to retry.
    pub async fn run(&self, root: &CancellationToken) {
        let transport = tokio::select! {
            _ = root.cancelled() => return,
            connected = self.connector.connect(self.spec) => match connected {
                Ok(transport) => transport,
                Err(err) => {
                    self.report(&err);
                    return;
                }
            },
        };

        let listener = match TcpListener::bind(self.spec.bind_addr()).await {
            Ok(listener) => listener,
            Err(err) => {
                self.report(&PtunError::Bind(err.to_string()));
                transport.close().await;
                return;
            }
        };

        let attempt = root.child_token();
        let monitor = tokio::spawn(keepalive::run_monitor(
            self.spec.keep_alive.clone(),
            Arc::clone(&transport),
            attempt.clone(),
            self.notice.clone(),
            self.label.clone(),
        ));

        info!("({}) bound tunnel", self.label);

        let mut proxies = JoinSet::new();
        loop {
            tokio::select! {
                _ = attempt.cancelled() => {
                    // Intentional closure, not a fault.
                    self.notice.suppress();
                    break;
                }
                _ = transport.closed() => {
                    if self.notice.first() {
                        info!("({}) SSH session closed by peer", self.label);
                    }
                    break;
                }
                // Reap finished proxies so the set stays bounded by the number
                // of live connections, not the attempt's lifetime total.
                Some(_) = proxies.join_next(), if !proxies.is_empty() => {
                    #[cfg(test)]
                    self.reaped.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        stream.set_nodelay(true).ok();
                        let transport = Arc::clone(&transport);
                        let scope = attempt.clone();
                        let label = self.label.clone();
                        let dial_port = self.spec.dial_port();
                        proxies.spawn(async move {
                            proxy::run_proxy(transport, stream, dial_port, scope, label).await;
                        });
                    }
                    Err(err) => {
                        self.report(&PtunError::Accept(err.to_string()));
                        break;
                    }
                },
            }
        }

        attempt.cancel();
        drop(listener);
        transport.close().await;
        let _ = monitor.await;
        while proxies.join_next().await.is_some() {}

        info!("({}) collapsed tunnel", self.label);
    }

    fn report(&self, err: &PtunError) {
        if self.notice.first() {
            warn!("({}) {err}", self.label);
        }
    }

    #[cfg(test)]
    pub(crate) fn notice(&self) -> &FailureNotice {
        &self.notice
    }

    #[cfg(test)]
    pub(crate) fn reaped(&self) -> usize {
        self.reaped.load(std::sync::atomic::Ordering::SeqCst)
    }
}
