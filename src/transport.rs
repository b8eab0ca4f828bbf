use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use russh::{
    Disconnect,
    client::{self, DisconnectReason},
    keys::{self, PrivateKeyWithHashAlg},
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    config::TunnelSpec,
    error::{PtunError, PtunResult},
};

/// Timeout for the TCP connect and SSH handshake of one attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Byte stream carried over the transport
pub trait TransportIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> TransportIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type alias for boxed transport streams
pub type TransportStream = Box<dyn TransportIo>;

/// One authenticated connection to the remote peer
///
/// The trait is the seam between the tunnel machinery and russh: the
/// keep-alive monitor, proxies, and supervisor only see these four
/// operations, so tests drive them with fakes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a TCP connection to `host:port` as resolved from the remote
    /// peer's network
    async fn dial(&self, host: &str, port: u16) -> PtunResult<TransportStream>;

    /// Send one liveness probe; Ok means the peer acknowledged it
    async fn probe(&self) -> PtunResult<()>;

    /// Resolves once the peer has closed the session
    async fn closed(&self);

    /// Force-close the session. Idempotent.
    async fn close(&self);
}

/// Builds a fresh authenticated transport for each bind attempt
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self, spec: &TunnelSpec) -> PtunResult<Arc<Self::Transport>>;
}

/// Client handler: accepts any host key and flags peer-initiated closure
struct ClientHandler {
    closed: CancellationToken,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn disconnected(
        &mut self,
        reason: DisconnectReason<Self::Error>,
    ) -> Result<(), Self::Error> {
        debug!("SSH session disconnected: {:?}", reason);
        self.closed.cancel();
        match reason {
            DisconnectReason::ReceivedDisconnect(_) => Ok(()),
            DisconnectReason::Error(e) => Err(e),
        }
    }
}

/// SSH transport session backed by a russh client
pub struct SshTransport {
    handle: client::Handle<ClientHandler>,
    closed: CancellationToken,
}

impl SshTransport {
    /// Dial the SSH server and authenticate with the spec's credentials
    ///
    /// Password wins over the identity key when both are present; having
    /// neither resolvable fails here, not during validation.
    pub async fn connect(spec: &TunnelSpec) -> PtunResult<Self> {
        let mut config = client::Config::default();
        config.nodelay = true;
        let config = Arc::new(config);

        let closed = CancellationToken::new();
        let handler = ClientHandler {
            closed: closed.clone(),
        };

        let addr = format!("{}:{}", spec.host, spec.port());
        let mut handle =
            match tokio::time::timeout(CONNECT_TIMEOUT, client::connect(config, &addr, handler))
                .await
            {
                Ok(Ok(handle)) => handle,
                Ok(Err(e)) => return Err(PtunError::Auth(format!("SSH dial error: {e}"))),
                Err(_) => {
                    return Err(PtunError::Auth(format!(
                        "SSH dial to {addr} timed out after {CONNECT_TIMEOUT:?}"
                    )));
                }
            };

        let authenticated = if let Some(password) = spec.password() {
            handle
                .authenticate_password(spec.user(), password)
                .await?
                .success()
        } else if let Some(key_path) = spec.identity_key_path() {
            let key = keys::load_secret_key(&key_path, None).map_err(|e| {
                PtunError::Auth(format!("Cannot load identity key {}: {e}", key_path.display()))
            })?;
            let key = PrivateKeyWithHashAlg::new(
                Arc::new(key),
                handle.best_supported_rsa_hash().await?.flatten(),
            );
            handle
                .authenticate_publickey(spec.user(), key)
                .await?
                .success()
        } else {
            false
        };

        if !authenticated {
            return Err(PtunError::Auth(format!(
                "Authentication failed for {}@{}",
                spec.user(),
                spec.host
            )));
        }

        Ok(Self { handle, closed })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn dial(&self, host: &str, port: u16) -> PtunResult<TransportStream> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(host, port.into(), "127.0.0.1", 0)
            .await
            .map_err(|e| PtunError::Dial(e.to_string()))?;

        Ok(Box::new(channel.into_stream()))
    }

    async fn probe(&self) -> PtunResult<()> {
        if self.handle.is_closed() {
            return Err(PtunError::Ssh("session closed".to_string()));
        }

        self.handle
            .send_keepalive(true)
            .await
            .map_err(|e| PtunError::Ssh(e.to_string()))
    }

    async fn closed(&self) {
        self.closed.cancelled().await;
    }

    async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        self.closed.cancel();
    }
}

/// Connector producing real SSH transports
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    type Transport = SshTransport;

    async fn connect(&self, spec: &TunnelSpec) -> PtunResult<Arc<SshTransport>> {
        Ok(Arc::new(SshTransport::connect(spec).await?))
    }
}
