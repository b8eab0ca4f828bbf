use std::sync::Arc;

use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::LOCAL_HOST, error::PtunError, notice::FailureNotice, transport::Transport};

/// Forward one accepted connection through the transport.
///
/// The outbound side is dialed from the remote peer's network. A dial
/// failure drops this connection only; the session keeps accepting. Errors
/// are reported at most once per connection.
pub async fn run_proxy<T, S>(
    transport: Arc<T>,
    inbound: S,
    dial_port: u16,
    parent: CancellationToken,
    label: String,
) where
    T: Transport,
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let cancel = parent.child_token();
    let notice = FailureNotice::new();

    let outbound = tokio::select! {
        _ = cancel.cancelled() => return,
        dialed = transport.dial(LOCAL_HOST, dial_port) => match dialed {
            Ok(stream) => stream,
            Err(err) => {
                if notice.first() {
                    warn!("({label}) {err}");
                }
                return;
            }
        },
    };

    info!("({label}) connection established");
    splice(inbound, outbound, cancel, &notice, &label).await;
    info!("({label}) connection closed");
}

/// Copy bytes in both directions until either side finishes.
///
/// The first direction to complete cancels the shared scope, which unblocks
/// the opposite direction's pending read; both write halves are shut down on
/// the way out so neither socket outlives the proxy.
pub async fn splice<A, B>(
    inbound: A,
    outbound: B,
    cancel: CancellationToken,
    notice: &FailureNotice,
    label: &str,
) where
    A: AsyncRead + AsyncWrite + Send + Unpin,
    B: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (mut in_rd, mut in_wr) = io::split(inbound);
    let (mut out_rd, mut out_wr) = io::split(outbound);

    let upstream = copy_direction(&mut in_rd, &mut out_wr, &cancel, notice, label);
    let downstream = copy_direction(&mut out_rd, &mut in_wr, &cancel, notice, label);
    tokio::join!(upstream, downstream);
}

async fn copy_direction<R, W>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancellationToken,
    notice: &FailureNotice,
    label: &str,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        copied = io::copy(reader, writer) => {
            if let Err(err) = copied
                && notice.first()
            {
                warn!("({label}) {}", PtunError::Copy(err.to_string()));
            }
            notice.suppress();
            let _ = writer.shutdown().await;
            cancel.cancel();
        }
        _ = cancel.cancelled() => {
            let _ = writer.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        time::timeout,
    };

    use super::*;
    use crate::transport::fake::FakeTransport;

    #[tokio::test]
    async fn test_splice_forwards_all_bytes_in_order() {
        let (inbound_near, inbound_far) = tokio::io::duplex(1024);
        let (outbound_near, outbound_far) = tokio::io::duplex(1024);

        let cancel = CancellationToken::new();
        let notice = FailureNotice::new();
        let proxy = tokio::spawn(async move {
            splice(inbound_far, outbound_near, cancel, &notice, "test").await;
        });

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let sender = tokio::spawn(async move {
            let mut inbound = inbound_near;
            inbound.write_all(&payload).await.unwrap();
            inbound.shutdown().await.unwrap();
            inbound
        });

        // The far side of the outbound stream plays the remote target.
        let mut received = Vec::new();
        let mut target = outbound_far;
        timeout(Duration::from_secs(5), target.read_to_end(&mut received))
            .await
            .expect("target never saw EOF")
            .unwrap();

        assert_eq!(received, expected);

        timeout(Duration::from_secs(5), proxy)
            .await
            .expect("proxy did not terminate")
            .unwrap();
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn test_splice_echo_round_trip() {
        let (inbound_near, inbound_far) = tokio::io::duplex(1024);
        let (outbound_near, outbound_far) = tokio::io::duplex(1024);

        let cancel = CancellationToken::new();
        let notice = FailureNotice::new();
        let proxy = tokio::spawn(async move {
            splice(inbound_far, outbound_near, cancel, &notice, "test").await;
        });

        let echo = tokio::spawn(async move {
            let (mut rd, mut wr) = io::split(outbound_far);
            let _ = io::copy(&mut rd, &mut wr).await;
        });

        let mut client = inbound_near;
        client.write_all(b"ping").await.unwrap();

        let mut reply = [0u8; 4];
        timeout(Duration::from_secs(5), client.read_exact(&mut reply))
            .await
            .expect("no echo reply")
            .unwrap();
        assert_eq!(&reply, b"ping");

        client.shutdown().await.unwrap();
        timeout(Duration::from_secs(5), proxy)
            .await
            .expect("proxy did not terminate")
            .unwrap();
        echo.abort();
    }

    #[tokio::test]
    async fn test_cancellation_releases_both_sides() {
        let (inbound_near, inbound_far) = tokio::io::duplex(1024);
        let (outbound_near, outbound_far) = tokio::io::duplex(1024);

        let cancel = CancellationToken::new();
        let scope = cancel.clone();
        let notice = FailureNotice::new();
        let proxy = tokio::spawn(async move {
            splice(inbound_far, outbound_near, scope, &notice, "test").await;
        });

        cancel.cancel();
        timeout(Duration::from_secs(5), proxy)
            .await
            .expect("cancelled proxy did not terminate")
            .unwrap();

        // Both peers observe EOF once the proxy lets go.
        for stream in [inbound_near, outbound_far] {
            let mut stream = stream;
            let mut buf = Vec::new();
            let n = timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
                .await
                .expect("peer still blocked after cancellation")
                .unwrap();
            assert_eq!(n, 0);
        }
    }

    #[tokio::test]
    async fn test_dial_failure_drops_connection_only() {
        let transport = Arc::new(FakeTransport::new(false, true));
        let (client, server) = tokio::io::duplex(1024);

        let parent = CancellationToken::new();
        run_proxy(Arc::clone(&transport), server, 3306, parent, "test".to_string()).await;

        assert_eq!(transport.dials.load(Ordering::SeqCst), 1);

        // The inbound socket was closed on the way out.
        let mut client = client;
        let mut buf = Vec::new();
        let n = timeout(Duration::from_secs(5), client.read_to_end(&mut buf))
            .await
            .expect("inbound peer still blocked after dial failure")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_proxy_releases_dialed_stream() {
        let transport = Arc::new(FakeTransport::new(true, true));
        let (client, server) = tokio::io::duplex(1024);

        let parent = CancellationToken::new();
        let proxy = tokio::spawn(run_proxy(
            Arc::clone(&transport),
            server,
            3306,
            parent,
            "test".to_string(),
        ));

        let mut client = client;
        client.write_all(b"bye").await.unwrap();
        client.shutdown().await.unwrap();

        timeout(Duration::from_secs(5), proxy)
            .await
            .expect("proxy did not terminate")
            .unwrap();
        assert_eq!(transport.open_streams.load(Ordering::SeqCst), 0);
    }
}
