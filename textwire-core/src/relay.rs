//! Duplex relay session — two pumps over one socket.
//!
//! The inbound pump decodes the local endpoint's output onto the
//! socket; the outbound pump encodes socket data into the local
//! endpoint. Both run as independent tasks sharing nothing but the
//! session's descriptors. When the inbound pump drains it half-closes
//! the socket, while the outbound pump keeps running until the socket
//! itself reaches end-of-stream; the session finishes once both pumps
//! have stopped and any spawned command has been reaped.

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::EncodingMethod;
use crate::endpoint::LocalEndpoint;
use crate::error::RelayError;
use crate::pump::{Direction, StreamPump};
use crate::tap::TrafficTap;

/// Optional per-direction traffic taps for one session.
#[derive(Default)]
pub struct SessionTaps {
    /// Local endpoint → socket (decode direction).
    pub decode: Option<Box<dyn TrafficTap>>,
    /// Socket → local endpoint (encode direction).
    pub encode: Option<Box<dyn TrafficTap>>,
}

/// Run one full-duplex session to completion.
///
/// Owns the socket and the endpoint for its duration. A hard failure
/// in either direction cancels the sibling; `cancel` aborts the whole
/// session from outside. The endpoint's subprocess, if any, is always
/// terminated before this returns.
pub async fn run_session(
    socket: TcpStream,
    endpoint: LocalEndpoint,
    method: EncodingMethod,
    taps: SessionTaps,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    if let Err(e) = socket.set_nodelay(true) {
        debug!("set_nodelay failed: {e}");
    }

    let (socket_read, socket_write) = socket.into_split();
    let LocalEndpoint {
        reader: local_read,
        writer: local_write,
        mut guard,
        reader_name,
        writer_name,
    } = endpoint;

    // Child of the caller's token: an external shutdown reaches both
    // pumps, and one pump's failure reaches only its sibling.
    let session_token = cancel.child_token();

    let inbound = StreamPump::new(Direction::Decode, method, local_read, socket_write)
        .with_names(reader_name, "socket")
        .with_tap(taps.decode);
    let outbound = StreamPump::new(Direction::Encode, method, socket_read, local_write)
        .with_names("socket", writer_name)
        .with_tap(taps.encode);

    let inbound_handle = tokio::spawn(supervise(inbound, session_token.clone()));
    let outbound_handle = tokio::spawn(supervise(outbound, session_token.clone()));

    let (inbound_result, outbound_result) = tokio::join!(inbound_handle, outbound_handle);

    guard.terminate().await;

    let mut outcome = Ok(());
    for result in [inbound_result, outbound_result] {
        match result.map_err(RelayError::Join).and_then(|r| r) {
            Ok(()) => {}
            // Cancellation is only interesting if nothing failed hard.
            Err(RelayError::Cancelled) => {
                if outcome.is_ok() && cancel.is_cancelled() {
                    outcome = Err(RelayError::Cancelled);
                }
            }
            Err(e) => {
                if !matches!(outcome, Err(RelayError::Stream { .. })) {
                    outcome = Err(e);
                }
            }
        }
    }

    outcome
}

/// Run one pump; on a hard failure, cancel the sibling direction.
async fn supervise<R, W>(
    pump: StreamPump<R, W>,
    token: CancellationToken,
) -> Result<(), RelayError>
where
    R: tokio::io::AsyncRead + Unpin + Send,
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    let result = pump.run(token.clone()).await;
    if let Err(e) = &result {
        if !matches!(e, RelayError::Cancelled) {
            warn!("relay direction failed: {e}");
            token.cancel();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn echo_command_round_trips_binary_data() {
        let (mut client, server) = socket_pair().await;
        let endpoint = endpoint::open(Some("cat")).unwrap();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            run_session(
                server,
                endpoint,
                EncodingMethod::Escape,
                SessionTaps::default(),
                &cancel,
            )
            .await
        });

        // Raw bytes on the socket, every reserved value included. They
        // are escape-encoded into cat, echoed back and decoded again.
        let payload = b"\r\n\x1c\x7f\\Hello, world\x00\xff";
        client.write_all(payload).await.unwrap();
        client.shutdown().await.unwrap();

        let mut echoed = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut echoed))
            .await
            .expect("session should complete")
            .unwrap();
        assert_eq!(echoed, payload);

        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_tears_the_session_down() {
        let (_client, server) = socket_pair().await;
        let endpoint = endpoint::open(Some("cat")).unwrap();
        let cancel = CancellationToken::new();

        let session_cancel = cancel.clone();
        let session = tokio::spawn(async move {
            run_session(
                server,
                endpoint,
                EncodingMethod::Escape,
                SessionTaps::default(),
                &session_cancel,
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session should stop promptly")
            .unwrap();
        assert!(matches!(result, Err(RelayError::Cancelled)));
    }
}
