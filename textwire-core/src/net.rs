//! TCP connector and acceptor — socket setup around the relay core.
//!
//! Connector mode produces exactly one session and reports its
//! outcome. Acceptor mode serves connections for as long as the
//! process runs, each on its own task with its own session state; one
//! session's failure never stops the listener.

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::endpoint;
use crate::error::RelayError;
use crate::relay;
use crate::settings::RelaySettings;

/// Connect out and run a single session to completion.
pub async fn run_connector(
    settings: &RelaySettings,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    startup_delay(settings, &cancel).await?;

    let addr = settings.connect_addr();
    info!("connecting to {addr}...");

    let socket = tokio::select! {
        _ = cancel.cancelled() => return Err(RelayError::Cancelled),
        result = TcpStream::connect(&addr) => result.map_err(|e| RelayError::Connect {
            addr: addr.clone(),
            source: e,
        })?,
    };
    info!("connected to server");

    let endpoint = endpoint::open(settings.command.as_deref())?;
    let taps = settings.taps.open()?;
    let result = relay::run_session(socket, endpoint, settings.method, taps, &cancel).await;

    info!("disconnected from server");
    result
}

/// Bind and serve inbound connections until cancelled.
///
/// Each accepted socket gets an independent session task; accept
/// errors and session failures are logged and serving continues.
pub async fn run_acceptor(
    settings: &RelaySettings,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    startup_delay(settings, &cancel).await?;

    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayError::Bind {
            addr: addr.clone(),
            source: e,
        })?;
    info!("waiting for connection on port {}", settings.port);

    serve(listener, settings, cancel).await
}

/// Accept loop over an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    settings: &RelaySettings,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        let (socket, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };
        info!("client connected from {peer}");

        let settings = settings.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let outcome = async {
                let endpoint = endpoint::open(settings.command.as_deref())?;
                let taps = settings.taps.open()?;
                relay::run_session(socket, endpoint, settings.method, taps, &cancel).await
            }
            .await;

            match outcome {
                Ok(()) => info!("client {peer} disconnected"),
                Err(RelayError::Cancelled) => {}
                Err(e) => warn!("session with {peer} failed: {e}"),
            }
        });
    }

    Ok(())
}

async fn startup_delay(
    settings: &RelaySettings,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    if let Some(delay) = settings.startup_delay {
        tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
    Ok(())
}
