//! Domain-specific error types for the textwire relay.
//!
//! All fallible operations return `Result<T, RelayError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Transport setup ──────────────────────────────────────────
    /// Outbound TCP connection could not be established.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listening socket could not be bound.
    #[error("bind on {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Session errors ───────────────────────────────────────────
    /// The external command could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A read or write on one relay direction failed hard.
    #[error("{side}: {source}")]
    Stream {
        /// Which descriptor failed, e.g. `"socket"` or `"command stdin"`.
        side: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The session was aborted by a shutdown request.
    #[error("relay cancelled")]
    Cancelled,

    /// A pump task panicked or was aborted.
    #[error("pump task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The TCP/IO layer reported an error outside a pump.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// `true` for errors that end a session but should not stop an
    /// acceptor from serving further connections.
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            RelayError::Spawn { .. } | RelayError::Stream { .. } | RelayError::Join(_)
        )
    }
}
