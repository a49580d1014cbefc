//! # textwire-core
//!
//! Core library for the textwire bidirectional TCP relay, which
//! re-encodes binary traffic crossing a text-hostile boundary (a
//! terminal, pipe or subprocess that cannot carry arbitrary bytes)
//! into a printable, restorable representation, and back, in real
//! time.
//!
//! This crate contains:
//! - **Codecs**: `EncodingMethod` with the backslash-hex escape scheme
//!   and the uu-style line-packing scheme, both chunk-safe
//! - **Buffer**: `ChunkBuffer` — bounded accumulator with tail carry
//! - **Pump**: `StreamPump` — one relay direction with bounded reads,
//!   write retry and end-of-stream draining
//! - **Relay**: `run_session` — two pumps per socket, lifecycle and
//!   subprocess teardown
//! - **Endpoint**: stdio or shell-command local endpoints
//! - **Net**: connector and acceptor glue around sessions
//! - **Tap**: timestamped hex-dump traffic logging
//! - **Error**: `RelayError` — typed, `thiserror`-based error hierarchy

pub mod buffer;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod net;
pub mod pump;
pub mod relay;
pub mod settings;
pub mod tap;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use buffer::{CHUNK_CAPACITY, ChunkBuffer, ReadOutcome};
pub use codec::EncodingMethod;
pub use endpoint::{EndpointGuard, LocalEndpoint};
pub use error::RelayError;
pub use net::{run_acceptor, run_connector, serve};
pub use pump::{Direction, StreamPump};
pub use relay::{SessionTaps, run_session};
pub use settings::{RelayRole, RelaySettings, TapConfig};
pub use tap::{FileTap, TapStage, TrafficTap};
