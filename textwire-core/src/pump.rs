//! Stream pump — moves, transforms and forwards bytes in one direction
//! of a relay session.
//!
//! A pump cycles through three states: `Reading` (bounded-wait reads
//! into the chunk buffer), `Flushing` (run the codec over the buffered
//! chunk and write the result to the sink) and `Draining` (final flush
//! after end-of-stream, then half-close the sink). A hard I/O error or
//! a cancellation ends the pump with an error instead; the owning
//! session treats that as fatal and tears down the sibling direction.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::buffer::{CHUNK_CAPACITY, ChunkBuffer, ReadOutcome};
use crate::codec::EncodingMethod;
use crate::error::RelayError;
use crate::tap::{TapStage, TrafficTap};

/// How long one read waits for data before a partial chunk is flushed.
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// How long one write attempt waits for the sink to become writable
/// before polling again.
pub const WRITE_RETRY: Duration = Duration::from_secs(1);

/// Which transform a pump applies to the bytes it moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local endpoint → codec decode → socket.
    Decode,
    /// Socket → codec encode → local endpoint.
    Encode,
}

#[derive(Debug, Clone, Copy)]
enum PumpState {
    Reading,
    Flushing { at_eof: bool },
    Draining,
}

/// One direction of a relay session.
pub struct StreamPump<R, W> {
    direction: Direction,
    method: EncodingMethod,
    source: R,
    sink: W,
    buffer: ChunkBuffer,
    tap: Option<Box<dyn TrafficTap>>,
    source_name: &'static str,
    sink_name: &'static str,
    flushed_any: bool,
}

impl<R, W> StreamPump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(direction: Direction, method: EncodingMethod, source: R, sink: W) -> Self {
        let (source_name, sink_name) = match direction {
            Direction::Decode => ("local input", "socket"),
            Direction::Encode => ("socket", "local output"),
        };
        Self {
            direction,
            method,
            source,
            sink,
            buffer: ChunkBuffer::new(CHUNK_CAPACITY),
            tap: None,
            source_name,
            sink_name,
            flushed_any: false,
        }
    }

    /// Override the chunk capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.buffer = ChunkBuffer::new(capacity);
        self
    }

    /// Attach a traffic tap.
    pub fn with_tap(mut self, tap: Option<Box<dyn TrafficTap>>) -> Self {
        self.tap = tap;
        self
    }

    /// Override the descriptor names used in errors and logs.
    pub fn with_names(mut self, source: &'static str, sink: &'static str) -> Self {
        self.source_name = source;
        self.sink_name = sink;
        self
    }

    /// Run the pump until end-of-stream, a hard error or cancellation.
    ///
    /// On success the sink has been flushed and shut down (for TCP
    /// write halves this sends FIN, so the peer observes end-of-data).
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), RelayError> {
        let mut state = PumpState::Reading;

        loop {
            match state {
                PumpState::Reading => {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                        r = self.buffer.fill_from(&mut self.source, READ_TIMEOUT) => {
                            r.map_err(|e| RelayError::Stream {
                                side: self.source_name,
                                source: e,
                            })?
                        }
                    };

                    state = match outcome {
                        ReadOutcome::Data(_) if self.buffer.is_full() => {
                            PumpState::Flushing { at_eof: false }
                        }
                        ReadOutcome::Data(_) => PumpState::Reading,
                        ReadOutcome::Timeout if !self.buffer.is_empty() => {
                            PumpState::Flushing { at_eof: false }
                        }
                        ReadOutcome::Timeout => PumpState::Reading,
                        // One final flush even for an empty stream, so a
                        // zero-byte input still yields its encoded form.
                        ReadOutcome::Eof if !self.buffer.is_empty() || !self.flushed_any => {
                            PumpState::Flushing { at_eof: true }
                        }
                        ReadOutcome::Eof => PumpState::Draining,
                    };
                }

                PumpState::Flushing { at_eof } => {
                    self.flush(&cancel).await?;
                    state = if at_eof {
                        PumpState::Draining
                    } else {
                        PumpState::Reading
                    };
                }

                PumpState::Draining => {
                    if let Some(tap) = self.tap.as_mut() {
                        tap.eof(self.source_name);
                    }
                    debug!(
                        source = self.source_name,
                        sink = self.sink_name,
                        "end of stream, closing"
                    );
                    if let Err(e) = self.sink.shutdown().await {
                        // The peer may already be gone; the data is out.
                        debug!(sink = self.sink_name, "shutdown after drain: {e}");
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Run the codec over the buffered chunk and forward its output.
    async fn flush(&mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        self.flushed_any = true;

        let chunk = self.buffer.contents();
        if let Some(tap) = self.tap.as_mut() {
            tap.record(TapStage::RawIn, chunk);
        }

        let (produced, unconsumed) = match self.direction {
            // Encoding is total; nothing is ever left behind.
            Direction::Encode => (self.method.encode(chunk), 0),
            Direction::Decode => self.method.decode(chunk),
        };

        self.buffer.retain_tail(unconsumed);
        if self.buffer.is_full() {
            // An incomplete codec unit spanning the whole chunk cannot
            // come from a well-formed peer; drop it or no read could
            // ever make progress again.
            warn!(
                source = self.source_name,
                "undecodable data filled the chunk buffer, discarding"
            );
            self.buffer.clear();
        }

        if let Some(tap) = self.tap.as_mut() {
            tap.record(TapStage::Processed, &produced);
        }

        if !produced.is_empty() {
            self.write_all(&produced, cancel).await?;
            if let Some(tap) = self.tap.as_mut() {
                tap.record(TapStage::RawOut, &produced);
            }
        }

        Ok(())
    }

    /// Write `data` fully, waiting bounded intervals for writability
    /// and re-checking cancellation between attempts. A zero-length
    /// write is a fatal sink error.
    async fn write_all(
        &mut self,
        mut data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), RelayError> {
        while !data.is_empty() {
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }
            match tokio::time::timeout(WRITE_RETRY, self.sink.write(data)).await {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    return Err(RelayError::Stream {
                        side: self.sink_name,
                        source: std::io::ErrorKind::WriteZero.into(),
                    });
                }
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) => {
                    return Err(RelayError::Stream {
                        side: self.sink_name,
                        source: e,
                    });
                }
            }
        }

        self.sink.flush().await.map_err(|e| RelayError::Stream {
            side: self.sink_name,
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn pumps(
        direction: Direction,
        method: EncodingMethod,
    ) -> (
        tokio::io::DuplexStream,
        tokio::io::DuplexStream,
        StreamPump<tokio::io::DuplexStream, tokio::io::DuplexStream>,
    ) {
        let (feed, source) = tokio::io::duplex(1024);
        let (sink, drain) = tokio::io::duplex(4096);
        (feed, drain, StreamPump::new(direction, method, source, sink))
    }

    #[tokio::test]
    async fn encode_pump_escapes_and_closes() {
        let (mut feed, mut drain, pump) = pumps(Direction::Encode, EncodingMethod::Escape);
        let handle = tokio::spawn(pump.run(CancellationToken::new()));

        feed.write_all(b"Hi\r\n").await.unwrap();
        drop(feed);

        handle.await.unwrap().unwrap();
        let mut out = Vec::new();
        drain.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"Hi\\0d\\0a");
    }

    #[tokio::test]
    async fn decode_pump_carries_split_escape_across_reads() {
        let (mut feed, mut drain, pump) = pumps(Direction::Decode, EncodingMethod::Escape);
        let handle = tokio::spawn(pump.run(CancellationToken::new()));

        // First chunk ends in the middle of an escape sequence; the
        // pump must flush on timeout and carry the tail over.
        feed.write_all(b"A\\0").await.unwrap();
        tokio::time::sleep(READ_TIMEOUT + Duration::from_millis(100)).await;
        feed.write_all(b"dB").await.unwrap();
        drop(feed);

        handle.await.unwrap().unwrap();
        let mut out = Vec::new();
        drain.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"A\x0dB");
    }

    #[tokio::test]
    async fn empty_stream_still_emits_one_encoded_line() {
        let (feed, mut drain, pump) = pumps(Direction::Encode, EncodingMethod::LinePacking);
        let handle = tokio::spawn(pump.run(CancellationToken::new()));

        drop(feed);

        handle.await.unwrap().unwrap();
        let mut out = Vec::new();
        drain.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, [0x20, b'\n']);
    }

    #[tokio::test]
    async fn full_buffer_flushes_without_timeout() {
        let (mut feed, mut drain, pump) = pumps(Direction::Encode, EncodingMethod::Escape);
        let pump = pump.with_capacity(4);
        let handle = tokio::spawn(pump.run(CancellationToken::new()));

        feed.write_all(b"abcdefgh").await.unwrap();

        // Both 4-byte chunks must come through well before any timeout
        // flush could have fired.
        let mut out = [0u8; 8];
        tokio::time::timeout(Duration::from_millis(150), drain.read_exact(&mut out))
            .await
            .expect("flush should not wait for the read timeout")
            .unwrap();
        assert_eq!(&out, b"abcdefgh");

        drop(feed);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn undecodable_full_buffer_is_discarded() {
        let (mut feed, mut drain, pump) = pumps(Direction::Decode, EncodingMethod::LinePacking);
        let pump = pump.with_capacity(8);
        let handle = tokio::spawn(pump.run(CancellationToken::new()));

        // Malformed length byte and no newline in sight: fills the
        // buffer and must be dropped so the pump keeps running.
        feed.write_all(&[0x10; 8]).await.unwrap();
        tokio::time::sleep(READ_TIMEOUT + Duration::from_millis(100)).await;

        let line = crate::codec::linepack::encode(b"ok");
        for chunk in line.chunks(8) {
            feed.write_all(chunk).await.unwrap();
            tokio::time::sleep(READ_TIMEOUT + Duration::from_millis(100)).await;
        }
        drop(feed);

        handle.await.unwrap().unwrap();
        let mut out = Vec::new();
        drain.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ok");
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_pump() {
        let (_feed, _drain, pump) = pumps(Direction::Encode, EncodingMethod::Escape);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pump should stop promptly")
            .unwrap();
        assert!(matches!(result, Err(RelayError::Cancelled)));
    }

    #[tokio::test]
    async fn read_error_is_fatal_for_the_direction() {
        let source = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (sink, _drain) = tokio::io::duplex(64);
        let pump = StreamPump::new(Direction::Encode, EncodingMethod::Escape, source, sink);

        let result = pump.run(CancellationToken::new()).await;
        match result {
            Err(RelayError::Stream { side, .. }) => assert_eq!(side, "socket"),
            other => panic!("expected stream error, got {other:?}"),
        }
    }
}
