//! Diagnostic traffic taps — timestamped hex dumps of relay traffic.
//!
//! Each pump can carry a tap that records the bytes entering its codec,
//! the bytes the codec produced, and the bytes finally written, plus an
//! end-of-stream marker. The wire format is one line per event:
//!
//! ```text
//! 14:03:07.123456 prefix:todec: 48 65 6c 6c 6f
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pump::Direction;

/// Where in a flush cycle a tap event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapStage {
    /// Bytes handed to the codec.
    RawIn,
    /// Bytes the codec produced.
    Processed,
    /// Bytes confirmed written to the sink.
    RawOut,
}

impl TapStage {
    /// Stage label as it appears in the log, specific to the pump
    /// direction so both taps can share one file without ambiguity.
    pub fn label(&self, direction: Direction) -> &'static str {
        match (direction, self) {
            (Direction::Decode, TapStage::RawIn) => "todec",
            (Direction::Decode, TapStage::Processed) => "dec-d",
            (Direction::Decode, TapStage::RawOut) => "dec-w",
            (Direction::Encode, TapStage::RawIn) => "toenc",
            (Direction::Encode, TapStage::Processed) => "enc-d",
            (Direction::Encode, TapStage::RawOut) => "enc-w",
        }
    }
}

/// Consumer of per-flush traffic events. A pump without a tap skips all
/// formatting work.
pub trait TrafficTap: Send {
    /// Record `bytes` observed at `stage`. Empty payloads are ignored.
    fn record(&mut self, stage: TapStage, bytes: &[u8]);

    /// Record that the pump's source reached end-of-stream.
    fn eof(&mut self, source: &str);
}

/// A [`TrafficTap`] writing hex-dump lines to a file, flushed per event
/// so the log survives a crashed session.
pub struct FileTap {
    out: BufWriter<File>,
    direction: Direction,
    prefix: Option<String>,
}

impl FileTap {
    pub fn create(
        path: &Path,
        direction: Direction,
        prefix: Option<String>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            direction,
            prefix,
        })
    }

    fn write_line(&mut self, body: &str) {
        let mut line = timestamp();
        line.push(' ');
        if let Some(prefix) = &self.prefix {
            line.push_str(prefix);
            line.push(':');
        }
        line.push_str(body);
        line.push('\n');

        // A failing diagnostic log must not kill the relay.
        if self.out.write_all(line.as_bytes()).and_then(|_| self.out.flush()).is_err() {
            tracing::warn!("traffic tap write failed");
        }
    }
}

impl TrafficTap for FileTap {
    fn record(&mut self, stage: TapStage, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut body = String::with_capacity(8 + bytes.len() * 3);
        body.push_str(stage.label(self.direction));
        body.push(':');
        body.push(' ');
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                body.push(' ');
            }
            body.push_str(&format!("{b:02x}"));
        }
        self.write_line(&body);
    }

    fn eof(&mut self, source: &str) {
        self.write_line(&format!("EOF detected from {source}"));
    }
}

/// Wall-clock `HH:MM:SS.micros` (UTC).
fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs() % 86_400;
    format!(
        "{:02}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        now.subsec_micros()
    )
}
