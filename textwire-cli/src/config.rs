//! Optional TOML configuration for the textwire CLI.
//!
//! Every field mirrors a command-line flag; flags always win over the
//! file. Missing or invalid files fall back to empty defaults so a
//! bare `textwire -m connect -p 9000` never needs a config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use textwire_core::EncodingMethod;

/// Settings loadable from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Operating role: "connect" or "listen".
    pub mode: Option<String>,
    /// TCP port (1–65535).
    pub port: Option<u16>,
    /// Peer host for connect mode.
    pub host: Option<String>,
    /// Wire encoding: "escape" or "uuencode".
    pub encode: Option<EncodingMethod>,
    /// Shell command to relay to instead of stdio.
    pub system: Option<String>,
    /// Suppress stderr diagnostics.
    pub quiet: Option<bool>,
    /// Hex-dump log of port → local traffic.
    pub log_port_stdio: Option<PathBuf>,
    /// Hex-dump log of local → port traffic.
    pub log_stdio_port: Option<PathBuf>,
    /// Label prepended to every log line.
    pub log_prefix: Option<String>,
    /// Startup delay in milliseconds.
    pub delay_ms: Option<u64>,
}

impl FileConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}
