//! Runtime settings consumed by the relay core.
//!
//! Built by the CLI layer (flags plus optional config file) and handed
//! down as plain data; the core never parses arguments itself.

use std::path::PathBuf;
use std::time::Duration;

use crate::codec::EncodingMethod;
use crate::pump::Direction;
use crate::relay::SessionTaps;
use crate::tap::FileTap;

/// Which end of the TCP connection this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRole {
    /// Connect out to a listening peer.
    Connect,
    /// Listen and serve inbound connections.
    Listen,
}

/// Everything one relay run needs to know.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub role: RelayRole,
    pub host: String,
    pub port: u16,
    pub method: EncodingMethod,
    /// Shell command to relay to instead of the process's own stdio.
    pub command: Option<String>,
    /// Suppress progress diagnostics on stderr.
    pub quiet: bool,
    pub taps: TapConfig,
    /// Wait before connecting or binding.
    pub startup_delay: Option<Duration>,
}

impl RelaySettings {
    pub fn new(role: RelayRole, port: u16) -> Self {
        Self {
            role,
            host: "127.0.0.1".to_string(),
            port,
            method: EncodingMethod::default(),
            command: None,
            quiet: false,
            taps: TapConfig::default(),
            startup_delay: None,
        }
    }

    /// Peer address for connector mode.
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Listen address for acceptor mode.
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// Traffic-tap log destinations.
#[derive(Debug, Clone, Default)]
pub struct TapConfig {
    /// Hex dump of socket → local traffic (encode direction).
    pub port_to_local: Option<PathBuf>,
    /// Hex dump of local → socket traffic (decode direction).
    pub local_to_port: Option<PathBuf>,
    /// Label prepended to every log line.
    pub prefix: Option<String>,
}

impl TapConfig {
    /// Open the configured log files for one session. Each session
    /// truncates its files, matching one-log-per-run behaviour.
    pub fn open(&self) -> std::io::Result<SessionTaps> {
        let mut taps = SessionTaps::default();
        if let Some(path) = &self.local_to_port {
            taps.decode = Some(Box::new(FileTap::create(
                path,
                Direction::Decode,
                self.prefix.clone(),
            )?));
        }
        if let Some(path) = &self.port_to_local {
            taps.encode = Some(Box::new(FileTap::create(
                path,
                Direction::Encode,
                self.prefix.clone(),
            )?));
        }
        Ok(taps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        let mut settings = RelaySettings::new(RelayRole::Connect, 4321);
        settings.host = "192.168.0.9".into();
        assert_eq!(settings.connect_addr(), "192.168.0.9:4321");
        assert_eq!(settings.bind_addr(), "0.0.0.0:4321");
    }

    #[test]
    fn defaults() {
        let settings = RelaySettings::new(RelayRole::Listen, 7);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.method, EncodingMethod::Escape);
        assert!(settings.command.is_none());
        assert!(!settings.quiet);
    }

    #[test]
    fn tap_config_opens_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = TapConfig {
            port_to_local: Some(dir.path().join("lps.log")),
            local_to_port: None,
            prefix: Some("r".into()),
        };
        let taps = config.open().unwrap();
        assert!(taps.encode.is_some());
        assert!(taps.decode.is_none());
        assert!(dir.path().join("lps.log").exists());
    }
}
