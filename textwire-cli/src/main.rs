//! textwire — entry point.
//!
//! ```text
//! textwire -m connect -p 9000 --host 10.0.0.2      Relay stdio to a peer
//! textwire -m listen -p 9000 -s 'cat'              Serve, relaying to a command
//! textwire -m listen -p 9000 -e uuencode --lr      Line packing, preset logs
//! textwire --config textwire.toml                  Load settings from TOML
//! textwire --gen-config                            Write default config to stdout
//! ```

mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use textwire_core::{EncodingMethod, RelayError, RelayRole, RelaySettings};

use crate::config::FileConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "textwire",
    about = "Relay binary TCP traffic across text-only channels",
    version
)]
struct Cli {
    /// Operating role.
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// TCP port number.
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Peer host for connect mode.
    #[arg(long)]
    host: Option<String>,

    /// Encoding method on the text side.
    #[arg(short, long, value_enum)]
    encode: Option<EncodeArg>,

    /// Relay to a shell command instead of stdio.
    #[arg(short, long, value_name = "COMMAND")]
    system: Option<String>,

    /// Suppress stderr output.
    #[arg(short, long)]
    quiet: bool,

    /// Log port->stdio/command traffic (hex dump).
    #[arg(long = "lps", alias = "log-port-stdio", value_name = "FILE")]
    log_port_stdio: Option<PathBuf>,

    /// Log stdio/command->port traffic (hex dump).
    #[arg(long = "lsp", alias = "log-stdio-port", value_name = "FILE")]
    log_stdio_port: Option<PathBuf>,

    /// Custom prefix for log entries.
    #[arg(long)]
    log_prefix: Option<String>,

    /// Alias for --log-prefix l --lps log_lps.log --lsp log_lsp.log.
    #[arg(long, conflicts_with = "lr")]
    ll: bool,

    /// Alias for --log-prefix r --lps log_rps.log --lsp log_rsp.log.
    #[arg(long)]
    lr: bool,

    /// Wait this many milliseconds before connecting or binding.
    #[arg(long, value_name = "MS")]
    delay: Option<u64>,

    /// Path to a configuration TOML file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print a configuration template to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    /// Connect out to a listening peer.
    #[value(alias = "send", alias = "to")]
    Connect,
    /// Listen and serve inbound connections.
    #[value(alias = "recv", alias = "from")]
    Listen,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EncodeArg {
    /// Backslash-hex escaping of reserved bytes.
    Escape,
    /// uu-style 3-byte → 4-character line packing.
    Uuencode,
}

impl From<EncodeArg> for EncodingMethod {
    fn from(arg: EncodeArg) -> Self {
        match arg {
            EncodeArg::Escape => EncodingMethod::Escape,
            EncodeArg::Uuencode => EncodingMethod::LinePacking,
        }
    }
}

// ── Settings resolution ──────────────────────────────────────────

/// Merge flags over file config into the core settings. Flags win.
fn resolve(cli: &Cli, file: &FileConfig) -> Result<RelaySettings, String> {
    let role = match cli.mode {
        Some(ModeArg::Connect) => RelayRole::Connect,
        Some(ModeArg::Listen) => RelayRole::Listen,
        None => match file.mode.as_deref() {
            Some("connect") | Some("send") | Some("to") => RelayRole::Connect,
            Some("listen") | Some("recv") | Some("from") => RelayRole::Listen,
            Some(other) => return Err(format!("invalid mode '{other}' in config")),
            None => return Err("mode is required (-m connect|listen)".to_string()),
        },
    };

    let port = match cli.port.or(file.port) {
        Some(p) if p > 0 => p,
        Some(_) => return Err("port must be between 1 and 65535".to_string()),
        None => return Err("port is required (-p <port>)".to_string()),
    };

    let mut settings = RelaySettings::new(role, port);
    if let Some(host) = cli.host.clone().or_else(|| file.host.clone()) {
        settings.host = host;
    }
    settings.method = cli
        .encode
        .map(EncodingMethod::from)
        .or(file.encode)
        .unwrap_or_default();
    settings.command = cli.system.clone().or_else(|| file.system.clone());
    settings.quiet = cli.quiet || file.quiet.unwrap_or(false);
    settings.startup_delay = cli
        .delay
        .or(file.delay_ms)
        .map(Duration::from_millis);

    // Preset log bundles expand first; explicit flags refine them.
    if cli.ll {
        settings.taps.prefix = Some("l".to_string());
        settings.taps.port_to_local = Some("log_lps.log".into());
        settings.taps.local_to_port = Some("log_lsp.log".into());
    } else if cli.lr {
        settings.taps.prefix = Some("r".to_string());
        settings.taps.port_to_local = Some("log_rps.log".into());
        settings.taps.local_to_port = Some("log_rsp.log".into());
    }
    if let Some(path) = cli.log_port_stdio.clone().or_else(|| file.log_port_stdio.clone()) {
        settings.taps.port_to_local = Some(path);
    }
    if let Some(path) = cli.log_stdio_port.clone().or_else(|| file.log_stdio_port.clone()) {
        settings.taps.local_to_port = Some(path);
    }
    if let Some(prefix) = cli.log_prefix.clone().or_else(|| file.log_prefix.clone()) {
        settings.taps.prefix = Some(prefix);
    }

    Ok(settings)
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --gen-config: dump a template and exit.
    if cli.gen_config {
        let template = FileConfig {
            mode: Some("connect".to_string()),
            port: Some(9000),
            host: Some("127.0.0.1".to_string()),
            encode: Some(EncodingMethod::Escape),
            ..Default::default()
        };
        match toml::to_string_pretty(&template) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("failed to render config template: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let file = cli
        .config
        .as_deref()
        .map(FileConfig::load)
        .unwrap_or_default();

    let settings = match resolve(&cli, &file) {
        Ok(settings) => settings,
        Err(msg) => {
            eprintln!("Error: {msg}");
            std::process::exit(2);
        }
    };

    // Init tracing. --quiet keeps hard errors only.
    let default_level = if settings.quiet { "error" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("textwire v{}", env!("CARGO_PKG_VERSION"));
    info!("encoding: {}", settings.method);

    // Ctrl-C / SIGTERM → cancellation token.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        signal_cancel.cancel();
    });

    let result = match settings.role {
        RelayRole::Connect => textwire_core::run_connector(&settings, cancel).await,
        RelayRole::Listen => textwire_core::run_acceptor(&settings, cancel).await,
    };

    match result {
        Ok(()) | Err(RelayError::Cancelled) => {}
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(_) => {
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("textwire").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn minimal_connect_invocation() {
        let cli = parse(&["-m", "connect", "-p", "9000"]);
        let settings = resolve(&cli, &FileConfig::default()).unwrap();
        assert_eq!(settings.role, RelayRole::Connect);
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.method, EncodingMethod::Escape);
    }

    #[test]
    fn mode_aliases() {
        for alias in ["send", "to"] {
            let cli = parse(&["-m", alias, "-p", "1"]);
            let settings = resolve(&cli, &FileConfig::default()).unwrap();
            assert_eq!(settings.role, RelayRole::Connect);
        }
        for alias in ["recv", "from"] {
            let cli = parse(&["-m", alias, "-p", "1"]);
            let settings = resolve(&cli, &FileConfig::default()).unwrap();
            assert_eq!(settings.role, RelayRole::Listen);
        }
    }

    #[test]
    fn uuencode_selects_line_packing() {
        let cli = parse(&["-m", "listen", "-p", "1", "-e", "uuencode"]);
        let settings = resolve(&cli, &FileConfig::default()).unwrap();
        assert_eq!(settings.method, EncodingMethod::LinePacking);
    }

    #[test]
    fn port_zero_is_rejected() {
        let result =
            Cli::try_parse_from(["textwire", "-m", "listen", "-p", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_mode_is_an_error() {
        let cli = parse(&["-p", "9000"]);
        assert!(resolve(&cli, &FileConfig::default()).is_err());
    }

    #[test]
    fn ll_preset_expands() {
        let cli = parse(&["-m", "listen", "-p", "1", "--ll"]);
        let settings = resolve(&cli, &FileConfig::default()).unwrap();
        assert_eq!(settings.taps.prefix.as_deref(), Some("l"));
        assert_eq!(
            settings.taps.port_to_local.as_deref(),
            Some(std::path::Path::new("log_lps.log"))
        );
        assert_eq!(
            settings.taps.local_to_port.as_deref(),
            Some(std::path::Path::new("log_lsp.log"))
        );
    }

    #[test]
    fn explicit_log_flags_override_preset() {
        let cli = parse(&["-m", "listen", "-p", "1", "--lr", "--lps", "custom.log"]);
        let settings = resolve(&cli, &FileConfig::default()).unwrap();
        assert_eq!(settings.taps.prefix.as_deref(), Some("r"));
        assert_eq!(
            settings.taps.port_to_local.as_deref(),
            Some(std::path::Path::new("custom.log"))
        );
    }

    #[test]
    fn flags_override_file_config() {
        let file = FileConfig {
            mode: Some("listen".into()),
            port: Some(1111),
            host: Some("10.1.1.1".into()),
            ..Default::default()
        };
        let cli = parse(&["-p", "2222"]);
        let settings = resolve(&cli, &file).unwrap();
        assert_eq!(settings.role, RelayRole::Listen);
        assert_eq!(settings.port, 2222);
        assert_eq!(settings.host, "10.1.1.1");
    }

    #[test]
    fn command_and_delay_pass_through() {
        let cli = parse(&["-m", "connect", "-p", "1", "-s", "sort -u", "--delay", "250"]);
        let settings = resolve(&cli, &FileConfig::default()).unwrap();
        assert_eq!(settings.command.as_deref(), Some("sort -u"));
        assert_eq!(settings.startup_delay, Some(Duration::from_millis(250)));
    }
}
