//! The WebSocket echo client CLI.
//!
//! Connects to an echo server, performs the opening handshake of one of the
//! pre-RFC drafts, sends each message and checks its echo, then runs the
//! closing handshake.
//!
//! Options:
//! - `-s/--server-host`, `-p/--server-port`, `-t/--tls` - where to connect
//! - `-r/--resource`, `-o/--origin` - handshake fields
//! - `-m/--message` - comma-separated messages to echo
//! - `--protocol-version`, `--draft75` - which draft to speak
//! - `-k/--socket-timeout` - per-operation timeout in seconds
//! - `-q/--quiet` - suppress the echo trace
//! - `--log-level` - diagnostic log level on stderr
//! - `--json` - report the final status as JSON

use std::io;
use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{debug, Level};

use wsecho_proto::config::{
    DEFAULT_MESSAGE, DEFAULT_ORIGIN, DEFAULT_RESOURCE, DEFAULT_TIMEOUT,
};
use wsecho_proto::{Config, EchoClient, EchoReport, ProtocolVersion, WsError};

#[derive(Parser)]
#[command(name = "wsecho", version, about = "WebSocket draft echo client")]
struct Cli {
    /// Server host
    #[arg(short = 's', long = "server-host", alias = "server_host", default_value = "localhost")]
    server_host: String,

    /// Server port (default: 80, or 443 with --tls)
    #[arg(short = 'p', long = "server-port", alias = "server_port")]
    server_port: Option<u16>,

    /// Origin sent in the handshake
    #[arg(short, long, default_value = DEFAULT_ORIGIN)]
    origin: String,

    /// Resource path
    #[arg(short, long, default_value = DEFAULT_RESOURCE)]
    resource: String,

    /// Comma-separated messages to send
    #[arg(short, long, default_value = DEFAULT_MESSAGE)]
    message: String,

    /// Suppress the per-message trace
    #[arg(short, long)]
    quiet: bool,

    /// Connect over TLS
    #[arg(short, long)]
    tls: bool,

    /// Socket timeout in seconds
    #[arg(
        short = 'k',
        long = "socket-timeout",
        alias = "socket_timeout",
        default_value_t = DEFAULT_TIMEOUT.as_secs_f64()
    )]
    socket_timeout: f64,

    /// Protocol draft: hybi01, hybi00 or hixie75
    #[arg(
        long = "protocol-version",
        alias = "protocol_version",
        default_value_t = ProtocolVersion::Hybi01
    )]
    protocol_version: ProtocolVersion,

    /// Use Hixie 75 (overrides --protocol-version)
    #[arg(long)]
    draft75: bool,

    /// Diagnostic log level
    #[arg(long = "log-level", alias = "log_level", value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Report the final status as one JSON object on stderr
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    fn as_tracing(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error | LogLevel::Critical => Level::ERROR,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<Config, WsError> {
        let socket_timeout = Duration::try_from_secs_f64(self.socket_timeout).map_err(|_| {
            WsError::Config(format!("invalid socket timeout: {}", self.socket_timeout))
        })?;
        let version = if self.draft75 {
            ProtocolVersion::Hixie75
        } else {
            self.protocol_version
        };
        Ok(Config {
            port: self
                .server_port
                .unwrap_or_else(|| Config::default_port(self.tls)),
            host: self.server_host,
            resource: self.resource,
            origin: self.origin,
            use_tls: self.tls,
            version,
            socket_timeout,
            messages: Config::split_messages(&self.message),
            verbose: !self.quiet,
        })
    }
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let _ = tracing_subscriber::fmt()
        .with_max_level(cli.log_level.as_tracing())
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();

    let result = cli.into_config().and_then(|config| run(&config));
    match result {
        Ok(report) => {
            if json {
                let msg = serde_json::json!({
                    "status": "ok",
                    "kind": null,
                    "message": format!("{} message(s) echoed", report.echoed.len()),
                });
                eprintln!("{}", msg);
            }
        }
        Err(e) => {
            let kind = e.kind();
            if json {
                let msg = serde_json::json!({
                    "status": "error",
                    "kind": kind,
                    "message": e.to_string(),
                });
                eprintln!("{}", msg);
            } else {
                eprintln!("error: {}", e);
            }
            process::exit(kind.exit_code());
        }
    }
}

fn run(config: &Config) -> Result<EchoReport, WsError> {
    debug!(
        config = %serde_json::to_string(config).unwrap_or_default(),
        "Starting echo session"
    );
    let stdout = io::stdout();
    let mut client = EchoClient::new(config, stdout.lock());
    let report = client.run()?;
    debug!(close = ?report.close, "Session finished");
    Ok(report)
}
