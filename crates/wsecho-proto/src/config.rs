//! Echo client configuration.
//!
//! A [`Config`] is built once from caller input (the CLI in `wsecho`) and is
//! only read afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::WsError;
use crate::ws::frame::{FrameCodec, Hybi01Codec, SentinelCodec};

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_SECURE_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ORIGIN: &str = "http://localhost/";
pub const DEFAULT_RESOURCE: &str = "/echo";
/// "Hello" and "Japan" in Japanese.
pub const DEFAULT_MESSAGE: &str = "Hello,\u{65e5}\u{672c}";

/// Protocol draft spoken on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    #[default]
    Hybi01,
    Hybi00,
    Hixie75,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 3] = [Self::Hybi01, Self::Hybi00, Self::Hixie75];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hybi01 => "hybi01",
            Self::Hybi00 => "hybi00",
            Self::Hixie75 => "hixie75",
        }
    }

    /// Value of the `Sec-WebSocket-Draft` field, or `None` for Hixie 75,
    /// which uses its own handshake.
    pub fn draft_number(self) -> Option<u8> {
        match self {
            Self::Hybi01 => Some(1),
            Self::Hybi00 => Some(0),
            Self::Hixie75 => None,
        }
    }

    pub fn codec(self) -> &'static dyn FrameCodec {
        match self {
            Self::Hybi01 => &Hybi01Codec,
            Self::Hybi00 => &SentinelCodec::HYBI00,
            Self::Hixie75 => &SentinelCodec::HIXIE75,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "invalid protocol version: {s} (expected one of 'hybi01', 'hybi00', 'hixie75')"
                )
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub resource: String,
    pub origin: String,
    pub use_tls: bool,
    pub version: ProtocolVersion,
    pub socket_timeout: Duration,
    pub messages: Vec<String>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            resource: DEFAULT_RESOURCE.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            use_tls: false,
            version: ProtocolVersion::default(),
            socket_timeout: DEFAULT_TIMEOUT,
            messages: Config::split_messages(DEFAULT_MESSAGE),
            verbose: true,
        }
    }
}

impl Config {
    /// Split a comma-separated message list. Empty segments are kept.
    pub fn split_messages(list: &str) -> Vec<String> {
        list.split(',').map(str::to_string).collect()
    }

    /// Port to use when none was given: 443 with TLS, 80 otherwise.
    pub fn default_port(use_tls: bool) -> u16 {
        if use_tls {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PORT
        }
    }

    /// Value of the `Host:` request field.
    ///
    /// The host is lower-cased and the port is appended only when it is not
    /// the default for the scheme.
    pub fn host_header_value(&self) -> String {
        let mut hostport = self.host.to_ascii_lowercase();
        if self.port != Self::default_port(self.use_tls) {
            hostport.push(':');
            hostport.push_str(&self.port.to_string());
        }
        hostport
    }

    pub fn validate(&self) -> Result<(), WsError> {
        if self.host.is_empty() {
            return Err(WsError::Config("server host must not be empty".to_string()));
        }
        if self.messages.is_empty() {
            return Err(WsError::Config("no messages to send".to_string()));
        }
        if self.socket_timeout.is_zero() {
            return Err(WsError::Config("socket timeout must be positive".to_string()));
        }
        Ok(())
    }
}
