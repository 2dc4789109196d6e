use std::fmt;

use serde::Serialize;

/// An error that ends the current echo session.
///
/// None of these are retried. The driver reports the first one it hits and
/// releases the transport.
#[derive(Debug)]
pub enum WsError {
    /// The peer closed the stream before the expected bytes arrived.
    ConnectionClosed { expected: usize, received: usize },
    /// Malformed or unexpected opening-handshake response.
    Handshake(String),
    /// A frame could not be encoded or failed validation on receive.
    Frame(String),
    /// The echoed frame is not byte-identical to the frame that was sent.
    EchoMismatch { sent: Vec<u8>, received: Vec<u8> },
    /// Transport failure, including socket timeouts.
    Io(std::io::Error),
    /// TLS setup failure.
    Tls(String),
    /// Invalid client configuration.
    Config(String),
}

/// Stable, serializable tag for a [`WsError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionClosed,
    Handshake,
    Frame,
    EchoMismatch,
    Io,
    Tls,
    Config,
}

impl ErrorKind {
    /// Process exit status used by the command-line client.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Handshake => 2,
            Self::Frame => 3,
            Self::EchoMismatch => 4,
            Self::ConnectionClosed => 5,
            Self::Io | Self::Tls | Self::Config => 1,
        }
    }
}

impl WsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionClosed { .. } => ErrorKind::ConnectionClosed,
            Self::Handshake(_) => ErrorKind::Handshake,
            Self::Frame(_) => ErrorKind::Frame,
            Self::EchoMismatch { .. } => ErrorKind::EchoMismatch,
            Self::Io(_) => ErrorKind::Io,
            Self::Tls(_) => ErrorKind::Tls,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionClosed => "connection closed",
            Self::Handshake => "handshake error",
            Self::Frame => "frame error",
            Self::EchoMismatch => "echo mismatch",
            Self::Io => "i/o error",
            Self::Tls => "tls error",
            Self::Config => "configuration error",
        };
        f.write_str(name)
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed { expected, received } => write!(
                f,
                "connection closed unexpectedly ({received} of {expected} bytes received)"
            ),
            Self::Handshake(msg) => write!(f, "handshake failed: {msg}"),
            Self::Frame(msg) => write!(f, "bad frame: {msg}"),
            Self::EchoMismatch { sent, received } => write!(
                f,
                "incorrect echo: sent {:?}, received {:?}",
                String::from_utf8_lossy(sent),
                String::from_utf8_lossy(received)
            ),
            Self::Io(e) => write!(f, "{e}"),
            Self::Tls(msg) => write!(f, "tls: {msg}"),
            Self::Config(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for WsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Render bytes as space-separated lowercase hex pairs, for debug logs.
pub fn hexify(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
