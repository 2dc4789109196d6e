//! Client side of the pre-RFC WebSocket drafts: Hixie 75, HyBi 00 and HyBi 01.
//!
//! The crate speaks all three wire formats over any blocking byte stream:
//!
//! - `stream`: exact-length reads, plain/TLS transport
//! - `ws`: opening handshakes, frame codecs, closing handshakes
//! - `client`: the echo session driver
//! - `config` / `error`: configuration record and error taxonomy
//!
//! A session is a single connect-handshake-exchange-close cycle. Protocol
//! violations are fatal and never retried.

pub mod client;
pub mod config;
pub mod error;
pub mod stream;
pub mod ws;

pub use client::{EchoClient, EchoReport};
pub use config::{Config, ProtocolVersion};
pub use error::{ErrorKind, WsError};
pub use stream::{connect, receive_exact, WsStream};
