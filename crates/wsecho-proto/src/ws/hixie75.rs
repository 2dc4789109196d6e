//! Opening handshake for Hixie 75.
//!
//! No challenge: the request carries four fixed fields and the response
//! must start with an exact byte sequence. Any further response fields are
//! skipped unparsed.

use std::io::{Read, Write};

use rand::Rng;
use tracing::info;

use super::handshake::{
    escape, host_header, method_line, origin_header, Handshake, CONNECTION_HEADER, UPGRADE_HEADER,
};
use crate::config::Config;
use crate::error::WsError;
use crate::stream::{receive_byte, send_all};

/// Fixed start of every Hixie 75 server response.
pub const EXPECTED_RESPONSE: &[u8] = b"HTTP/1.1 101 Web Socket Protocol Handshake\r\n\
                                        Upgrade: WebSocket\r\n\
                                        Connection: Upgrade\r\n";

#[derive(Debug, Clone, Copy)]
pub struct Hixie75Handshake<'a> {
    config: &'a Config,
}

impl<'a> Hixie75Handshake<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn build_request(&self) -> Vec<u8> {
        let mut request = method_line(&self.config.resource);
        request.push_str(UPGRADE_HEADER);
        request.push_str(CONNECTION_HEADER);
        request.push_str(&host_header(self.config));
        request.push_str(&origin_header(&self.config.origin));
        request.push_str("\r\n");
        request.into_bytes()
    }

    /// Match [`EXPECTED_RESPONSE`] byte for byte, then skip to the end of
    /// the header block.
    pub fn read_response<R: Read + ?Sized>(&self, stream: &mut R) -> Result<(), WsError> {
        for (offset, &expected) in EXPECTED_RESPONSE.iter().enumerate() {
            let received = receive_byte(stream)?;
            if received != expected {
                return Err(WsError::Handshake(format!(
                    "unexpected response byte at offset {}: expected '{}', got '{}'",
                    offset,
                    escape(&[expected]),
                    escape(&[received])
                )));
            }
        }
        skip_headers(stream)
    }
}

/// Consume bytes up to and including the `\r\n\r\n` that ends the header
/// block. The CRLF closing [`EXPECTED_RESPONSE`] already counts towards it.
fn skip_headers<R: Read + ?Sized>(stream: &mut R) -> Result<(), WsError> {
    const TERMINATOR: &[u8; 4] = b"\r\n\r\n";
    let mut pos = 2;
    while pos < TERMINATOR.len() {
        let received = receive_byte(stream)?;
        if received == TERMINATOR[pos] {
            pos += 1;
        } else if received == TERMINATOR[0] {
            pos = 1;
        } else {
            pos = 0;
        }
    }
    Ok(())
}

impl Handshake for Hixie75Handshake<'_> {
    fn perform<S, R>(&self, stream: &mut S, _rng: &mut R) -> Result<(), WsError>
    where
        S: Read + Write + ?Sized,
        R: Rng + ?Sized,
    {
        send_all(stream, &self.build_request())?;
        info!("Sent handshake");
        self.read_response(stream)
    }
}
