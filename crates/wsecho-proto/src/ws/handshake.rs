//! Opening handshake for HyBi 00 and HyBi 01.
//!
//! Both drafts share one handshake: a GET request whose fields are sent in
//! random order, two `Sec-WebSocket-Key<n>` challenge keys, a `Sec-WebSocket-Draft`
//! field, and eight raw bytes of `key3` after the blank line. The server
//! answers with a 101 status line, a header block, and the 16-byte MD5 of
//! the challenge.
//!
//! - [`generate_key`]: build one challenge key and its hidden number
//! - [`read_status_line`], [`read_fields`], [`validate_fields`]: response parsing
//! - [`Challenge::expected`]: MD5 answer the server must send back
//! - [`ChallengeHandshake`]: the full exchange

use std::io::{Read, Write};

use md5::{Digest, Md5};
use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{hexify, WsError};
use crate::stream::{receive_byte, receive_exact, send_all};

pub const UPGRADE_HEADER: &str = "Upgrade: WebSocket\r\n";
pub const CONNECTION_HEADER: &str = "Connection: Upgrade\r\n";

/// Printable characters that may be sprinkled into a challenge key:
/// U+0021..=U+002F and U+003A..=U+007E (no digits, no space).
const KEY_FILLER_RANGES: [(u8, u8); 2] = [(0x21, 0x2F), (0x3A, 0x7E)];
const KEY_FILLER_COUNT: u8 = (0x2F - 0x21 + 1) + (0x7E - 0x3A + 1);

/// Response fields, keyed by lower-cased name. Repeated fields keep every
/// value in arrival order.
pub type HeaderMap = FxHashMap<String, Vec<String>>;

/// One draft's opening handshake over an already-connected stream.
pub trait Handshake {
    /// Send the request and validate the response. The connection is
    /// established only when this returns `Ok`.
    fn perform<S, R>(&self, stream: &mut S, rng: &mut R) -> Result<(), WsError>
    where
        S: Read + Write + ?Sized,
        R: Rng + ?Sized;
}

pub(crate) fn method_line(resource: &str) -> String {
    format!("GET {} HTTP/1.1\r\n", resource)
}

pub(crate) fn origin_header(origin: &str) -> String {
    format!("Origin: {}\r\n", origin.to_ascii_lowercase())
}

pub(crate) fn host_header(config: &Config) -> String {
    format!("Host: {}\r\n", config.host_header_value())
}

/// Escape raw protocol bytes for an error message.
pub(crate) fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

/// Generate one `Sec-WebSocket-Key<n>` value.
///
/// Returns the hidden number and the key string. The key is the decimal
/// product `number * spaces` with 1-12 filler characters inserted anywhere
/// and `spaces` U+0020 characters inserted anywhere but the first and last
/// position.
pub fn generate_key<R: Rng + ?Sized>(rng: &mut R) -> (u32, String) {
    let spaces = rng.random_range(1..=12u32);
    generate_key_with_spaces(rng, spaces)
}

pub(crate) fn generate_key_with_spaces<R: Rng + ?Sized>(rng: &mut R, spaces: u32) -> (u32, String) {
    let max = u32::MAX / spaces;
    let number = rng.random_range(0..=max);
    let product = u64::from(number) * u64::from(spaces);

    let mut key: Vec<u8> = product.to_string().into_bytes();

    let fillers = rng.random_range(1..=12);
    for _ in 0..fillers {
        let mut idx = rng.random_range(0..KEY_FILLER_COUNT);
        let mut ch = 0;
        for (lo, hi) in KEY_FILLER_RANGES {
            let span = hi - lo + 1;
            if idx < span {
                ch = lo + idx;
                break;
            }
            idx -= span;
        }
        let pos = rng.random_range(0..=key.len());
        key.insert(pos, ch);
    }

    // At least one digit and one filler are present, so 1..len is never empty.
    for _ in 0..spaces {
        let pos = rng.random_range(1..key.len());
        key.insert(pos, b' ');
    }

    // Only ASCII was inserted.
    (number, String::from_utf8_lossy(&key).into_owned())
}

/// Secret half of a HyBi 00/01 handshake. Discarded once the server's
/// reply has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub number1: u32,
    pub number2: u32,
    pub key3: [u8; 8],
}

impl Challenge {
    /// `be32(number1) || be32(number2) || key3`
    pub fn bytes(&self) -> [u8; 16] {
        let mut challenge = [0u8; 16];
        challenge[0..4].copy_from_slice(&self.number1.to_be_bytes());
        challenge[4..8].copy_from_slice(&self.number2.to_be_bytes());
        challenge[8..16].copy_from_slice(&self.key3);
        challenge
    }

    /// MD5 of the challenge: the 16 bytes the server must answer with.
    pub fn expected(&self) -> [u8; 16] {
        let digest = Md5::digest(self.bytes());
        let mut expected = [0u8; 16];
        expected.copy_from_slice(&digest);
        expected
    }
}

/// Read the status line (through its LF) and require code 101.
pub fn read_status_line<R: Read + ?Sized>(stream: &mut R) -> Result<(), WsError> {
    let mut field = Vec::new();
    loop {
        let ch = receive_byte(stream)?;
        field.push(ch);
        if ch == b'\n' {
            break;
        }
    }

    if field.len() < 7 || !field.ends_with(b"\r\n") {
        return Err(WsError::Handshake(format!(
            "wrong status line: {}",
            escape(&field)
        )));
    }

    // The code sits between the first and second space.
    let line = &field[..field.len() - 2];
    let mut parts = line.splitn(3, |&b| b == b' ');
    let _version = parts.next();
    let code = match (parts.next(), parts.next()) {
        (Some(code), Some(_reason)) => code,
        _ => {
            return Err(WsError::Handshake(format!(
                "no code found in: {}",
                escape(&field)
            )))
        }
    };
    if code.len() != 3 || !code.iter().all(u8::is_ascii_digit) {
        return Err(WsError::Handshake(format!(
            "wrong code {} in: {}",
            escape(code),
            escape(&field)
        )));
    }
    if code != b"101" {
        return Err(WsError::Handshake(format!(
            "unexpected code in: {}",
            escape(&field)
        )));
    }
    Ok(())
}

/// Read a field name, lower-casing ASCII letters. `None` means the blank
/// line that ends the block (its CR has been consumed).
fn read_name<R: Read + ?Sized>(stream: &mut R) -> Result<Option<String>, WsError> {
    let mut name = Vec::new();
    loop {
        match receive_byte(stream)? {
            b'\r' => return Ok(None),
            b'\n' => {
                return Err(WsError::Handshake(format!(
                    "unexpected LF when reading header name ({})",
                    escape(&name)
                )))
            }
            b':' => return Ok(Some(String::from_utf8_lossy(&name).into_owned())),
            ch => name.push(ch.to_ascii_lowercase()),
        }
    }
}

/// Skip spaces after the colon and return the first non-space byte.
fn skip_spaces<R: Read + ?Sized>(stream: &mut R) -> Result<u8, WsError> {
    loop {
        let ch = receive_byte(stream)?;
        if ch != b' ' {
            return Ok(ch);
        }
    }
}

/// Read a value up to (and consuming) its CR. `first` is the byte
/// returned by [`skip_spaces`].
fn read_value<R: Read + ?Sized>(stream: &mut R, first: u8) -> Result<String, WsError> {
    let mut value = Vec::new();
    let mut ch = first;
    loop {
        match ch {
            b'\r' => return Ok(String::from_utf8_lossy(&value).into_owned()),
            b'\n' => {
                return Err(WsError::Handshake(format!(
                    "unexpected LF when reading header value ({})",
                    escape(&value)
                )))
            }
            other => value.push(other),
        }
        ch = receive_byte(stream)?;
    }
}

/// Read the response header block, including the final CRLF.
pub fn read_fields<R: Read + ?Sized>(stream: &mut R) -> Result<HeaderMap, WsError> {
    let mut fields = HeaderMap::default();
    while let Some(name) = read_name(stream)? {
        let first = skip_spaces(stream)?;
        let value = read_value(stream, first)?;
        if receive_byte(stream)? != b'\n' {
            return Err(WsError::Handshake(format!(
                "expected LF after line: {}: {}",
                name, value
            )));
        }
        fields.entry(name).or_default().push(value);
    }
    if receive_byte(stream)? != b'\n' {
        return Err(WsError::Handshake(
            "expected LF after header block".to_string(),
        ));
    }
    Ok(fields)
}

/// Check that the required fields each appear exactly once and that
/// `Upgrade`/`Connection` carry the expected values.
pub fn validate_fields(fields: &HeaderMap) -> Result<(), WsError> {
    const REQUIRED: [&str; 4] = [
        "upgrade",
        "connection",
        "sec-websocket-origin",
        "sec-websocket-location",
    ];
    for name in REQUIRED {
        let values = fields.get(name).map(Vec::as_slice).unwrap_or(&[]);
        if values.len() != 1 {
            return Err(WsError::Handshake(format!(
                "not one {}: {:?}",
                name, values
            )));
        }
    }

    let upgrade = &fields["upgrade"][0];
    if upgrade != "WebSocket" {
        return Err(WsError::Handshake(format!("unexpected upgrade: {}", upgrade)));
    }
    let connection = &fields["connection"][0];
    if !connection.eq_ignore_ascii_case("upgrade") {
        return Err(WsError::Handshake(format!(
            "unexpected connection: {}",
            connection
        )));
    }
    Ok(())
}

/// Read the server's 16-byte reply and compare it with the MD5 answer.
pub fn verify_reply<R: Read + ?Sized>(stream: &mut R, challenge: &Challenge) -> Result<(), WsError> {
    let expected = challenge.expected();
    debug!(challenge = %hexify(&challenge.bytes()), expected = %hexify(&expected));

    let reply = receive_exact(stream, 16)?;
    debug!(reply = %hexify(&reply));

    if reply != expected {
        return Err(WsError::Handshake(format!(
            "challenge/response failed: {} != {}",
            hexify(&expected),
            hexify(&reply)
        )));
    }
    Ok(())
}

/// HyBi 00 / HyBi 01 opening handshake.
///
/// The challenge keys are sent and verified for both drafts; only the
/// `Sec-WebSocket-Draft` value differs.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeHandshake<'a> {
    config: &'a Config,
    draft: u8,
}

impl<'a> ChallengeHandshake<'a> {
    pub fn new(config: &'a Config, draft: u8) -> Self {
        Self { config, draft }
    }

    /// Build the full request (request line, shuffled fields, blank line,
    /// key3) together with the challenge it commits to.
    pub fn build_request<R: Rng + ?Sized>(&self, rng: &mut R) -> (Vec<u8>, Challenge) {
        let (number1, key1) = generate_key(rng);
        let (number2, key2) = generate_key(rng);

        let mut fields = vec![
            UPGRADE_HEADER.to_string(),
            CONNECTION_HEADER.to_string(),
            host_header(self.config),
            origin_header(&self.config.origin),
            format!("Sec-WebSocket-Key1: {}\r\n", key1),
            format!("Sec-WebSocket-Key2: {}\r\n", key2),
            format!("Sec-WebSocket-Draft: {}\r\n", self.draft),
        ];
        // Any field order is allowed; send them in a random one.
        fields.shuffle(rng);

        let mut key3 = [0u8; 8];
        rng.fill(&mut key3);

        let mut request = method_line(&self.config.resource).into_bytes();
        for field in &fields {
            request.extend_from_slice(field.as_bytes());
        }
        request.extend_from_slice(b"\r\n");
        request.extend_from_slice(&key3);

        let challenge = Challenge {
            number1,
            number2,
            key3,
        };
        (request, challenge)
    }

    /// Parse and check everything the server sends back.
    pub fn read_response<R: Read + ?Sized>(
        &self,
        stream: &mut R,
        challenge: &Challenge,
    ) -> Result<(), WsError> {
        read_status_line(stream)?;
        let fields = read_fields(stream)?;
        validate_fields(&fields)?;
        debug!(
            number1 = challenge.number1,
            number2 = challenge.number2,
            key3 = %hexify(&challenge.key3),
            "Response fields accepted"
        );
        verify_reply(stream, challenge)
    }
}

impl Handshake for ChallengeHandshake<'_> {
    fn perform<S, R>(&self, stream: &mut S, rng: &mut R) -> Result<(), WsError>
    where
        S: Read + Write + ?Sized,
        R: Rng + ?Sized,
    {
        let (request, challenge) = self.build_request(rng);
        send_all(stream, &request)?;
        debug!(key3 = %hexify(&challenge.key3));
        info!(draft = self.draft, "Sent handshake");

        self.read_response(stream, &challenge)
    }
}
