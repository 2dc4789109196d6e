//! Text frame codecs for the three drafts.
//!
//! - [`Hybi01Codec`]: opcode byte + 7/16/64-bit length + payload
//! - [`SentinelCodec`]: `0x00 || utf8 || 0xFF`, shared by HyBi 00 and Hixie 75
//!
//! Decoding is lenient about UTF-8: invalid sequences are replaced, never
//! rejected.

use crate::error::WsError;

/// HyBi 01 opcode for a close frame.
pub const OPCODE_CLOSE: u8 = 0x1;
/// HyBi 01 opcode for a text frame.
pub const OPCODE_TEXT: u8 = 0x4;

/// HyBi 01 closing frame: close opcode with an empty payload.
pub const HYBI01_CLOSING_FRAME: [u8; 2] = [OPCODE_CLOSE, 0x00];
/// HyBi 00 closing frame: the `0xFF 0x00` sentinel pair.
pub const HYBI00_CLOSING_FRAME: [u8; 2] = [0xFF, 0x00];

/// Encode/decode one text message in a draft's wire format.
pub trait FrameCodec {
    /// Wire bytes for `payload`.
    fn encode(&self, payload: &str) -> Result<Vec<u8>, WsError>;

    /// Payload carried by `frame`, which must be one complete frame.
    fn decode(&self, frame: &[u8]) -> Result<String, WsError>;

    /// Frame exchanged by the closing handshake, if the draft has one.
    fn closing_frame(&self) -> Option<&'static [u8]>;
}

/// HyBi 01 framing. Frames are never masked or fragmented.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hybi01Codec;

impl FrameCodec for Hybi01Codec {
    fn encode(&self, payload: &str) -> Result<Vec<u8>, WsError> {
        let bytes = payload.as_bytes();
        let len = bytes.len() as u64;

        let mut frame = Vec::with_capacity(bytes.len() + 10);
        // No MORE/RSV flags.
        frame.push(OPCODE_TEXT);
        if len <= 125 {
            frame.push(len as u8);
        } else if len < 1 << 16 {
            frame.push(126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        } else if len < 1 << 63 {
            frame.push(127);
            frame.extend_from_slice(&len.to_be_bytes());
        } else {
            return Err(WsError::Frame(format!("too long payload ({} bytes)", len)));
        }
        frame.extend_from_slice(bytes);
        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> Result<String, WsError> {
        if frame.len() <= 1 {
            return Err(WsError::Frame(format!(
                "incomplete {} octet frame",
                frame.len()
            )));
        }

        let first = frame[0];
        if first & 0x0F != OPCODE_TEXT {
            return Err(WsError::Frame(format!("bad opcode {}", first & 0x0F)));
        }
        if first & 0xF0 != 0 {
            return Err(WsError::Frame(
                "unsupported flag (more/rsv1/rsv2/rsv3) is set".to_string(),
            ));
        }

        let second = frame[1];
        if second & 0x80 != 0 {
            return Err(WsError::Frame("unsupported flag rsv4 is set".to_string()));
        }

        let (payload_len, payload_pos) = match second & 0x7F {
            126 => {
                let ext = frame
                    .get(2..4)
                    .ok_or_else(|| WsError::Frame("incomplete length header".to_string()))?;
                (u16::from_be_bytes([ext[0], ext[1]]) as u64, 4)
            }
            127 => {
                let ext: [u8; 8] = frame
                    .get(2..10)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| WsError::Frame("incomplete length header".to_string()))?;
                (u64::from_be_bytes(ext), 10)
            }
            len => (len as u64, 2),
        };

        let available = (frame.len() - payload_pos) as u64;
        if available < payload_len {
            return Err(WsError::Frame(format!(
                "incomplete payload: {} of {} bytes",
                available, payload_len
            )));
        }

        let end = payload_pos + payload_len as usize;
        Ok(String::from_utf8_lossy(&frame[payload_pos..end]).into_owned())
    }

    fn closing_frame(&self) -> Option<&'static [u8]> {
        Some(&HYBI01_CLOSING_FRAME)
    }
}

/// Sentinel-delimited framing used by HyBi 00 and Hixie 75.
///
/// The two drafts share the frame format but differ in closing: HyBi 00
/// exchanges `0xFF 0x00`, Hixie 75 has no closing handshake.
#[derive(Debug, Clone, Copy)]
pub struct SentinelCodec {
    closing: bool,
}

impl SentinelCodec {
    pub const HYBI00: SentinelCodec = SentinelCodec { closing: true };
    pub const HIXIE75: SentinelCodec = SentinelCodec { closing: false };
}

impl FrameCodec for SentinelCodec {
    fn encode(&self, payload: &str) -> Result<Vec<u8>, WsError> {
        let mut frame = Vec::with_capacity(payload.len() + 2);
        frame.push(0x00);
        frame.extend_from_slice(payload.as_bytes());
        frame.push(0xFF);
        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> Result<String, WsError> {
        match frame.first() {
            None => Err(WsError::Frame("incomplete 0 octet frame".to_string())),
            Some(&0x00) => {
                // Strip the type byte and the terminator.
                let payload = frame.get(1..frame.len() - 1).unwrap_or(&[]);
                Ok(String::from_utf8_lossy(payload).into_owned())
            }
            Some(&other) => Err(WsError::Frame(format!("bad frame type {}", other))),
        }
    }

    fn closing_frame(&self) -> Option<&'static [u8]> {
        if self.closing {
            Some(&HYBI00_CLOSING_FRAME)
        } else {
            None
        }
    }
}
