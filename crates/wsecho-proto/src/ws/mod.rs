//! WebSocket draft protocols (Hixie 75, HyBi 00, HyBi 01).
//!
//! - **Handshake** (`handshake`, `hixie75`): opening handshake per draft
//! - **Frame codec** (`frame`): text frame encoding and validation
//! - **Close** (`close`): closing handshake per draft

pub mod close;
pub mod frame;
pub mod handshake;
pub mod hixie75;

pub use close::{closing_handshake, CloseOutcome, GOODBYE_MESSAGE};
pub use frame::{FrameCodec, Hybi01Codec, SentinelCodec};
pub use handshake::{generate_key, Challenge, ChallengeHandshake, Handshake, HeaderMap};
pub use hixie75::Hixie75Handshake;
