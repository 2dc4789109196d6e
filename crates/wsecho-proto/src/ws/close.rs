//! Closing handshake.
//!
//! HyBi 01 and HyBi 00 exchange a fixed closing frame (`0x01 0x00` and
//! `0xFF 0x00`); Hixie 75 has none. Nothing here is fatal: a timeout, a
//! short read or a wrong ack is logged and the caller releases the
//! transport anyway.

use std::io::{Read, Write};

use tracing::{info, warn};

use crate::error::{hexify, WsError};
use crate::stream::{receive_exact, send_all};

/// Message that asks the echo server to start the closing handshake.
pub const GOODBYE_MESSAGE: &str = "Goodbye";

/// How the closing handshake ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The draft has no closing handshake.
    Skipped,
    /// The server sent the closing frame first and it was acknowledged.
    ServerInitiated,
    /// The client sent the closing frame and the server echoed it.
    Acknowledged,
    /// The client sent (or tried to send) the closing frame and no valid
    /// ack arrived.
    NoAck,
}

/// Run the closing handshake with `closing_frame`.
///
/// When `server_initiated` is set (the last message sent was
/// [`GOODBYE_MESSAGE`]), the server's closing frame is awaited first and
/// echoed back. Otherwise, or if the server's frame does not arrive, the
/// client sends its own closing frame and waits for the echo. `trace`
/// receives the user-facing progress lines.
pub fn closing_handshake<S, T>(
    stream: &mut S,
    closing_frame: Option<&[u8]>,
    server_initiated: bool,
    trace: &mut T,
) -> CloseOutcome
where
    S: Read + Write + ?Sized,
    T: FnMut(&str),
{
    let Some(frame) = closing_frame else {
        return CloseOutcome::Skipped;
    };

    if server_initiated {
        info!("Wait for server-initiated closing handshake");
        match receive_exact(stream, frame.len()) {
            Ok(closing) if closing == frame => {
                trace("Recv close");
                if let Err(e) = send_all(stream, frame) {
                    warn!(error = %e, "Failed to acknowledge closing handshake");
                    return CloseOutcome::NoAck;
                }
                trace("Send ack");
                info!("Received closing handshake and sent ack");
                return CloseOutcome::ServerInitiated;
            }
            Ok(closing) => {
                warn!(received = %hexify(&closing), "Unexpected bytes instead of closing frame");
            }
            Err(e) => warn!(error = %e, "No closing frame from server"),
        }
    }

    client_initiated(stream, frame, trace)
}

fn client_initiated<S, T>(stream: &mut S, frame: &[u8], trace: &mut T) -> CloseOutcome
where
    S: Read + Write + ?Sized,
    T: FnMut(&str),
{
    if let Err(e) = send_all(stream, frame) {
        warn!(error = %e, "Failed to send closing handshake");
        return CloseOutcome::NoAck;
    }
    trace("Send close");
    info!("Sent closing handshake");

    match receive_exact(stream, frame.len()) {
        Ok(closing) if closing == frame => {
            trace("Recv ack");
            info!("Received ack");
            CloseOutcome::Acknowledged
        }
        Ok(closing) => {
            warn!(received = %hexify(&closing), "Received no valid ack");
            CloseOutcome::NoAck
        }
        Err(WsError::Io(e)) => {
            warn!(error = %e, "Received no ack before timeout");
            CloseOutcome::NoAck
        }
        Err(e) => {
            warn!(error = %e, "Received no valid ack");
            CloseOutcome::NoAck
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::frame::{HYBI00_CLOSING_FRAME, HYBI01_CLOSING_FRAME};
    use std::io::Cursor;

    struct TestStream {
        read_buf: Cursor<Vec<u8>>,
        write_buf: Vec<u8>,
        fail_writes: bool,
    }

    impl TestStream {
        fn new(incoming: &[u8]) -> Self {
            Self {
                read_buf: Cursor::new(incoming.to_vec()),
                write_buf: Vec::new(),
                fail_writes: false,
            }
        }
    }

    impl Read for TestStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.read_buf.read(buf)
        }
    }

    impl Write for TestStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.fail_writes {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "peer gone",
                ));
            }
            self.write_buf.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn run(stream: &mut TestStream, frame: Option<&[u8]>, server_initiated: bool) -> (CloseOutcome, Vec<String>) {
        let mut lines = Vec::new();
        let outcome = closing_handshake(stream, frame, server_initiated, &mut |l: &str| {
            lines.push(l.to_string())
        });
        (outcome, lines)
    }

    #[test]
    fn test_hixie75_skips() {
        let mut stream = TestStream::new(b"");
        let (outcome, lines) = run(&mut stream, None, true);
        assert_eq!(outcome, CloseOutcome::Skipped);
        assert!(lines.is_empty());
        assert!(stream.write_buf.is_empty());
    }

    #[test]
    fn test_client_initiated_ack() {
        let mut stream = TestStream::new(&HYBI01_CLOSING_FRAME);
        let (outcome, lines) = run(&mut stream, Some(&HYBI01_CLOSING_FRAME), false);
        assert_eq!(outcome, CloseOutcome::Acknowledged);
        assert_eq!(lines, vec!["Send close", "Recv ack"]);
        assert_eq!(stream.write_buf, HYBI01_CLOSING_FRAME);
    }

    #[test]
    fn test_client_initiated_no_ack() {
        // Server just hangs up.
        let mut stream = TestStream::new(b"");
        let (outcome, lines) = run(&mut stream, Some(&HYBI00_CLOSING_FRAME), false);
        assert_eq!(outcome, CloseOutcome::NoAck);
        assert_eq!(lines, vec!["Send close"]);
        assert_eq!(stream.write_buf, HYBI00_CLOSING_FRAME);
    }

    #[test]
    fn test_client_initiated_wrong_ack() {
        let mut stream = TestStream::new(b"\xff\x01");
        let (outcome, _) = run(&mut stream, Some(&HYBI00_CLOSING_FRAME), false);
        assert_eq!(outcome, CloseOutcome::NoAck);
    }

    #[test]
    fn test_server_initiated() {
        let mut stream = TestStream::new(&HYBI00_CLOSING_FRAME);
        let (outcome, lines) = run(&mut stream, Some(&HYBI00_CLOSING_FRAME), true);
        assert_eq!(outcome, CloseOutcome::ServerInitiated);
        assert_eq!(lines, vec!["Recv close", "Send ack"]);
        // Exactly one frame goes out: the ack.
        assert_eq!(stream.write_buf, HYBI00_CLOSING_FRAME);
    }

    #[test]
    fn test_server_initiated_falls_back_to_client() {
        // The server sends something else; the client starts closing itself
        // and the second read finds nothing.
        let mut stream = TestStream::new(b"\x04\x00");
        let (outcome, lines) = run(&mut stream, Some(&HYBI01_CLOSING_FRAME), true);
        assert_eq!(outcome, CloseOutcome::NoAck);
        assert_eq!(lines, vec!["Send close"]);
        assert_eq!(stream.write_buf, HYBI01_CLOSING_FRAME);
    }

    #[test]
    fn test_send_failure_is_not_fatal() {
        let mut stream = TestStream::new(b"");
        stream.fail_writes = true;
        let (outcome, lines) = run(&mut stream, Some(&HYBI01_CLOSING_FRAME), false);
        assert_eq!(outcome, CloseOutcome::NoAck);
        assert!(lines.is_empty());
    }
}
