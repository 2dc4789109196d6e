//! Echo client driver.
//!
//! One run is: connect, opening handshake, send each message and check its
//! echo, closing handshake, release. The first error ends the run; the
//! transport is released on every path when the [`WsStream`] is dropped.

use std::fmt;
use std::io::{Read, Write};

use rand::Rng;
use tracing::info;

use crate::config::Config;
use crate::error::WsError;
use crate::stream::{connect, receive_exact, send_all, WsStream};
use crate::ws::{
    closing_handshake, ChallengeHandshake, CloseOutcome, FrameCodec, Handshake, Hixie75Handshake,
    GOODBYE_MESSAGE,
};

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReport {
    /// Decoded payloads of the echoed frames, in send order.
    pub echoed: Vec<String>,
    pub close: CloseOutcome,
}

/// Drives one connect-handshake-exchange-close cycle.
///
/// `out` receives the echo trace (`Send: ...`, `Recv: ...`) when the
/// configuration is verbose.
pub struct EchoClient<'a, W: Write> {
    config: &'a Config,
    out: W,
}

impl<'a, W: Write> EchoClient<'a, W> {
    pub fn new(config: &'a Config, out: W) -> Self {
        Self { config, out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Connect to the configured server and run the session.
    pub fn run(&mut self) -> Result<EchoReport, WsError> {
        self.config.validate()?;
        let mut stream: WsStream = connect(self.config)?;
        let mut rng = rand::rng();
        // `stream` is dropped, releasing the connection, on both outcomes.
        self.run_on(&mut stream, &mut rng)
    }

    /// Run the session over an already-connected stream.
    pub fn run_on<S, R>(&mut self, stream: &mut S, rng: &mut R) -> Result<EchoReport, WsError>
    where
        S: Read + Write + ?Sized,
        R: Rng + ?Sized,
    {
        let config = self.config;

        match config.version.draft_number() {
            Some(draft) => ChallengeHandshake::new(config, draft).perform(stream, rng)?,
            None => Hixie75Handshake::new(config).perform(stream, rng)?,
        }
        info!(version = %config.version, "Connection established");

        let codec = config.version.codec();
        let mut echoed = Vec::with_capacity(config.messages.len());
        for message in &config.messages {
            echoed.push(self.echo(stream, codec, message)?);
        }

        let server_initiated = config
            .messages
            .last()
            .is_some_and(|m| m == GOODBYE_MESSAGE);
        let verbose = config.verbose;
        let out = &mut self.out;
        let close = closing_handshake(
            stream,
            codec.closing_frame(),
            server_initiated,
            &mut |line: &str| {
                if verbose {
                    let _ = writeln!(out, "{}", line);
                }
            },
        );
        Ok(EchoReport { echoed, close })
    }

    /// Send one message and check that the exact same frame comes back.
    fn echo<S>(
        &mut self,
        stream: &mut S,
        codec: &dyn FrameCodec,
        message: &str,
    ) -> Result<String, WsError>
    where
        S: Read + Write + ?Sized,
    {
        let frame = codec.encode(message)?;
        send_all(stream, &frame)?;
        self.trace(format_args!("Send: {}", message));

        let received = receive_exact(stream, frame.len())?;
        let checked = codec.decode(&received).and_then(|payload| {
            self.trace(format_args!("Recv: {}", payload));
            if received != frame {
                return Err(WsError::EchoMismatch {
                    sent: frame,
                    received,
                });
            }
            Ok(payload)
        });
        if let Err(e) = &checked {
            self.trace(format_args!("Error: {}", e));
        }
        checked
    }

    fn trace(&mut self, line: fmt::Arguments<'_>) {
        if self.config.verbose {
            let _ = writeln!(self.out, "{}", line);
        }
    }
}
