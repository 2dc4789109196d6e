//! In-process echo server for integration tests.
//!
//! Accepts one connection on a loopback port, answers the opening handshake
//! of the requested draft, echoes text frames, and plays its side of the
//! closing handshake. The thread returns a transcript of what it saw.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use wsecho_proto::ws::handshake::Challenge;
use wsecho_proto::ProtocolVersion;

#[derive(Debug, Clone, Copy, Default)]
pub struct Behaviour {
    /// Flip a bit in the challenge reply.
    pub corrupt_reply: bool,
    /// Answer with this status code instead of 101.
    pub status: Option<u16>,
    /// Change the last byte of every echoed payload.
    pub tamper_echo: bool,
    /// Do not answer the client's closing frame.
    pub ignore_close: bool,
    /// Close the socket right after the handshake.
    pub hang_up: bool,
}

#[derive(Debug, Default)]
pub struct Transcript {
    pub request_head: String,
    pub messages: Vec<String>,
    pub close_received: bool,
    pub close_sent: bool,
}

pub struct MockServer {
    pub port: u16,
    handle: JoinHandle<Transcript>,
}

impl MockServer {
    pub fn spawn(version: ProtocolVersion, behaviour: Behaviour) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            serve(&mut stream, version, behaviour)
        });
        MockServer { port, handle }
    }

    pub fn join(self) -> Transcript {
        self.handle.join().expect("mock server panicked")
    }
}

fn read_byte(stream: &mut TcpStream) -> Option<u8> {
    let mut b = [0u8; 1];
    match stream.read(&mut b) {
        Ok(1) => Some(b[0]),
        _ => None,
    }
}

fn read_n(stream: &mut TcpStream, n: usize) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).ok()?;
    Some(buf)
}

fn key_number(key: &str) -> u32 {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let spaces = key.chars().filter(|&c| c == ' ').count() as u64;
    (digits.parse::<u64>().unwrap() / spaces) as u32
}

fn field<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n")
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
}

fn serve(stream: &mut TcpStream, version: ProtocolVersion, behaviour: Behaviour) -> Transcript {
    let mut transcript = Transcript::default();

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        match read_byte(stream) {
            Some(b) => head.push(b),
            None => return transcript,
        }
    }
    transcript.request_head = String::from_utf8_lossy(&head).into_owned();
    let status = behaviour.status.unwrap_or(101);

    match version {
        ProtocolVersion::Hixie75 => {
            let response = format!(
                "HTTP/1.1 {} Web Socket Protocol Handshake\r\n\
                 Upgrade: WebSocket\r\n\
                 Connection: Upgrade\r\n\
                 WebSocket-Origin: http://localhost/\r\n\
                 WebSocket-Location: ws://localhost/echo\r\n\
                 \r\n",
                status
            );
            stream.write_all(response.as_bytes()).unwrap();
        }
        ProtocolVersion::Hybi00 | ProtocolVersion::Hybi01 => {
            let Some(key3) = read_n(stream, 8) else {
                return transcript;
            };
            let head = &transcript.request_head;
            let challenge = Challenge {
                number1: key_number(field(head, "Sec-WebSocket-Key1").unwrap()),
                number2: key_number(field(head, "Sec-WebSocket-Key2").unwrap()),
                key3: key3.try_into().unwrap(),
            };
            let mut reply = challenge.expected();
            if behaviour.corrupt_reply {
                reply[0] ^= 0x01;
            }
            let response = format!(
                "HTTP/1.1 {} WebSocket Protocol Handshake\r\n\
                 Upgrade: WebSocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Origin: http://localhost/\r\n\
                 Sec-WebSocket-Location: ws://localhost/echo\r\n\
                 \r\n",
                status
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.write_all(&reply).unwrap();
        }
    }

    if behaviour.hang_up || status != 101 || behaviour.corrupt_reply {
        return transcript;
    }

    match version {
        ProtocolVersion::Hybi01 => echo_hybi01(stream, behaviour, &mut transcript),
        _ => echo_sentinel(stream, version, behaviour, &mut transcript),
    }
    transcript
}

fn echo_hybi01(stream: &mut TcpStream, behaviour: Behaviour, transcript: &mut Transcript) {
    const CLOSE: [u8; 2] = [0x01, 0x00];
    loop {
        let Some(header) = read_n(stream, 2) else {
            return;
        };
        if header == CLOSE {
            transcript.close_received = true;
            if !behaviour.ignore_close {
                let _ = stream.write_all(&CLOSE);
                transcript.close_sent = true;
            }
            return;
        }
        let (len, mut frame) = match header[1] {
            126 => {
                let ext = read_n(stream, 2).unwrap();
                let len = u16::from_be_bytes([ext[0], ext[1]]) as usize;
                let mut frame = header.clone();
                frame.extend_from_slice(&ext);
                (len, frame)
            }
            127 => {
                let ext = read_n(stream, 8).unwrap();
                let len = u64::from_be_bytes(ext.clone().try_into().unwrap()) as usize;
                let mut frame = header.clone();
                frame.extend_from_slice(&ext);
                (len, frame)
            }
            n => (n as usize, header.clone()),
        };
        let payload = read_n(stream, len).unwrap();
        let message = String::from_utf8_lossy(&payload).into_owned();
        frame.extend_from_slice(&payload);
        if behaviour.tamper_echo {
            if let Some(last) = frame.last_mut() {
                *last ^= 0x01;
            }
        }
        stream.write_all(&frame).unwrap();
        transcript.messages.push(message.clone());

        if message == "Goodbye" {
            stream.write_all(&CLOSE).unwrap();
            transcript.close_sent = true;
            if read_n(stream, 2).as_deref() == Some(&CLOSE[..]) {
                transcript.close_received = true;
            }
            return;
        }
    }
}

fn echo_sentinel(
    stream: &mut TcpStream,
    version: ProtocolVersion,
    behaviour: Behaviour,
    transcript: &mut Transcript,
) {
    const CLOSE: [u8; 2] = [0xFF, 0x00];
    loop {
        match read_byte(stream) {
            Some(0x00) => {}
            Some(0xFF) => {
                if read_byte(stream) == Some(0x00) {
                    transcript.close_received = true;
                    if !behaviour.ignore_close {
                        let _ = stream.write_all(&CLOSE);
                        transcript.close_sent = true;
                    }
                }
                return;
            }
            _ => return,
        }
        let mut payload = Vec::new();
        loop {
            match read_byte(stream) {
                Some(0xFF) => break,
                Some(b) => payload.push(b),
                None => return,
            }
        }
        let message = String::from_utf8_lossy(&payload).into_owned();
        if behaviour.tamper_echo {
            if let Some(last) = payload.last_mut() {
                *last ^= 0x01;
            }
        }
        let mut frame = vec![0x00];
        frame.extend_from_slice(&payload);
        frame.push(0xFF);
        stream.write_all(&frame).unwrap();
        transcript.messages.push(message.clone());

        if message == "Goodbye" && version == ProtocolVersion::Hybi00 {
            stream.write_all(&CLOSE).unwrap();
            transcript.close_sent = true;
            if read_n(stream, 2).as_deref() == Some(&CLOSE[..]) {
                transcript.close_received = true;
            }
            return;
        }
    }
}
