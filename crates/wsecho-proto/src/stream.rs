//! Byte stream plumbing shared by every protocol component.
//!
//! - [`receive_exact`]: read exactly `n` bytes, failing if the peer closes first
//! - [`WsStream`]: plain TCP or rustls-wrapped transport, released on drop
//! - [`connect`]: open the transport described by a [`Config`]

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use tracing::debug;

use crate::config::Config;
use crate::error::WsError;

/// Read exactly `n` bytes from `stream`.
///
/// Issues as many reads as needed and buffers nothing beyond the returned
/// bytes. A zero-length read before `n` bytes arrive is reported as
/// [`WsError::ConnectionClosed`].
pub fn receive_exact<R: Read + ?Sized>(stream: &mut R, n: usize) -> Result<Vec<u8>, WsError> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(WsError::ConnectionClosed {
                    expected: n,
                    received: filled,
                })
            }
            Ok(read) => filled += read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WsError::Io(e)),
        }
    }
    Ok(buf)
}

/// Read a single byte. Used by the byte-at-a-time handshake parsers.
pub(crate) fn receive_byte<R: Read + ?Sized>(stream: &mut R) -> Result<u8, WsError> {
    let byte = receive_exact(stream, 1)?;
    Ok(byte[0])
}

/// Write all of `bytes` and flush.
pub(crate) fn send_all<W: Write + ?Sized>(stream: &mut W, bytes: &[u8]) -> Result<(), WsError> {
    stream.write_all(bytes)?;
    stream.flush()?;
    Ok(())
}

/// Transport for one echo session: plain TCP or TLS over TCP.
///
/// Dropping the stream releases the connection (TLS close_notify first,
/// then TCP shutdown). Errors during release are ignored.
pub enum WsStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl WsStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            WsStream::Plain(s) => s,
            WsStream::Tls(s) => s.get_ref(),
        }
    }
}

impl Read for WsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            WsStream::Plain(s) => s.read(buf),
            WsStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for WsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            WsStream::Plain(s) => s.write(buf),
            WsStream::Tls(s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            WsStream::Plain(s) => s.flush(),
            WsStream::Tls(s) => s.flush(),
        }
    }
}

impl Drop for WsStream {
    fn drop(&mut self) {
        if let WsStream::Tls(s) = self {
            s.conn.send_close_notify();
            let _ = s.flush();
        }
        let _ = self.tcp().shutdown(Shutdown::Both);
        debug!("Transport released");
    }
}

/// Wrap a connected TCP stream in a rustls client session for `hostname`
/// and drive the TLS handshake to completion. Certificate and handshake
/// failures are reported as [`WsError::Tls`].
fn upgrade_to_tls(
    stream: TcpStream,
    hostname: &str,
) -> Result<StreamOwned<ClientConnection, TcpStream>, WsError> {
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| WsError::Tls(format!("invalid hostname for TLS: {}", hostname)))?;
    let conn = ClientConnection::new(Arc::new(config), server_name)
        .map_err(|e| WsError::Tls(format!("TLS connection: {}", e)))?;
    let mut tls = StreamOwned::new(conn, stream);
    while tls.conn.is_handshaking() {
        tls.conn
            .complete_io(&mut tls.sock)
            .map_err(|e| WsError::Tls(format!("TLS handshake with {}: {}", hostname, e)))?;
    }
    Ok(tls)
}

/// Open the transport for `config`.
///
/// The socket timeout bounds connect, every read and every write. A timed
/// out read or write surfaces as [`WsError::Io`].
pub fn connect(config: &Config) -> Result<WsStream, WsError> {
    let addrs = (config.host.as_str(), config.port).to_socket_addrs()?;
    let mut last_err = None;
    let mut tcp = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.socket_timeout) {
            Ok(s) => {
                tcp = Some(s);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    let tcp = match (tcp, last_err) {
        (Some(s), _) => s,
        (None, Some(e)) => return Err(WsError::Io(e)),
        (None, None) => {
            return Err(WsError::Config(format!(
                "could not resolve {}:{}",
                config.host, config.port
            )))
        }
    };
    tcp.set_read_timeout(Some(config.socket_timeout))?;
    tcp.set_write_timeout(Some(config.socket_timeout))?;
    tcp.set_nodelay(true)?;
    debug!(host = %config.host, port = config.port, tls = config.use_tls, "Connected");

    if config.use_tls {
        let tls = upgrade_to_tls(tcp, &config.host)?;
        Ok(WsStream::Tls(Box::new(tls)))
    } else {
        Ok(WsStream::Plain(tcp))
    }
}
