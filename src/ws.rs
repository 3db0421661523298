//! WebSocket channel and server-side handshake.
//!
//! The connection session detects the upgrade; [`accept`] validates the
//! handshake headers, answers `101 Switching Protocols` with the
//! framework `Server` header, and hands the raw socket to the RFC 6455
//! codec. The resulting [`WsChannel`] is what `Token::WsChannel` resolves
//! to on the WebSocket route table.

use crate::error::ServiceError;
use crate::server::request::HttpRequest;
use base64::{prelude::BASE64_STANDARD, Engine};
use may::net::TcpStream;
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::io::Write;
use tracing::trace;
use tungstenite::protocol::Role;
use tungstenite::{Message, WebSocket};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Sec-WebSocket-Accept value for a handshake key.
pub fn accept_key(sec_websocket_key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(sec_websocket_key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Complete the server handshake for an upgrade request and wrap the
/// socket in a message channel.
pub(crate) fn accept(
    mut stream: TcpStream,
    request: &HttpRequest,
    server_name: &str,
    peer: String,
) -> std::io::Result<WsChannel> {
    use std::io::{Error, ErrorKind};

    let key = request
        .header("sec-websocket-key")
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "missing Sec-WebSocket-Key"))?;
    let version_ok = request
        .header("sec-websocket-version")
        .map(|v| v.trim() == "13")
        .unwrap_or(false);
    if !version_ok {
        return Err(Error::new(ErrorKind::InvalidData, "unsupported websocket version"));
    }

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         Server: {} websocket-server\r\n\r\n",
        accept_key(key.trim()),
        server_name
    );
    stream.write_all(response.as_bytes())?;
    // The per-request read timeout does not apply to an open channel.
    stream.set_read_timeout(None)?;
    stream.set_write_timeout(None)?;

    trace!(peer = %peer, "websocket session opened");
    Ok(WsChannel {
        peer,
        socket: may::sync::Mutex::new(WebSocket::from_raw_socket(stream, Role::Server, None)),
    })
}

/// Post-upgrade message channel.
///
/// Reads and writes suspend the calling coroutine; the internal lock is
/// coroutine-aware so the channel may be shared across a handler's
/// helpers.
pub struct WsChannel {
    peer: String,
    socket: may::sync::Mutex<WebSocket<TcpStream>>,
}

impl WsChannel {
    /// Peer address the channel was accepted from.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read the next data message as text.
    ///
    /// Control frames are handled internally. Returns
    /// [`ServiceError::WsClosed`] once the peer performs a clean close.
    pub fn read(&self) -> Result<String, ServiceError> {
        let mut socket = self.socket.lock().unwrap();
        loop {
            match socket.read() {
                Ok(Message::Text(text)) => {
                    trace!(peer = %self.peer, "websocket read");
                    return Ok(text);
                }
                Ok(Message::Binary(bytes)) => {
                    trace!(peer = %self.peer, "websocket read");
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                Ok(Message::Close(_)) => return Err(ServiceError::WsClosed),
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => {
                    return Err(ServiceError::WsClosed)
                }
                Err(e) => return Err(ServiceError::WsIo(format!("websocket read: {e}"))),
            }
        }
    }

    /// Read a message and parse it as JSON.
    pub fn read_json(&self) -> Result<Value, ServiceError> {
        let text = self.read()?;
        serde_json::from_str(&text)
            .map_err(|e| ServiceError::WsIo(format!("websocket read: invalid JSON: {e}")))
    }

    /// Write one text message.
    pub fn write(&self, data: &str) -> Result<(), ServiceError> {
        let mut socket = self.socket.lock().unwrap();
        socket
            .send(Message::text(data))
            .map_err(|e| ServiceError::WsIo(format!("websocket write: {e}")))?;
        trace!(peer = %self.peer, "websocket write");
        Ok(())
    }

    /// Serialize a JSON value and write it as one text message.
    pub fn write_json(&self, val: &Value) -> Result<(), ServiceError> {
        self.write(&val.to_string())
    }
}
