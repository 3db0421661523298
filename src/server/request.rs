//! HTTP/1.x request reading and parsing.
//!
//! One request is read per call from the connection's carry-over buffer
//! plus the socket; bytes belonging to a pipelined follow-up request are
//! left in the buffer for the next call. The body is capped by the
//! configured payload limit.

use http::Method;
use std::io::{Error, ErrorKind, Read};

const MAX_HEADERS: usize = 64;
const MAX_HEADER_BYTES: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

/// Offset just past the `\r\n\r\n` header terminator, if present.
pub(crate) fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// A parsed request.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    /// Full request target, query string included.
    pub target: String,
    /// Minor HTTP version: 0 or 1.
    pub version: u8,
    /// Header pairs with lowercased names, in wire order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Target up to the first `?`.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("/")
    }

    /// Media type of the body: `Content-Type` with spaces skipped and
    /// parameters cut at the first `;`.
    pub fn media_type(&self) -> String {
        let content_type = self.header("content-type").unwrap_or("");
        let mut media = String::new();
        for c in content_type.chars() {
            if c == ' ' {
                continue;
            }
            if c == ';' {
                break;
            }
            media.push(c);
        }
        media
    }

    /// Whether the connection may carry another request after this one.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").unwrap_or("");
        if self.version >= 1 {
            !token_in_list(connection, "close")
        } else {
            token_in_list(connection, "keep-alive")
        }
    }

    /// Whether this request asks for a WebSocket upgrade.
    pub fn is_upgrade(&self) -> bool {
        token_in_list(self.header("connection").unwrap_or(""), "upgrade")
            && self
                .header("upgrade")
                .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
                .unwrap_or(false)
    }
}

fn token_in_list(header: &str, token: &str) -> bool {
    header
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Read one request from `buf` + `stream`.
///
/// Returns `Ok(None)` on a clean end of stream (no buffered bytes). On
/// return, `buf` holds any bytes past the consumed request.
pub fn read_request<R: Read>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    body_limit: usize,
) -> std::io::Result<Option<HttpRequest>> {
    let mut chunk = [0u8; READ_CHUNK];
    let header_end = loop {
        if let Some(end) = find_header_end(buf) {
            break end;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(Error::new(ErrorKind::InvalidData, "request header too large"));
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed mid-request",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let status = parsed
        .parse(&buf[..header_end])
        .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
    if status.is_partial() {
        return Err(Error::new(ErrorKind::InvalidData, "partial request header"));
    }

    let method = parsed
        .method
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "missing method"))?
        .parse::<Method>()
        .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
    let target = parsed
        .path
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "missing target"))?
        .to_string();
    let version = parsed.version.unwrap_or(1);
    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    if headers.iter().any(|(n, _)| n == "transfer-encoding") {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "chunked transfer encoding is not supported",
        ));
    }
    let body_len = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| Error::new(ErrorKind::InvalidData, "invalid content-length"))
        })
        .transpose()?
        .unwrap_or(0);
    if body_len > body_limit {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("request body exceeds the {body_limit}-byte limit"),
        ));
    }

    let total = header_end + body_len;
    while buf.len() < total {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let rest = buf.split_off(total);
    let mut consumed = std::mem::replace(buf, rest);
    let body = consumed.split_off(header_end);

    Ok(Some(HttpRequest {
        method,
        target,
        version,
        headers,
        body,
    }))
}
