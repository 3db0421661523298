//! Outbound HTTP client for use inside handler coroutines.
//!
//! Every step (connect, write, read, shutdown) is a blocking call on a
//! coroutine-aware socket, so the calling coroutine suspends instead of
//! pinning a scheduler thread. Each step runs under a 30-second timeout.

use crate::config::NAME;
use crate::error::ServiceError;
use crate::server::request::find_header_end;
use http::Method;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{Shutdown, ToSocketAddrs};
use std::time::Duration;
use tracing::warn;

const STEP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_HEADERS: usize = 64;

/// Response from an outbound request.
#[derive(Debug)]
pub struct ClientResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ClientResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<Value, ServiceError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("response body is not JSON: {e}")))
    }
}

/// Coroutine-bound HTTP/1.1 client.
#[derive(Debug, Clone, Default)]
pub struct HttpClient;

impl HttpClient {
    pub fn new() -> Self {
        HttpClient
    }

    /// Send one request carrying a JSON body and read the full response.
    pub fn send(
        &self,
        host: &str,
        port: u16,
        method: Method,
        target: &str,
        body: &Value,
    ) -> Result<ClientResponse, ServiceError> {
        let fail = |step: &str, detail: String| {
            ServiceError::RequestFailed(format!("http_client {step}: {detail}"))
        };

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| fail("resolve", e.to_string()))?
            .next()
            .ok_or_else(|| fail("resolve", format!("no address for {host}:{port}")))?;

        let mut stream = may::net::TcpStream::connect(addr)
            .map_err(|e| fail("connect", e.to_string()))?;
        stream
            .set_read_timeout(Some(STEP_TIMEOUT))
            .map_err(|e| fail("connect", e.to_string()))?;
        stream
            .set_write_timeout(Some(STEP_TIMEOUT))
            .map_err(|e| fail("connect", e.to_string()))?;

        let request = build_request(host, &method, target, body);
        stream
            .write_all(&request)
            .map_err(|e| fail("write", e.to_string()))?;

        let response = read_response(&mut stream).map_err(|e| fail("read", e.to_string()))?;

        // `NotConnected` happens sometimes so don't bother reporting it.
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            if e.kind() != std::io::ErrorKind::NotConnected {
                warn!(error = %e, "http_client socket shutdown");
            }
        }
        Ok(response)
    }

    pub fn get(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<ClientResponse, ServiceError> {
        self.send(host, port, Method::GET, target, body)
    }

    pub fn post(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<ClientResponse, ServiceError> {
        self.send(host, port, Method::POST, target, body)
    }

    pub fn put(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<ClientResponse, ServiceError> {
        self.send(host, port, Method::PUT, target, body)
    }

    pub fn delete(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<ClientResponse, ServiceError> {
        self.send(host, port, Method::DELETE, target, body)
    }

    /// As [`get`](Self::get), returning the response body parsed as JSON.
    pub fn get_json(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<Value, ServiceError> {
        self.get(host, port, target, body)?.json()
    }

    pub fn post_json(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<Value, ServiceError> {
        self.post(host, port, target, body)?.json()
    }

    pub fn put_json(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<Value, ServiceError> {
        self.put(host, port, target, body)?.json()
    }

    pub fn delete_json(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: &Value,
    ) -> Result<Value, ServiceError> {
        self.delete(host, port, target, body)?.json()
    }
}

fn build_request(host: &str, method: &Method, target: &str, body: &Value) -> Vec<u8> {
    let payload = serde_json::to_vec(body).unwrap_or_default();
    let mut out = Vec::with_capacity(payload.len() + 128);
    out.extend_from_slice(format!("{method} {target} HTTP/1.1\r\n").as_bytes());
    out.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
    out.extend_from_slice(format!("User-Agent: {NAME}\r\n").as_bytes());
    out.extend_from_slice(b"Content-Type: application/json\r\n");
    out.extend_from_slice(format!("Content-Length: {}\r\n", payload.len()).as_bytes());
    out.extend_from_slice(b"Connection: close\r\n\r\n");
    out.extend_from_slice(&payload);
    out
}

fn read_response<R: Read>(stream: &mut R) -> std::io::Result<ClientResponse> {
    use std::io::{Error, ErrorKind};

    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(Error::new(ErrorKind::UnexpectedEof, "eof before header end"));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut parsed = httparse::Response::new(&mut headers);
    let status = parsed
        .parse(&buf[..header_end])
        .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
    if status.is_partial() {
        return Err(Error::new(ErrorKind::InvalidData, "partial response header"));
    }
    let code = parsed
        .code
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "missing status code"))?;
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

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.trim().parse::<usize>().ok());

    let mut body = buf.split_off(header_end);
    match content_length {
        Some(len) => {
            while body.len() < len {
                let n = stream.read(&mut chunk)?;
                if n == 0 {
                    return Err(Error::new(ErrorKind::UnexpectedEof, "eof inside body"));
                }
                body.extend_from_slice(&chunk[..n]);
            }
            body.truncate(len);
        }
        None => {
            // Close-delimited body.
            stream.read_to_end(&mut body)?;
        }
    }

    Ok(ClientResponse {
        status: code,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
