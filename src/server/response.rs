//! Response builder and serialization.
//!
//! Every response starts with the framework `Server` header and an
//! `application/json` content type; handlers may override both. The
//! builder is shared with handlers through [`ResponseHandle`]; the
//! engine serializes exactly once, after the handler has returned.

use super::request::HttpRequest;
use http::StatusCode;
use std::ops::DerefMut;
use std::sync::Arc;

/// Mutable response under construction.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    keep_alive: bool,
}

impl HttpResponse {
    /// A `200 OK` skeleton mirroring the request's keep-alive wish.
    pub fn for_request(server_name: &str, request: &HttpRequest) -> Self {
        Self::with_status(server_name, StatusCode::OK, request.keep_alive())
    }

    pub fn with_status(server_name: &str, status: StatusCode, keep_alive: bool) -> Self {
        HttpResponse {
            status,
            headers: vec![
                ("Server".to_string(), server_name.to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: Vec::new(),
            keep_alive,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing an existing one of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Add a header without replacing existing ones (e.g. `Set-Cookie`).
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Force the connection closed after this response.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    /// Serialize status line, headers, framing and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        let mut out = Vec::with_capacity(self.body.len() + 256);
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), reason).as_bytes());
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        out.extend_from_slice(format!("Connection: {connection}\r\n\r\n").as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Shared handle to the response being built for the current request.
///
/// The engine guarantees a single writer: one coroutine serves a request
/// at a time and the response is serialized only after the handler
/// returns. The lock is coroutine-aware.
#[derive(Clone)]
pub struct ResponseHandle {
    inner: Arc<may::sync::Mutex<HttpResponse>>,
}

impl ResponseHandle {
    pub(crate) fn new(response: HttpResponse) -> Self {
        ResponseHandle {
            inner: Arc::new(may::sync::Mutex::new(response)),
        }
    }

    /// Lock the response for modification.
    pub fn lock(&self) -> impl DerefMut<Target = HttpResponse> + '_ {
        self.inner.lock().unwrap()
    }
}
