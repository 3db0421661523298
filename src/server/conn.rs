//! Per-connection state machine.
//!
//! Each accepted socket is driven by one coroutine: read a request,
//! classify it (plain HTTP versus WebSocket upgrade), dispatch through
//! the route table, write the response, then loop while keep-alive
//! holds. Handler panics and error returns are translated to
//! status-coded pages at this boundary; an upgrade hands the socket to
//! the WebSocket acceptor and re-enters the router on the WebSocket
//! table.

use super::request::{read_request, HttpRequest};
use super::response::{HttpResponse, ResponseHandle};
use super::Engine;
use crate::error::ServiceError;
use crate::resolve::RequestScope;
use crate::router::Reply;
use crate::ws;
use http::StatusCode;
use may::net::TcpStream;
use std::io::Write;
use std::net::Shutdown;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

pub(crate) fn serve_connection(engine: Arc<Engine>, mut stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    trace!(peer = %peer, "connection opened");

    let mut carry = Vec::new();
    loop {
        if stream.set_read_timeout(Some(engine.read_timeout)).is_err() {
            break;
        }
        let request = match read_request(&mut stream, &mut carry, engine.payload_limit) {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "read failed");
                break;
            }
        };
        debug!(
            peer = %peer,
            method = %request.method,
            target = %request.target,
            "request received"
        );

        if request.is_upgrade() {
            serve_websocket(engine, stream, request, peer);
            return;
        }

        let (bytes, keep_alive) = handle_http(&engine, request);
        if let Err(e) = stream.write_all(&bytes) {
            warn!(peer = %peer, error = %e, "write failed");
            break;
        }
        trace!(peer = %peer, bytes = bytes.len(), "response written");
        if !keep_alive {
            break;
        }
    }

    let _ = stream.shutdown(Shutdown::Write);
    trace!(peer = %peer, "connection closed");
}

/// Dispatch one HTTP request and serialize the outcome.
fn handle_http(engine: &Engine, request: HttpRequest) -> (Vec<u8>, bool) {
    let keep_alive = request.keep_alive();
    let url = request.path().to_string();
    let request = Arc::new(request);
    let response = ResponseHandle::new(HttpResponse::for_request(&engine.name, &request));

    let mut scope = RequestScope::new(engine, request, response.clone(), None);
    let outcome = catch_unwind(AssertUnwindSafe(|| engine.routes.dispatch(&mut scope)));
    drop(scope);

    match outcome {
        Ok(Ok(Reply::Json(value))) => {
            let mut res = response.lock();
            res.set_body(serde_json::to_vec(&value).unwrap_or_default());
            let keep_alive = res.keep_alive();
            (res.to_bytes(), keep_alive)
        }
        Ok(Ok(Reply::Manual)) => {
            let res = response.lock();
            let keep_alive = res.keep_alive();
            (res.to_bytes(), keep_alive)
        }
        Ok(Err(err)) => (error_page(engine, &url, keep_alive, &err), keep_alive),
        Err(panic) => {
            error!(url = %url, payload = ?panic_message(&panic), "handler panicked");
            let page = html_page(
                engine,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error: Unknown exception.".to_string(),
                keep_alive,
            );
            (page, keep_alive)
        }
    }
}

fn error_page(engine: &Engine, url: &str, keep_alive: bool, err: &ServiceError) -> Vec<u8> {
    let (status, body) = match err {
        ServiceError::NotFound => (
            StatusCode::NOT_FOUND,
            format!("The requested url '{url}' does not exist."),
        ),
        ServiceError::BadRequest => (
            StatusCode::BAD_REQUEST,
            "Request body is not a valid JSON string.".to_string(),
        ),
        other => {
            warn!(url = %url, error = %other, "handler failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {other}"),
            )
        }
    };
    html_page(engine, status, body, keep_alive)
}

fn html_page(engine: &Engine, status: StatusCode, body: String, keep_alive: bool) -> Vec<u8> {
    let mut res = HttpResponse::with_status(&engine.name, status, keep_alive);
    res.set_header("Content-Type", "text/html");
    res.set_body(body);
    res.to_bytes()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Complete the upgrade and run the handler from the WebSocket table.
fn serve_websocket(engine: Arc<Engine>, stream: TcpStream, request: HttpRequest, peer: String) {
    let channel = match ws::accept(stream, &request, &engine.name, peer.clone()) {
        Ok(channel) => Arc::new(channel),
        Err(e) => {
            warn!(peer = %peer, error = %e, "websocket accept failed");
            return;
        }
    };

    let request = Arc::new(request);
    // The response is never written on an upgraded socket; handlers drive
    // the channel directly.
    let response = ResponseHandle::new(HttpResponse::for_request(&engine.name, &request));
    let mut scope = RequestScope::new(&engine, request.clone(), response, Some(channel));
    let outcome = catch_unwind(AssertUnwindSafe(|| engine.ws_routes.dispatch(&mut scope)));
    match outcome {
        Ok(Ok(_)) => trace!(peer = %peer, "websocket handler finished"),
        Ok(Err(ServiceError::WsClosed)) => trace!(peer = %peer, "websocket closed by peer"),
        Ok(Err(e)) => warn!(peer = %peer, target = %request.target, error = %e, "websocket handler failed"),
        Err(panic) => {
            error!(peer = %peer, payload = ?panic_message(&panic), "websocket handler panicked")
        }
    }
    trace!(peer = %peer, "websocket session closed");
}
