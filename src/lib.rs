//! coserv: an embeddable HTTP/WebSocket application server.
//!
//! A route table maps URL patterns with typed capture segments to plain
//! handler functions. Each route declares a list of placeholder tokens
//! (URL capture, session, request, response, merged JSON parameters,
//! pooled database handle, outbound HTTP client, WebSocket channel,
//! literal); the engine resolves every token lazily per request and
//! invokes the handler with the concrete values. All I/O runs on
//! stackful coroutines over one shared scheduler, so handlers are
//! written in straight-line blocking style and still suspend
//! cooperatively at every network primitive.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod logging;
pub mod params;
pub mod resolve;
pub mod router;
pub mod security;
pub mod server;
pub mod session;
pub mod ws;

pub use client::{ClientResponse, HttpClient};
pub use config::ServerConfig;
pub use db::{DbConn, DbPool, DbRows, DbTransaction};
pub use error::ServiceError;
pub use resolve::RequestScope;
pub use router::{HandlerResult, JsonParams, Reply, Route, Router, Token};
pub use server::{HttpRequest, HttpResponse, ResponseHandle, Server, ServerHandle};
pub use session::{Session, SessionData, SessionStore, SESSION_NAME};
pub use ws::WsChannel;
