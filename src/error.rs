//! Error taxonomy shared by the engine, the resolver and handlers.
//!
//! Handlers surface failures by returning a [`ServiceError`]; the dispatch
//! boundary in the connection session translates each kind into a
//! status-coded HTTP response. `NotFound` doubles as the "decline this
//! route" signal so a handler can gate on the HTTP method.

use thiserror::Error;

/// Failure kinds that can escape a handler or the parameter resolver.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No route matched, or a handler declined the request.
    #[error("url not found")]
    NotFound,

    /// The request body claimed to be JSON but did not parse to an object.
    #[error("bad request")]
    BadRequest,

    /// A JSON value with no SQL rendering (object or nested array).
    #[error("unsupported json value type")]
    UnsupportedValue,

    /// SQL template consumed more placeholders than parameters given.
    #[error("too few parameters")]
    TooFewParams,

    /// SQL template finished with parameters left over.
    #[error("too many parameters")]
    TooManyParams,

    /// Row projection expected at most one row.
    #[error("too many objects to convert")]
    TooManyRows,

    /// An outbound HTTP client step failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The WebSocket peer performed a clean close.
    #[error("websocket session has been closed")]
    WsClosed,

    /// A WebSocket read or write failed for any other reason.
    #[error("websocket io error: {0}")]
    WsIo(String),

    /// Database driver failure (connect, query, commit).
    #[error(transparent)]
    Db(#[from] postgres::Error),

    /// Anything else a handler wants to report.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
