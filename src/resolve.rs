//! Per-request context and lazy placeholder resolution.
//!
//! A [`RequestScope`] bundles everything a token can resolve to: the URL
//! captures, the parsed request, the response builder, and the lazily
//! filled session, database handle, HTTP client and WebSocket channel.
//! Session and database resolutions are cached so repeated tokens within
//! one request yield the same object; the pooled connection is released
//! when the scope drops at the end of the request.

use crate::client::HttpClient;
use crate::db::DbConn;
use crate::error::ServiceError;
use crate::params;
use crate::router::CaptureVec;
use crate::server::request::HttpRequest;
use crate::server::response::ResponseHandle;
use crate::server::Engine;
use crate::session::{Session, SESSION_NAME};
use crate::ws::WsChannel;
use anyhow::anyhow;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

/// Everything one request's placeholders resolve against.
pub struct RequestScope<'e> {
    engine: &'e Engine,
    pub captures: CaptureVec,
    pub request: Arc<HttpRequest>,
    pub response: ResponseHandle,
    ws: Option<Arc<WsChannel>>,
    session: Option<Session>,
    db: Option<DbConn>,
    client: Option<HttpClient>,
}

impl<'e> RequestScope<'e> {
    pub(crate) fn new(
        engine: &'e Engine,
        request: Arc<HttpRequest>,
        response: ResponseHandle,
        ws: Option<Arc<WsChannel>>,
    ) -> Self {
        RequestScope {
            engine,
            captures: CaptureVec::new(),
            request,
            response,
            ws,
            session: None,
            db: None,
            client: None,
        }
    }

    /// Resolve the session for this request, creating one if no cookie
    /// names a live session.
    ///
    /// The `Cookie` header is parsed with the `;` grammar; if several
    /// cookies share the session name, each is probed in order and the
    /// first live hit wins. Only a freshly created session sets a
    /// `Set-Cookie` header. The result is cached on the scope.
    pub fn resolve_session(&mut self) -> Session {
        if let Some(session) = &self.session {
            return session.clone();
        }
        let cookie_header = self.request.header("cookie").unwrap_or("");
        let (dict, list) = params::parse_params(cookie_header, ';');

        let mut key = String::new();
        let mut found = None;
        if let Some(id) = dict.get(SESSION_NAME) {
            key = id.clone();
        } else if let Some(ids) = list.get(SESSION_NAME) {
            for id in ids {
                if let Some(session) = self.engine.sessions.try_get(id) {
                    trace!(session_id = %id, "session resolved from cookie list");
                    found = Some(session);
                    break;
                }
            }
        }
        let session = match found {
            Some(session) => session,
            None => {
                let (session, created) = self.engine.sessions.get_or_create(&mut key);
                if created {
                    self.response
                        .lock()
                        .append_header("Set-Cookie", format!("{SESSION_NAME}={key}; Path=/"));
                }
                session
            }
        };
        self.session = Some(session.clone());
        session
    }

    /// Acquire the request's database handle, blocking on an exhausted
    /// pool. Cached, so one request uses one connection.
    pub fn resolve_db(&mut self) -> Result<DbConn, ServiceError> {
        if let Some(conn) = &self.db {
            return Ok(conn.clone());
        }
        let pool = self
            .engine
            .pool
            .as_ref()
            .ok_or_else(|| ServiceError::Internal(anyhow!("database pool is not configured")))?;
        let conn = DbConn::new(pool.get_or_block());
        self.db = Some(conn.clone());
        Ok(conn)
    }

    /// The outbound HTTP client bound to this coroutine.
    pub fn resolve_client(&mut self) -> HttpClient {
        self.client.get_or_insert_with(HttpClient::new).clone()
    }

    /// The WebSocket channel; errors on the HTTP route table.
    pub fn resolve_ws(&self) -> Result<Arc<WsChannel>, ServiceError> {
        self.ws
            .clone()
            .ok_or_else(|| ServiceError::Internal(anyhow!("not a websocket request")))
    }

    /// Build the merged parameter object.
    ///
    /// A JSON body must parse to an object; a form body goes through the
    /// param grammar. Query-string parameters are merged afterwards, so
    /// body-side keys win on conflict. Multi-valued parameters become
    /// arrays of strings.
    pub fn json_params(&self) -> Result<Map<String, Value>, ServiceError> {
        let mut body = Map::new();
        let add = |body: &mut Map<String, Value>,
                   dict: params::ParamMap,
                   list: params::ParamListMap| {
            for (k, v) in dict {
                if !body.contains_key(&k) {
                    body.insert(k, Value::String(v));
                }
            }
            for (k, vs) in list {
                if !body.contains_key(&k) {
                    body.insert(k, Value::Array(vs.into_iter().map(Value::String).collect()));
                }
            }
        };

        if !self.request.body.is_empty() {
            let media = self.request.media_type();
            if media == "application/json" {
                let parsed: Value = serde_json::from_slice(&self.request.body)
                    .map_err(|_| ServiceError::BadRequest)?;
                match parsed {
                    Value::Object(obj) => body = obj,
                    _ => return Err(ServiceError::BadRequest),
                }
            } else if media == "application/x-www-form-urlencoded" {
                let text = String::from_utf8_lossy(&self.request.body);
                let (dict, list) = params::parse_params(&text, '&');
                add(&mut body, dict, list);
            }
        }
        let (_, dict, list) = params::parse_url(&self.request.target);
        add(&mut body, dict, list);
        Ok(body)
    }
}
