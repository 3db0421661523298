//! Typed parameter injection.
//!
//! A route declares a list of placeholder [`Token`]s; the handler is a
//! plain function whose parameter types each implement [`Bind`]. At
//! route construction the token list is checked against the handler's
//! arity and parameter types; per request, each token is resolved
//! lazily against the [`RequestScope`] in argument order and the handler
//! is invoked with the concrete values.

use crate::client::HttpClient;
use crate::db::DbConn;
use crate::error::ServiceError;
use crate::resolve::RequestScope;
use crate::server::request::HttpRequest;
use crate::server::response::ResponseHandle;
use crate::session::Session;
use crate::ws::WsChannel;
use anyhow::anyhow;
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Placeholder token bound at route construction.
#[derive(Debug, Clone)]
pub enum Token {
    /// The n-th positional URL capture (1-based).
    Url(usize),
    /// The session for this request, created on first reference.
    Session,
    /// The parsed request.
    Request,
    /// The mutable response builder.
    Response,
    /// Request body (JSON or form) merged with query-string parameters.
    JsonParams,
    /// A pooled database connection, acquired lazily.
    DbHandle,
    /// Outbound HTTP client bound to this coroutine.
    HttpClient,
    /// The WebSocket channel; only resolvable on the WebSocket table.
    WsChannel,
    /// A constant declared with the route.
    Literal(Value),
}

impl Token {
    /// A literal token from any JSON-convertible constant.
    pub fn literal(v: impl Into<Value>) -> Token {
        Token::Literal(v.into())
    }
}

/// What a handler hands back to the engine.
pub enum Reply {
    /// Serialize the value into the response body as JSON.
    Json(Value),
    /// The handler already shaped the response; leave the body alone.
    Manual,
}

/// Uniform handler outcome.
pub type HandlerResult = Result<Reply, ServiceError>;

/// Conversion from a handler's return type into the reply protocol.
pub trait IntoReply {
    fn into_reply(self) -> HandlerResult;
}

impl IntoReply for Reply {
    fn into_reply(self) -> HandlerResult {
        Ok(self)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> HandlerResult {
        Ok(Reply::Json(self))
    }
}

impl IntoReply for Map<String, Value> {
    fn into_reply(self) -> HandlerResult {
        Ok(Reply::Json(Value::Object(self)))
    }
}

impl<T: IntoReply> IntoReply for Result<T, ServiceError> {
    fn into_reply(self) -> HandlerResult {
        self.and_then(IntoReply::into_reply)
    }
}

/// Merged request parameters: body keys first, query-string keys second.
#[derive(Debug, Clone, Default)]
pub struct JsonParams(pub Map<String, Value>);

impl Deref for JsonParams {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for JsonParams {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// A handler parameter type resolvable from a placeholder token.
pub trait Bind: Sized {
    /// Construction-time compatibility check against the declared token.
    fn accepts(token: &Token, captures: usize) -> Result<(), String>;

    /// Per-request resolution.
    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError>;
}

fn mismatch<T>(token: &Token) -> Result<(), String> {
    Err(format!(
        "{token:?} cannot bind a {} parameter",
        std::any::type_name::<T>()
    ))
}

fn unchecked() -> ServiceError {
    ServiceError::Internal(anyhow!("token/parameter mismatch escaped construction checks"))
}

impl Bind for String {
    fn accepts(token: &Token, captures: usize) -> Result<(), String> {
        match token {
            Token::Url(0) => Err("url captures are 1-based".to_string()),
            Token::Url(n) if *n <= captures => Ok(()),
            Token::Url(n) => Err(format!(
                "url capture {n} is out of range (pattern has {captures})"
            )),
            Token::Literal(Value::String(_)) => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::Url(n) => scope
                .captures
                .get(*n)
                .cloned()
                .ok_or_else(|| ServiceError::Internal(anyhow!("url capture {n} missing"))),
            Token::Literal(Value::String(s)) => Ok(s.clone()),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for i64 {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::Literal(Value::Number(n)) if n.is_i64() => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, _scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::Literal(Value::Number(n)) => n.as_i64().ok_or_else(unchecked),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for Value {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::Literal(_) => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, _scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::Literal(v) => Ok(v.clone()),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for JsonParams {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::JsonParams => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::JsonParams => scope.json_params().map(JsonParams),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for Session {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::Session => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::Session => Ok(scope.resolve_session()),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for Arc<HttpRequest> {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::Request => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::Request => Ok(scope.request.clone()),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for ResponseHandle {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::Response => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::Response => Ok(scope.response.clone()),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for DbConn {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::DbHandle => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::DbHandle => scope.resolve_db(),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for HttpClient {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::HttpClient => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::HttpClient => Ok(scope.resolve_client()),
            _ => Err(unchecked()),
        }
    }
}

impl Bind for Arc<WsChannel> {
    fn accepts(token: &Token, _captures: usize) -> Result<(), String> {
        match token {
            Token::WsChannel => Ok(()),
            other => mismatch::<Self>(other),
        }
    }

    fn bind(token: &Token, scope: &mut RequestScope<'_>) -> Result<Self, ServiceError> {
        match token {
            Token::WsChannel => scope.resolve_ws(),
            _ => Err(unchecked()),
        }
    }
}

/// A route handler of some arity; implemented for plain functions whose
/// parameters all implement [`Bind`].
pub trait RouteHandler<Args>: Send + Sync + 'static {
    fn arity(&self) -> usize;
    fn check(&self, tokens: &[Token], captures: usize) -> Result<(), String>;
    fn invoke(&self, tokens: &[Token], scope: &mut RequestScope<'_>) -> HandlerResult;
}

macro_rules! impl_route_handler {
    ($count:expr $(, $ty:ident)*) => {
        impl<Func, Ret $(, $ty)*> RouteHandler<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Ret + Send + Sync + 'static,
            Ret: IntoReply,
            $($ty: Bind,)*
        {
            fn arity(&self) -> usize {
                $count
            }

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn check(&self, tokens: &[Token], captures: usize) -> Result<(), String> {
                if tokens.len() != $count {
                    return Err(format!(
                        "handler takes {} parameter(s) but {} placeholder(s) were declared",
                        $count,
                        tokens.len()
                    ));
                }
                let mut idx = 0usize;
                $(
                    <$ty as Bind>::accepts(&tokens[idx], captures)
                        .map_err(|e| format!("placeholder {}: {}", idx + 1, e))?;
                    idx += 1;
                )*
                Ok(())
            }

            #[allow(unused_variables, unused_mut, unused_assignments, non_snake_case)]
            fn invoke(&self, tokens: &[Token], scope: &mut RequestScope<'_>) -> HandlerResult {
                let mut idx = 0usize;
                $(
                    let $ty = <$ty as Bind>::bind(&tokens[idx], scope)?;
                    idx += 1;
                )*
                (self)($($ty),*).into_reply()
            }
        }
    };
}

impl_route_handler!(0);
impl_route_handler!(1, A1);
impl_route_handler!(2, A1, A2);
impl_route_handler!(3, A1, A2, A3);
impl_route_handler!(4, A1, A2, A3, A4);
impl_route_handler!(5, A1, A2, A3, A4, A5);
impl_route_handler!(6, A1, A2, A3, A4, A5, A6);
impl_route_handler!(7, A1, A2, A3, A4, A5, A6, A7);
impl_route_handler!(8, A1, A2, A3, A4, A5, A6, A7, A8);
