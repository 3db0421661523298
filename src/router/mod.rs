//! Route table: ordered URL patterns with typed placeholder bindings.
//!
//! Matching is linear over the table in declaration order and the first
//! match wins. Each route erases its handler into a uniform closure over
//! the request scope; the typed surface lives in [`bind`].

pub mod bind;
pub mod pattern;

pub use bind::{Bind, HandlerResult, IntoReply, JsonParams, Reply, RouteHandler, Token};
pub use pattern::{CaptureVec, UrlPattern, MAX_INLINE_CAPTURES};

use crate::error::ServiceError;
use crate::resolve::RequestScope;
use tracing::{debug, warn};

type ErasedHandler =
    Box<dyn Fn(&[Token], &mut RequestScope<'_>) -> HandlerResult + Send + Sync + 'static>;

/// One entry of a route table.
pub struct Route {
    pattern: UrlPattern,
    tokens: Vec<Token>,
    handler: ErasedHandler,
}

impl Route {
    /// Bind a handler to a URL pattern with a placeholder list.
    ///
    /// # Panics
    ///
    /// Panics when the placeholder list does not fit the handler: wrong
    /// length, a token a parameter type cannot bind, or a `Url(n)`
    /// capture the pattern does not have. Routes are declared at server
    /// construction, so these are startup errors.
    pub fn new<F, Args>(pattern: &str, handler: F, tokens: Vec<Token>) -> Route
    where
        F: RouteHandler<Args>,
    {
        let pattern = UrlPattern::compile(pattern);
        if let Err(msg) = handler.check(&tokens, pattern.capture_count()) {
            panic!("route `{}`: {}", pattern.as_str(), msg);
        }
        Route {
            pattern,
            tokens,
            handler: Box::new(move |tokens, scope| handler.invoke(tokens, scope)),
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered route table.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Self {
        Router { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Match the scope's bare URL and invoke the first matching route.
    pub fn dispatch(&self, scope: &mut RequestScope<'_>) -> HandlerResult {
        let url = scope.request.path().to_string();
        for route in &self.routes {
            if let Some(captures) = route.pattern.captures(&url) {
                debug!(
                    url = %url,
                    pattern = %route.pattern.as_str(),
                    "route matched"
                );
                scope.captures = captures;
                return (route.handler)(&route.tokens, scope);
            }
        }
        warn!(url = %url, "no route matched");
        Err(ServiceError::NotFound)
    }
}
