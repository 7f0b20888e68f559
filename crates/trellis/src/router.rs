//! Ordered route table.
//!
//! Routes are tried in registration order and the first one whose method and pattern
//! both match wins, so more specific patterns must be registered before more general
//! ones:
//!
//! ```
//! use trellis::path::Args;
//! use trellis::router::{get, post, RouteMatch, Router};
//! use trellis::handler_fn;
//! use http::Method;
//!
//! async fn me(_args: Args) -> &'static str { "me" }
//! async fn user(_args: Args) -> &'static str { "user" }
//!
//! let router = Router::builder()
//!     .route("/users/me", get(handler_fn(me)))
//!     .route("/users/$id", get(handler_fn(user)))
//!     .route("/users/$id", post(handler_fn(user)).keep_alive_only())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(router.find_route(&Method::GET, "/users/me").unwrap().pattern().as_str(), "/users/me");
//! assert!(matches!(router.at(&Method::DELETE, "/users/42"), RouteMatch::MethodNotAllowed));
//! ```

use crate::error::RouteError;
use crate::handler::RequestHandler;
use crate::path::{Args, PathPattern, extract_query_params};
use http::Method;
use std::fmt;

/// How the response writer decides to close the connection after a route answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// Close when keep-alive was not negotiated or the status is not 2xx.
    #[default]
    ErrorCloses,
    /// Close strictly according to the keep-alive negotiation.
    KeepAliveOnly,
}

/// A method + pattern binding to a handler, immutable once built.
pub struct Route {
    method: Method,
    pattern: PathPattern,
    close_policy: ClosePolicy,
    handler: Box<dyn RequestHandler>,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn close_policy(&self) -> ClosePolicy {
        self.close_policy
    }

    pub fn handler(&self) -> &dyn RequestHandler {
        self.handler.as_ref()
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == method && self.pattern.matches(path)
    }

    /// Path placeholders first, then the query parameters of `uri` merged over them.
    pub fn extract_args(&self, uri: &str) -> Args {
        let mut args = self.pattern.extract_path_args(uri);
        args.merge(extract_query_params(uri));
        args
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("close_policy", &self.close_policy)
            .finish_non_exhaustive()
    }
}

/// Result of looking up a request in the [`Router`].
#[derive(Debug)]
pub enum RouteMatch<'router> {
    Found(&'router Route),
    /// Some route's pattern matches the path, but none for this method.
    MethodNotAllowed,
    NotFound,
}

/// The route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Linear scan in registration order, returns the first route matching both.
    pub fn find_route(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(method, path))
    }

    pub fn at(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        if let Some(route) = self.find_route(method, path) {
            return RouteMatch::Found(route);
        }

        if self.routes.iter().any(|route| route.pattern.matches(path)) {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::NotFound
        }
    }

    /// Appends a route, it is tried after every route registered before it.
    pub fn add_route(
        &mut self,
        method: &str,
        pattern: &str,
        handler: impl RequestHandler + 'static,
    ) -> Result<&mut Self, RouteError> {
        let method = parse_method(method)?;
        let item = RouteItemBuilder { method, close_policy: ClosePolicy::ErrorCloses, handler: Box::new(handler) };
        self.routes.push(item.build(pattern)?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// Accepts the methods a route can be bound to: GET, POST, PUT and DELETE.
pub fn parse_method(method: &str) -> Result<Method, RouteError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        _ => Err(RouteError::unknown_method(method)),
    }
}

#[derive(Debug, Default)]
pub struct RouterBuilder {
    items: Vec<(String, RouteItemBuilder)>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn route(mut self, pattern: impl Into<String>, item_builder: RouteItemBuilder) -> Self {
        self.items.push((pattern.into(), item_builder));
        self
    }

    /// Builds the router, keeping the registration order.
    pub fn build(self) -> Result<Router, RouteError> {
        let routes = self.items.into_iter().map(|(pattern, item)| item.build(&pattern)).collect::<Result<Vec<_>, _>>()?;
        Ok(Router { routes })
    }
}

macro_rules! method_route {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Binds a handler to HTTP ", stringify!($upper_case_method), " requests.")]
        pub fn $method<H: RequestHandler + 'static>(handler: H) -> RouteItemBuilder {
            RouteItemBuilder { method: Method::$upper_case_method, close_policy: ClosePolicy::ErrorCloses, handler: Box::new(handler) }
        }
    };
}

method_route!(get, GET);
method_route!(post, POST);
method_route!(put, PUT);
method_route!(delete, DELETE);

pub struct RouteItemBuilder {
    method: Method,
    close_policy: ClosePolicy,
    handler: Box<dyn RequestHandler>,
}

impl RouteItemBuilder {
    /// Keep the connection open after a non-2xx response when keep-alive was negotiated.
    #[must_use]
    pub fn keep_alive_only(mut self) -> Self {
        self.close_policy = ClosePolicy::KeepAliveOnly;
        self
    }

    fn build(self, pattern: &str) -> Result<Route, RouteError> {
        let pattern = PathPattern::parse(pattern)?;
        Ok(Route { method: self.method, pattern, close_policy: self.close_policy, handler: self.handler })
    }
}

impl fmt::Debug for RouteItemBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteItemBuilder").field("method", &self.method).field("close_policy", &self.close_policy).finish_non_exhaustive()
    }
}
