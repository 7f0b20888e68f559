//! The parsed request as seen by handlers.
//!
//! Parsing is the transport's job: the dispatch layer consumes an [`http::Request`] whose
//! body has already been read into [`Bytes`].

use crate::path::Args;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri, Version, header};

/// Gives handlers access to the request and the arguments extracted for the matched route.
#[derive(Debug)]
pub struct RequestContext<'req> {
    request: &'req Request<Bytes>,
    args: Args,
}

impl<'req> RequestContext<'req> {
    pub fn new(request: &'req Request<Bytes>, args: Args) -> Self {
        Self { request, args }
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Returns the URI of the request
    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn version(&self) -> Version {
        self.request.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// Path placeholders merged with query parameters.
    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name)
    }

    pub fn is_keep_alive(&self) -> bool {
        is_keep_alive(self.request)
    }
}

/// Keep-alive negotiation: HTTP/1.1 stays open unless the client sent `Connection: close`,
/// HTTP/1.0 only stays open when the client asked for `Connection: keep-alive`.
pub fn is_keep_alive<B>(request: &Request<B>) -> bool {
    let connection = request.headers().get_all(header::CONNECTION);
    let has_token = |token: &str| {
        connection
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };

    match request.version() {
        Version::HTTP_11 | Version::HTTP_2 | Version::HTTP_3 => !has_token("close"),
        _ => has_token("keep-alive"),
    }
}
