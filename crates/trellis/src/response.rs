//! Responses produced by handlers, together with the resources backing them.

use crate::body::ResponseBody;
use http::{HeaderValue, Response, StatusCode, header};
use std::fmt;

/// Body sent when a handler completes without producing a response.
pub const DEFAULT_BODY: &str = r#"{"status": true}"#;

/// Releases the resources backing a response body.
///
/// The callback runs exactly once: either through [`Disposer::dispose`] once the response
/// writer knows the bytes reached the transport, or on drop when the response never got
/// that far.
pub struct Disposer {
    callback: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Disposer {
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Self { callback: Some(Box::new(f)) }
    }

    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer").field("pending", &self.callback.is_some()).finish()
    }
}

/// What a handler hands back to the dispatcher: an optional response and the disposers
/// that must run after it has been written.
#[derive(Debug, Default)]
pub struct RouteResponse {
    response: Option<Response<ResponseBody>>,
    disposers: Vec<Disposer>,
}

impl RouteResponse {
    /// No response, the writer substitutes [`default_response`].
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(response: Response<ResponseBody>) -> Self {
        Self { response: Some(response), disposers: Vec::new() }
    }

    #[must_use]
    pub fn on_dispose(mut self, disposer: Disposer) -> Self {
        self.disposers.push(disposer);
        self
    }

    pub fn response(&self) -> Option<&Response<ResponseBody>> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response<ResponseBody>> {
        self.response.as_mut()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(Response::status)
    }

    pub fn into_parts(self) -> (Option<Response<ResponseBody>>, Vec<Disposer>) {
        (self.response, self.disposers)
    }
}

impl From<Response<ResponseBody>> for RouteResponse {
    fn from(response: Response<ResponseBody>) -> Self {
        Self::new(response)
    }
}

/// `200 OK` with the fixed [`DEFAULT_BODY`].
pub fn default_response() -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::from(DEFAULT_BODY));
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// A plain text `Failure: <status>` response.
pub fn error_response(status: StatusCode) -> Response<ResponseBody> {
    let body = format!("Failure: {status}\r\n");
    let mut response = Response::new(ResponseBody::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_disposer() -> (Disposer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let disposer = Disposer::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (disposer, count)
    }

    #[test]
    fn test_dispose_runs_once() {
        let (disposer, count) = counting_disposer();
        disposer.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_pending_disposer() {
        let (disposer, count) = counting_disposer();
        let route_response = RouteResponse::empty().on_dispose(disposer);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(route_response);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_response() {
        let response = error_response(StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_bytes().unwrap().as_ref(), b"Failure: 404 Not Found\r\n");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn test_default_response() {
        let response = default_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().exact_len(), Some(DEFAULT_BODY.len() as u64));
    }
}
