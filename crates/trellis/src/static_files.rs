//! Serves files from a [`ContentProvider`] for GET requests.
//!
//! The request uri is decoded and checked before it reaches the provider, anything that
//! could walk out of the served tree or touch a hidden entry is answered with `403`. The
//! response body shares the provider's memory mapped bytes, the resolved content is handed
//! back to the provider by a [`Disposer`] once the response has been written.

use crate::body::ResponseBody;
use crate::content::ContentProvider;
use crate::error::{BoxError, Forbidden};
use crate::handler::RequestHandler;
use crate::request::RequestContext;
use crate::response::{Disposer, RouteResponse, error_response};
use async_trait::async_trait;
use http::{HeaderValue, Method, Response, StatusCode, header};
use percent_encoding::percent_decode_str;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub struct StaticAssetHandler {
    provider: Arc<dyn ContentProvider>,
    cache_max_age: Option<Duration>,
    strip_prefix: Option<String>,
}

impl StaticAssetHandler {
    pub fn new(provider: impl ContentProvider + 'static) -> Self {
        Self::builder(provider).build()
    }

    pub fn builder(provider: impl ContentProvider + 'static) -> StaticAssetHandlerBuilder {
        StaticAssetHandlerBuilder { provider: Arc::new(provider), cache_max_age: None, strip_prefix: None }
    }

    pub fn provider(&self) -> &Arc<dyn ContentProvider> {
        &self.provider
    }

    /// Answers a request for `uri`, the path and query of the request target.
    pub async fn serve(&self, method: &Method, uri: &str) -> RouteResponse {
        if method != Method::GET {
            return RouteResponse::new(error_response(StatusCode::METHOD_NOT_ALLOWED));
        }

        let path = match sanitize_uri(uri, self.strip_prefix.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                debug!(cause = %e, "rejecting static file request");
                return RouteResponse::new(error_response(StatusCode::FORBIDDEN));
            }
        };

        // providers do blocking io and may decode images
        let provider = Arc::clone(&self.provider);
        let lookup = path.clone();
        let resolved = match tokio::task::spawn_blocking(move || provider.resolve(&lookup)).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(cause = %e, path, "content resolution task failed");
                return RouteResponse::new(error_response(StatusCode::INTERNAL_SERVER_ERROR));
            }
        };

        let Some(info) = resolved else {
            debug!(path, "no content found");
            return RouteResponse::new(error_response(StatusCode::NOT_FOUND));
        };

        let content_type = content_type(&path, info.content_type());
        let mut response = Response::new(ResponseBody::once(info.content().clone()));
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::try_from(content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")),
        );
        if let Some(max_age) = self.cache_max_age {
            if let Ok(value) = HeaderValue::try_from(format!("max-age={}", max_age.as_secs())) {
                headers.insert(header::CACHE_CONTROL, value);
            }
        }

        let provider = Arc::clone(&self.provider);
        RouteResponse::new(response).on_dispose(Disposer::new(move || provider.release(info)))
    }
}

#[async_trait]
impl RequestHandler for StaticAssetHandler {
    async fn invoke(&self, req: &RequestContext<'_>) -> Result<RouteResponse, BoxError> {
        let uri = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
        Ok(self.serve(req.method(), uri).await)
    }
}

impl fmt::Debug for StaticAssetHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAssetHandler")
            .field("cache_max_age", &self.cache_max_age)
            .field("strip_prefix", &self.strip_prefix)
            .finish_non_exhaustive()
    }
}

pub struct StaticAssetHandlerBuilder {
    provider: Arc<dyn ContentProvider>,
    cache_max_age: Option<Duration>,
    strip_prefix: Option<String>,
}

impl StaticAssetHandlerBuilder {
    /// Emits `Cache-Control: max-age=<secs>` on every served file.
    #[must_use]
    pub fn cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = Some(max_age);
        self
    }

    /// Removes `prefix` from the request uri before it is resolved.
    #[must_use]
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> StaticAssetHandler {
        StaticAssetHandler { provider: self.provider, cache_max_age: self.cache_max_age, strip_prefix: self.strip_prefix }
    }
}

impl fmt::Debug for StaticAssetHandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAssetHandlerBuilder")
            .field("cache_max_age", &self.cache_max_age)
            .field("strip_prefix", &self.strip_prefix)
            .finish_non_exhaustive()
    }
}

/// Turns a request uri into the path handed to the content provider.
///
/// The query is dropped, `prefix` stripped when it ends on a segment boundary, `+` read as a space and percent escapes
/// decoded (as UTF-8, or byte per char when that fails). Backslashes become `/`. The
/// result is rejected when it contains a segment starting or ending with a dot next to a
/// separator, or when it starts or ends with a dot.
pub fn sanitize_uri(uri: &str, prefix: Option<&str>) -> Result<String, Forbidden> {
    let path = uri.split_once('?').map_or(uri, |(path, _query)| path);
    let path = match prefix {
        Some(prefix) => match path.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/') => rest,
            _ => path,
        },
        None => path,
    };

    let path = path.replace('+', " ");
    let decoded = percent_decode_str(&path);
    let path = match decoded.clone().decode_utf8() {
        Ok(path) => path.into_owned(),
        Err(_) => decoded.map(char::from).collect(),
    };
    let path = path.replace('\\', "/");

    let forbidden = path.contains("/.")
        || path.contains("./")
        || path.starts_with('.')
        || path.ends_with('.')
        || path.contains('\0');
    if forbidden {
        return Err(Forbidden { uri: uri.to_string() });
    }

    if path.starts_with('/') { Ok(path) } else { Ok(format!("/{path}")) }
}

/// `.js` and `.css` are fixed, otherwise what the provider reported, otherwise inferred
/// from the request path.
fn content_type(path: &str, provided: Option<&str>) -> String {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("js") => return mime::TEXT_JAVASCRIPT.to_string(),
        Some("css") => return mime::TEXT_CSS.to_string(),
        _ => {}
    }

    match provided {
        Some(content_type) => content_type.to_string(),
        None => crate::content::content_type_for(path).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentInfo, FilesystemProvider};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sanitize_accepts_plain_paths() {
        assert_eq!(sanitize_uri("/index.html", None).unwrap(), "/index.html");
        assert_eq!(sanitize_uri("/a/b%20c.txt?x=1", None).unwrap(), "/a/b c.txt");
        assert_eq!(sanitize_uri("/a+b.txt", None).unwrap(), "/a b.txt");
        assert_eq!(sanitize_uri("/dir\\file.txt", None).unwrap(), "/dir/file.txt");
        assert_eq!(sanitize_uri("/caf%C3%A9.txt", None).unwrap(), "/café.txt");
        assert_eq!(sanitize_uri("/caf%E9.txt", None).unwrap(), "/café.txt");
        assert_eq!(sanitize_uri("/static/app.js", Some("/static")).unwrap(), "/app.js");
        assert_eq!(sanitize_uri("/v1.2/app.js", None).unwrap(), "/v1.2/app.js");
    }

    #[test]
    fn test_sanitize_prefix_on_segment_boundary() {
        assert_eq!(sanitize_uri("/static/app.js", Some("/static")).unwrap(), "/app.js");
        assert_eq!(sanitize_uri("/static", Some("/static")).unwrap(), "/");
        assert_eq!(sanitize_uri("/staticfoo/x", Some("/static")).unwrap(), "/staticfoo/x");
        assert_eq!(sanitize_uri("/static-old/app.js?v=1", Some("/static")).unwrap(), "/static-old/app.js");
        assert_eq!(sanitize_uri("/other/app.js", Some("/static")).unwrap(), "/other/app.js");
        assert_eq!(sanitize_uri("/static/app.js", Some("/static/")).unwrap(), "/app.js");
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        for uri in [
            "/../etc/passwd",
            "/a/../../b",
            "/%2e%2e/secret",
            "/a/%2E%2E%2Fb",
            "/..\\secret",
            "/.hidden",
            "/.thumb/.meta/a.png",
            "/file.",
            "/a/./b",
            ".hidden",
            "trailing.",
            "/dir/trailing.",
        ] {
            assert_eq!(sanitize_uri(uri, None), Err(Forbidden { uri: uri.to_string() }), "{uri}");
        }
    }

    #[test]
    fn test_content_type_order() {
        assert_eq!(content_type("/app.js", Some("application/octet-stream")), "text/javascript");
        assert_eq!(content_type("/site.css", None), "text/css");
        assert_eq!(content_type("/photo.png", Some("image/jpeg")), "image/jpeg");
        assert_eq!(content_type("/page.html", None), "text/html");
        assert_eq!(content_type("/blob", None), "application/octet-stream");
    }

    #[derive(Default)]
    struct CountingProvider {
        inner: Option<FilesystemProvider>,
        resolved: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    impl ContentProvider for CountingProvider {
        fn resolve(&self, path: &str) -> Option<ContentInfo> {
            self.resolved.fetch_add(1, Ordering::SeqCst);
            self.inner.as_ref()?.resolve(path)
        }

        fn release(&self, info: ContentInfo) {
            self.released.fetch_add(1, Ordering::SeqCst);
            info.close();
        }
    }

    #[tokio::test]
    async fn test_serve_file() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("app.js"), b"console.log(1)").unwrap();

        let released = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            inner: Some(FilesystemProvider::new(root.path())),
            released: Arc::clone(&released),
            ..Default::default()
        };
        let handler = StaticAssetHandler::builder(provider).cache_max_age(Duration::from_secs(60)).build();

        let route_response = handler.serve(&Method::GET, "/app.js?v=3").await;
        let response = route_response.response().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/javascript");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(response.body().as_bytes().unwrap().as_ref(), b"console.log(1)");

        assert_eq!(released.load(Ordering::SeqCst), 0);
        let (_response, disposers) = route_response.into_parts();
        disposers.into_iter().for_each(Disposer::dispose);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_cache_control_without_max_age() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("site.css"), b"p {}").unwrap();
        let handler = StaticAssetHandler::new(FilesystemProvider::new(root.path()));

        let route_response = handler.serve(&Method::GET, "/site.css").await;
        let response = route_response.response().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
    }

    #[tokio::test]
    async fn test_serve_errors() {
        let handler = StaticAssetHandler::new(CountingProvider::default());

        let response = handler.serve(&Method::POST, "/a.txt").await;
        assert_eq!(response.status(), Some(StatusCode::METHOD_NOT_ALLOWED));

        let response = handler.serve(&Method::GET, "/../a.txt").await;
        assert_eq!(response.status(), Some(StatusCode::FORBIDDEN));

        let response = handler.serve(&Method::GET, "/a.txt").await;
        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_rejected_uri_never_reaches_provider() {
        let provider = Arc::new(CountingProvider::default());
        let handler = StaticAssetHandler { provider: Arc::clone(&provider) as Arc<dyn ContentProvider>, cache_max_age: None, strip_prefix: None };

        handler.serve(&Method::GET, "/%2e%2e/etc/passwd").await;
        assert_eq!(provider.resolved.load(Ordering::SeqCst), 0);
    }
}
