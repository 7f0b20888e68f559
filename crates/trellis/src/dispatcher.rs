use crate::error::SendError;
use crate::request::{RequestContext, is_keep_alive};
use crate::response::{RouteResponse, error_response};
use crate::router::{ClosePolicy, RouteMatch, Router};
use crate::static_files::StaticAssetHandler;
use crate::writer::{ConnectionState, Transport, write_response};
use bytes::Bytes;
use futures::FutureExt;
use http::{Request, StatusCode};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

/// Entry point of the dispatch layer: matches a parsed request against the [`Router`],
/// runs the handler and writes its response to the transport.
///
/// Requests no route claims go to the static file handler when one is configured, and are
/// answered `404` otherwise. A path known under another method is answered `405`.
#[derive(Debug)]
pub struct Dispatcher {
    router: Router,
    fallback: Option<StaticAssetHandler>,
}

impl Dispatcher {
    pub fn new(router: Router) -> Self {
        Self { router, fallback: None }
    }

    #[must_use]
    pub fn with_static_files(mut self, handler: StaticAssetHandler) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn static_files(&self) -> Option<&StaticAssetHandler> {
        self.fallback.as_ref()
    }

    /// Handles one request and writes one response.
    ///
    /// Handler failures never reach the caller, an `Err` or a panic is answered `500` and
    /// closes the connection. The returned error only reports a transport failure.
    pub async fn dispatch<T>(&self, request: Request<Bytes>, transport: &mut T) -> Result<ConnectionState, SendError>
    where
        T: Transport + ?Sized,
    {
        let keep_alive = is_keep_alive(&request);
        let method = request.method();
        let uri = request.uri().path_and_query().map_or("/", |pq| pq.as_str());

        match self.router.at(method, request.uri().path()) {
            RouteMatch::Found(route) => {
                debug!(%method, uri, pattern = %route.pattern(), "dispatching request");
                let ctx = RequestContext::new(&request, route.extract_args(uri));

                match AssertUnwindSafe(route.handler().invoke(&ctx)).catch_unwind().await {
                    Ok(Ok(route_response)) => {
                        write_response(transport, route_response, keep_alive, route.close_policy()).await
                    }
                    Ok(Err(e)) => {
                        error!(cause = %e, %method, uri, "handler failed");
                        write_error(transport, StatusCode::INTERNAL_SERVER_ERROR).await
                    }
                    Err(panic) => {
                        error!(cause = panic_message(panic.as_ref()), %method, uri, "handler panicked");
                        write_error(transport, StatusCode::INTERNAL_SERVER_ERROR).await
                    }
                }
            }
            RouteMatch::MethodNotAllowed => {
                debug!(%method, uri, "method not allowed");
                write_error(transport, StatusCode::METHOD_NOT_ALLOWED).await
            }
            RouteMatch::NotFound => match &self.fallback {
                Some(static_files) => {
                    let route_response = static_files.serve(method, uri).await;
                    write_response(transport, route_response, keep_alive, ClosePolicy::ErrorCloses).await
                }
                None => {
                    debug!(%method, uri, "no route found");
                    write_error(transport, StatusCode::NOT_FOUND).await
                }
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

async fn write_error<T: Transport + ?Sized>(transport: &mut T, status: StatusCode) -> Result<ConnectionState, SendError> {
    write_response(transport, RouteResponse::new(error_response(status)), false, ClosePolicy::ErrorCloses).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FilesystemProvider;
    use crate::handler_fn;
    use crate::path::Args;
    use crate::router::{get, post};
    use crate::writer::tests::{Event, RecordingTransport};
    use http::header;
    use std::fs;

    async fn hello(args: Args) -> String {
        format!("hello {}", args.get("name").unwrap_or("nobody"))
    }

    async fn fail(_args: Args) -> Result<String, std::io::Error> {
        Err(std::io::Error::other("boom"))
    }

    async fn nothing(_args: Args) {}

    async fn explode(args: Args) -> String {
        panic!("handler exploded on {:?}", args.get("id"));
    }

    fn dispatcher() -> Dispatcher {
        let router = Router::builder()
            .route("/hello/$name", get(handler_fn(hello)))
            .route("/fail", get(handler_fn(fail)))
            .route("/nothing", post(handler_fn(nothing)))
            .route("/explode/$id", get(handler_fn(explode)))
            .build()
            .unwrap();
        Dispatcher::new(router)
    }

    fn request(method: &str, uri: &str) -> Request<Bytes> {
        Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_with_path_and_query_args() {
        let mut transport = RecordingTransport::default();
        let state = dispatcher().dispatch(request("GET", "/hello/world"), &mut transport).await.unwrap();
        assert_eq!(state, ConnectionState::KeepAlive);
        assert_eq!(transport.written()[0].2.as_ref(), b"hello world");

        // query args override path args
        let mut transport = RecordingTransport::default();
        dispatcher().dispatch(request("GET", "/hello/world?name=query"), &mut transport).await.unwrap();
        assert_eq!(transport.written()[0].2.as_ref(), b"hello query");
    }

    #[tokio::test]
    async fn test_empty_handler_result_gets_default_body() {
        let mut transport = RecordingTransport::default();
        dispatcher().dispatch(request("POST", "/nothing"), &mut transport).await.unwrap();

        let (status, headers, body) = transport.written().remove(0);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(body.as_ref(), br#"{"status": true}"#);
    }

    #[tokio::test]
    async fn test_handler_failure_is_500_and_closes() {
        let mut transport = RecordingTransport::default();
        let state = dispatcher().dispatch(request("GET", "/fail"), &mut transport).await.unwrap();

        assert_eq!(state, ConnectionState::Closed);
        let (status, _, body) = transport.written().remove(0);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.as_ref(), b"Failure: 500 Internal Server Error\r\n");
        assert_eq!(transport.events().last(), Some(&Event::Close));
    }

    #[tokio::test]
    async fn test_handler_panic_is_500_and_closes() {
        let mut transport = RecordingTransport::default();
        let state = dispatcher().dispatch(request("GET", "/explode/7"), &mut transport).await.unwrap();

        assert_eq!(state, ConnectionState::Closed);
        let written = transport.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(written[0].2.as_ref(), b"Failure: 500 Internal Server Error\r\n");
        assert_eq!(transport.events().last(), Some(&Event::Close));

        // the dispatcher is still usable afterwards
        let mut transport = RecordingTransport::default();
        dispatcher().dispatch(request("GET", "/hello/again"), &mut transport).await.unwrap();
        assert_eq!(transport.written()[0].2.as_ref(), b"hello again");
    }

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let mut transport = RecordingTransport::default();
        let state = dispatcher().dispatch(request("GET", "/missing"), &mut transport).await.unwrap();
        assert_eq!(state, ConnectionState::Closed);
        assert_eq!(transport.written()[0].0, StatusCode::NOT_FOUND);

        let mut transport = RecordingTransport::default();
        dispatcher().dispatch(request("DELETE", "/hello/world"), &mut transport).await.unwrap();
        assert_eq!(transport.written()[0].0, StatusCode::METHOD_NOT_ALLOWED);
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("index.html"), b"<html></html>").unwrap();
        let dispatcher = dispatcher().with_static_files(StaticAssetHandler::new(FilesystemProvider::new(root.path())));

        let mut transport = RecordingTransport::default();
        let state = dispatcher.dispatch(request("GET", "/index.html"), &mut transport).await.unwrap();
        assert_eq!(state, ConnectionState::KeepAlive);

        let (status, headers, body) = transport.written().remove(0);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/html");
        assert_eq!(headers[header::CONTENT_LENGTH], "13");
        assert_eq!(body.as_ref(), b"<html></html>");

        // routes still win over files
        let mut transport = RecordingTransport::default();
        dispatcher.dispatch(request("GET", "/hello/index.html"), &mut transport).await.unwrap();
        assert_eq!(transport.written()[0].2.as_ref(), b"hello index.html");
    }
}
