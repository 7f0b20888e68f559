//! An embeddable HTTP dispatch layer.
//!
//! The embedding server parses requests and owns the connections. `trellis` matches each
//! request against an ordered route table, invokes the bound handler and writes the
//! response back through a [`Transport`], deciding on `Content-Length`, keep-alive and
//! when the resources behind a body can be released. Requests no route claims can fall
//! back to a [`StaticAssetHandler`] serving files, memory mapped, from a chain of
//! [`ContentProvider`](content::ContentProvider)s, including a cache of generated
//! thumbnails.

mod body;
mod dispatcher;
mod error;
mod handler;
mod request;
mod responder;
mod response;
mod static_files;
mod transport;
mod writer;

pub mod config;
pub mod content;
pub mod path;
pub mod router;

pub use body::ResponseBody;
pub use dispatcher::Dispatcher;
pub use error::{BoxError, ConfigError, Forbidden, RouteError, SendError};
pub use handler::{FnHandler, RequestHandler, handler_fn};
pub use request::{RequestContext, is_keep_alive};
pub use responder::Responder;
pub use response::{DEFAULT_BODY, Disposer, RouteResponse, default_response, error_response};
pub use router::{ClosePolicy, Router};
pub use static_files::{StaticAssetHandler, StaticAssetHandlerBuilder, sanitize_uri};
pub use transport::IoTransport;
pub use writer::{ConnectionState, Transport, write_response};
