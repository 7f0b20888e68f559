//! Response writer: frames the handler's result for the transport and manages the
//! lifecycle that follows the write.
//!
//! The writer owns three decisions:
//! - `Content-Length` always reflects the exact body length, a caller supplied value is
//!   overwritten;
//! - the `Connection` header and whether the transport is closed afterwards;
//! - when the response's [`Disposer`](crate::Disposer)s run: only once the transport
//!   reported the write complete (or failed), never before.

use crate::body::ResponseBody;
use crate::error::SendError;
use crate::response::{RouteResponse, default_response};
use crate::router::ClosePolicy;
use async_trait::async_trait;
use http::{HeaderValue, Response, header};
use tracing::{debug, error};

/// The connection side of the dispatch layer.
///
/// `write` returns once the full response was handed to the underlying connection, this
/// is the point where resources backing the body can be released.
#[async_trait]
pub trait Transport: Send {
    async fn write(&mut self, response: Response<ResponseBody>) -> Result<(), SendError>;

    async fn close(&mut self) -> Result<(), SendError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &mut T {
    async fn write(&mut self, response: Response<ResponseBody>) -> Result<(), SendError> {
        (**self).write(response).await
    }

    async fn close(&mut self) -> Result<(), SendError> {
        (**self).close().await
    }
}

/// What the transport should do with the connection after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    KeepAlive,
    Closed,
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

const KEEP_ALIVE: HeaderValue = HeaderValue::from_static("keep-alive");
const CLOSE: HeaderValue = HeaderValue::from_static("close");

/// Writes `route_response` to `transport`.
///
/// A missing response is replaced with the default `{"status": true}` one. The
/// connection is closed when `keep_alive` is false, or, under
/// [`ClosePolicy::ErrorCloses`], when the status is not 2xx. On a write failure the
/// disposers still run and the transport is closed before the error is returned.
pub async fn write_response<T>(
    transport: &mut T,
    route_response: RouteResponse,
    keep_alive: bool,
    close_policy: ClosePolicy,
) -> Result<ConnectionState, SendError>
where
    T: Transport + ?Sized,
{
    let (response, disposers) = route_response.into_parts();
    let mut response = response.unwrap_or_else(default_response);

    let close = !keep_alive || (close_policy == ClosePolicy::ErrorCloses && !response.status().is_success());

    let len = response.body().exact_len();
    let headers = response.headers_mut();
    match len {
        Some(len) => {
            headers.insert(header::CONTENT_LENGTH, len.into());
        }
        None => {
            headers.remove(header::CONTENT_LENGTH);
        }
    }
    headers.insert(header::CONNECTION, if close { CLOSE } else { KEEP_ALIVE });

    let status = response.status();
    let write_result = transport.write(response).await;

    // the transport has the bytes (or gave up on them), backing resources can go now
    for disposer in disposers {
        disposer.dispose();
    }

    if let Err(e) = write_result {
        error!(cause = %e, %status, "can't write response, closing connection");
        close_quietly(transport).await;
        return Err(e);
    }

    debug!(%status, close, "response written");
    if close {
        close_quietly(transport).await;
        Ok(ConnectionState::Closed)
    } else {
        Ok(ConnectionState::KeepAlive)
    }
}

async fn close_quietly<T: Transport + ?Sized>(transport: &mut T) {
    if let Err(e) = transport.close().await {
        error!(cause = %e, "can't close connection");
    }
}
