use crate::error::BoxError;
use crate::path::Args;
use crate::request::RequestContext;
use crate::responder::Responder;
use crate::response::RouteResponse;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// The unit of application logic invoked once per matched request.
///
/// Returning `Ok(RouteResponse::empty())` makes the writer answer with the default
/// `{"status": true}` body, returning `Err` makes it answer `500`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: &RequestContext<'_>) -> Result<RouteResponse, BoxError>;
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Box<H> {
    async fn invoke(&self, req: &RequestContext<'_>) -> Result<RouteResponse, BoxError> {
        (**self).invoke(req).await
    }
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    async fn invoke(&self, req: &RequestContext<'_>) -> Result<RouteResponse, BoxError> {
        (**self).invoke(req).await
    }
}

/// Holds an async `Fn(Args)`, the common shape of a route handler.
pub struct FnHandler<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> std::fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Args) -> Fut,
    Fut: Future,
{
    FnHandler { f, _phantom: PhantomData }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F, Fut>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: Responder,
{
    async fn invoke(&self, req: &RequestContext<'_>) -> Result<RouteResponse, BoxError> {
        (self.f)(req.args().clone()).await.respond()
    }
}
