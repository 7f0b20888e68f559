//! Converts handler return values into [`RouteResponse`]s.
//!
//! The [`Responder`] trait lets handler functions return plain values (`String`,
//! `&'static str`, `()`, a pre-built [`Response`], `Result`, ...) which are turned into
//! the response the dispatcher writes. An `Err` is the handler failing: it is logged and
//! answered with `500 Internal Server Error`.

use crate::body::ResponseBody;
use crate::error::BoxError;
use crate::response::RouteResponse;
use http::{HeaderValue, Response, StatusCode, header};

/// A trait for types that can be converted into a handler result.
pub trait Responder {
    fn respond(self) -> Result<RouteResponse, BoxError>;
}

impl Responder for RouteResponse {
    fn respond(self) -> Result<RouteResponse, BoxError> {
        Ok(self)
    }
}

/// Passes pre-built responses through, converting the body.
impl<B> Responder for Response<B>
where
    B: Into<ResponseBody>,
{
    fn respond(self) -> Result<RouteResponse, BoxError> {
        Ok(RouteResponse::new(self.map(Into::into)))
    }
}

impl<T: Responder, E: Into<BoxError>> Responder for Result<T, E> {
    fn respond(self) -> Result<RouteResponse, BoxError> {
        match self {
            Ok(t) => t.respond(),
            Err(e) => Err(e.into()),
        }
    }
}

/// `None` means "no response", the writer substitutes the default one.
impl<T: Responder> Responder for Option<T> {
    fn respond(self) -> Result<RouteResponse, BoxError> {
        match self {
            Some(t) => t.respond(),
            None => Ok(RouteResponse::empty()),
        }
    }
}

impl Responder for () {
    fn respond(self) -> Result<RouteResponse, BoxError> {
        Ok(RouteResponse::empty())
    }
}

impl<T: Responder> Responder for (StatusCode, T) {
    fn respond(self) -> Result<RouteResponse, BoxError> {
        let (status, responder) = self;
        let mut route_response = responder.respond()?;
        match route_response.response_mut() {
            Some(response) => *response.status_mut() = status,
            None => {
                let mut response = Response::new(ResponseBody::empty());
                *response.status_mut() = status;
                let (_, disposers) = route_response.into_parts();
                route_response = disposers.into_iter().fold(RouteResponse::new(response), RouteResponse::on_dispose);
            }
        }
        Ok(route_response)
    }
}

impl Responder for String {
    fn respond(self) -> Result<RouteResponse, BoxError> {
        Ok(RouteResponse::new(plain_text(ResponseBody::from(self))))
    }
}

impl Responder for &'static str {
    fn respond(self) -> Result<RouteResponse, BoxError> {
        Ok(RouteResponse::new(plain_text(ResponseBody::from(self))))
    }
}

fn plain_text(body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
