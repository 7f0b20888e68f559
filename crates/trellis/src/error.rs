use std::io;
use thiserror::Error;

/// The unstructured failure a [`RequestHandler`](crate::RequestHandler) may report.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("unknown http method: {method}")]
    UnknownMethod { method: String },

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl RouteError {
    pub fn unknown_method<S: ToString>(method: S) -> Self {
        Self::UnknownMethod { method: method.to_string() }
    }

    pub fn invalid_pattern<P: ToString, S: ToString>(pattern: P, reason: S) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid server definition: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("route {method} {path} refers to unknown handler '{handler}'")]
    UnknownHandler { method: String, path: String, handler: String },

    #[error("route error: {source}")]
    Route {
        #[from]
        source: RouteError,
    },

    #[error("can't prepare static file root: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Raised when a request uri fails sanitization, answered with `403 Forbidden`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("forbidden uri: {uri}")]
pub struct Forbidden {
    pub uri: String,
}
