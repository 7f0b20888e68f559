//! Path pattern matching and argument extraction.
//!
//! A route pattern is a `/`-separated list of segments. A segment starting with
//! [`PLACEHOLDER_SIGIL`] is a placeholder which matches any single path segment and binds
//! it under the sigil-stripped name, every other segment must match literally:
//!
//! ```
//! use trellis::path::PathPattern;
//!
//! let pattern = PathPattern::parse("/users/$id/avatar").unwrap();
//! assert!(pattern.matches("/users/42/avatar?size=small"));
//!
//! let args = pattern.extract_path_args("/users/42/avatar");
//! assert_eq!(args.get("id"), Some("42"));
//! ```

use crate::error::RouteError;
use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt;
use tracing::warn;

/// Marks a placeholder segment in a route pattern.
pub const PLACEHOLDER_SIGIL: char = '$';

/// Flat string mapping handed to handlers: path placeholders first, query parameters
/// merged in after (so a query parameter wins over a placeholder of the same name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    inner: HashMap<String, String>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.inner.get(key.as_ref()).map(String::as_str)
    }

    /// Inserts a value, replacing (and returning) any previous one under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.inner.insert(key.into(), value.into())
    }

    /// Merges `other` into `self`, last write wins.
    pub fn merge(&mut self, other: Args) {
        self.inner.extend(other.inner);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
        self.inner.iter()
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.inner
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Args::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed route pattern, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let mut segments = Vec::new();
        for segment in parse_path(pattern) {
            match segment.strip_prefix(PLACEHOLDER_SIGIL) {
                Some("") => return Err(RouteError::invalid_pattern(pattern, "placeholder without a name")),
                Some(name) => {
                    let duplicated = segments.iter().any(|s| matches!(s, Segment::Placeholder(n) if n == name));
                    if duplicated {
                        return Err(RouteError::invalid_pattern(pattern, format!("duplicated placeholder '{name}'")));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                None => segments.push(Segment::Literal(segment.to_string())),
            }
        }

        Ok(Self { raw: pattern.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true when `path` has as many segments as the pattern and every literal
    /// segment is equal. The query string of `path` is ignored.
    pub fn matches(&self, path: &str) -> bool {
        let actual = parse_path(path);
        actual.len() == self.segments.len()
            && self.segments.iter().zip(actual).all(|(segment, actual)| match segment {
                Segment::Literal(literal) => literal == actual,
                Segment::Placeholder(_) => true,
            })
    }

    /// Binds every placeholder to the path segment at its position.
    ///
    /// Meant to be called after [`PathPattern::matches`]; on a segment count mismatch
    /// the result is empty.
    pub fn extract_path_args(&self, path: &str) -> Args {
        let actual = parse_path(path);
        if actual.len() != self.segments.len() {
            return Args::new();
        }

        self.segments
            .iter()
            .zip(actual)
            .filter_map(|(segment, actual)| match segment {
                Segment::Placeholder(name) => Some((name.as_str(), actual)),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits a request path into its non-empty segments, dropping query and fragment.
pub fn parse_path(uri: &str) -> Vec<&str> {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    uri[..end].split('/').filter(|s| !s.is_empty()).collect()
}

/// Parses the query component of `uri` into an [`Args`], percent-decoding names and
/// values. The last occurrence of a duplicated name wins.
pub fn extract_query_params(uri: &str) -> Args {
    let Some((_, query)) = uri.split_once('?') else {
        return Args::new();
    };
    let query = query.split_once('#').map_or(query, |(q, _)| q);

    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            warn!(cause = %e, query, "can't decode query string");
            Args::new()
        }
    }
}
