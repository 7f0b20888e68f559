//! Declarative server definitions.
//!
//! A definition names its routes' handlers instead of carrying code, the names are looked
//! up in a [`HandlerRegistry`] the embedding application fills beforehand:
//!
//! ```json
//! {
//!   "host": "example.org",
//!   "staticFileRoot": "/srv/www",
//!   "maxAge": 3600,
//!   "routes": [
//!     { "method": "GET", "path": "/users/$id", "routeHandler": "user" }
//!   ]
//! }
//! ```

use crate::content::FilesystemProvider;
use crate::dispatcher::Dispatcher;
use crate::error::ConfigError;
use crate::handler::RequestHandler;
use crate::router::Router;
use crate::static_files::StaticAssetHandler;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDef {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_file_root: Option<PathBuf>,
    /// Seconds, sent as `Cache-Control: max-age` on static files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    #[serde(default)]
    pub routes: Vec<RouteDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDef {
    pub method: String,
    pub path: String,
    pub route_handler: String,
}

impl ServerDef {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Builds the routes in definition order, plus a static file fallback when
    /// `staticFileRoot` is set.
    pub fn build(&self, registry: &HandlerRegistry) -> Result<Dispatcher, ConfigError> {
        let mut router = Router::default();
        for route in &self.routes {
            let handler = registry.get(&route.route_handler).ok_or_else(|| ConfigError::UnknownHandler {
                method: route.method.clone(),
                path: route.path.clone(),
                handler: route.route_handler.clone(),
            })?;
            router.add_route(&route.method, &route.path, handler)?;
        }
        info!(host = %self.host, routes = router.len(), "server definition loaded");

        let dispatcher = Dispatcher::new(router);
        let Some(root) = &self.static_file_root else {
            return Ok(dispatcher);
        };

        if !std::fs::metadata(root)?.is_dir() {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, root.display().to_string()).into());
        }
        let mut static_files = StaticAssetHandler::builder(FilesystemProvider::new(root));
        if let Some(max_age) = self.max_age {
            static_files = static_files.cache_max_age(Duration::from_secs(max_age));
        }
        Ok(dispatcher.with_static_files(static_files.build()))
    }
}

/// Handlers available to server definitions, by name.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, handler: impl RequestHandler + 'static) -> Self {
        self.register(name, handler);
        self
    }

    /// Replaces any handler registered under the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: impl RequestHandler + 'static) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(name).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouteError;
    use crate::handler_fn;
    use crate::path::Args;
    use http::Method;

    async fn user(args: Args) -> String {
        format!("user {}", args.get("id").unwrap_or_default())
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new().with("user", handler_fn(user))
    }

    #[test]
    fn test_build_routes_in_order() {
        let def = ServerDef::from_json(
            r#"{
                "host": "example.org",
                "routes": [
                    { "method": "GET", "path": "/users/$id", "routeHandler": "user" },
                    { "method": "delete", "path": "/users/$id", "routeHandler": "user" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(def.static_file_root, None);

        let dispatcher = def.build(&registry()).unwrap();
        let routes = dispatcher.router().routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].method(), Method::GET);
        assert_eq!(routes[1].method(), Method::DELETE);
        assert!(dispatcher.static_files().is_none());
    }

    #[test]
    fn test_static_root() {
        let root = tempfile::tempdir().unwrap();
        let def = ServerDef {
            host: "localhost".to_string(),
            static_file_root: Some(root.path().to_path_buf()),
            max_age: Some(60),
            routes: Vec::new(),
        };

        let dispatcher = def.build(&registry()).unwrap();
        assert!(dispatcher.static_files().is_some());

        let missing = ServerDef { static_file_root: Some(root.path().join("missing")), ..def };
        assert!(matches!(missing.build(&registry()), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(matches!(ServerDef::from_json(r#"{"routes": []}"#), Err(ConfigError::Json { .. })));

        let unknown_handler = ServerDef::from_json(
            r#"{"host": "h", "routes": [{ "method": "GET", "path": "/a", "routeHandler": "nope" }]}"#,
        )
        .unwrap();
        assert!(matches!(unknown_handler.build(&registry()), Err(ConfigError::UnknownHandler { .. })));

        let unknown_method = ServerDef::from_json(
            r#"{"host": "h", "routes": [{ "method": "PATCH", "path": "/a", "routeHandler": "user" }]}"#,
        )
        .unwrap();
        assert!(matches!(
            unknown_method.build(&registry()),
            Err(ConfigError::Route { source: RouteError::UnknownMethod { .. } })
        ));
    }
}
