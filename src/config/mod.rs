//! Endpoint bindings, error handlers, and the errors a bad setup produces.
//!
//! A [`Config`] is an ordered list of `(path, method, service)` bindings. It can be
//! built in code or loaded from JSON:
//!
//! ```json
//! {
//!   "data": [
//!     { "endpoint": "/api/echo", "method": "GET",  "service": "api.echo" },
//!     { "endpoint": "/api/*",    "method": "POST", "service": "api.fallback" }
//!   ]
//! }
//! ```
//!
//! A path ending in `/*` is a prefix binding: it matches the path itself and
//! everything below it. Any other path matches exactly (a trailing slash on the
//! request is ignored).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::context::{Context, Handler, HandlerResult};
use crate::grammar::{self, WILDCARD_SERVICE};
use crate::http::{Method, StatusCode};

/// Everything that can be wrong with a gateway's setup.
///
/// These surface before the first request is served: from [`Config::add`],
/// [`ServiceRegistry::register`](crate::service::ServiceRegistry::register) or
/// [`DispatcherBuilder::build`](crate::dispatcher::DispatcherBuilder::build).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint path {path:?}")]
    InvalidPath { path: String },

    #[error("invalid service name {name:?}")]
    InvalidServiceName { name: String },

    #[error("endpoint {method} {path} must name a concrete service, not the wildcard")]
    WildcardBinding { path: String, method: Method },

    #[error("endpoint {method} {path}: only GET, POST, PUT and DELETE can be bound")]
    UnsupportedMethod { path: String, method: Method },

    #[error("endpoint {method} {path} is bound more than once")]
    DuplicateBinding { path: String, method: Method },

    #[error("no service can handle {service:?} for endpoint {method} {path}")]
    UnresolvedService {
        path: String,
        method: Method,
        service: String,
    },

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One endpoint bound to a requested service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// The path as written, including any trailing `/*`.
    pub path: String,
    pub method: Method,
    /// The service the endpoint asks for; the dispatcher may serve it with an
    /// ancestor or the wildcard.
    pub service: String,
}

/// Ordered endpoint bindings.
///
/// # Examples
///
/// ```
/// use waygate::config::Config;
/// use waygate::http::Method;
///
/// let mut config = Config::new();
/// config
///     .add("/api/echo", Method::Get, "api.echo")?
///     .add("/api/*", Method::Post, "api")?;
///
/// assert_eq!(config.get("/api/echo", &Method::Get), Some("api.echo"));
/// assert!(config.add("/api/", Method::Get, "api").is_err());
/// # Ok::<(), waygate::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    bindings: Vec<Binding>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a binding of `path` and `method` to `service`.
    ///
    /// Binding the same `(path, method)` twice is not an error here; the
    /// dispatcher rejects it at build time. Use [`rebind`](Self::rebind) to
    /// replace a binding on purpose.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidPath`] — `path` is not a path, optionally ending in `/*`.
    /// - [`ConfigError::UnsupportedMethod`] — `method` is not GET, POST, PUT or DELETE.
    /// - [`ConfigError::WildcardBinding`] — `service` is `*`.
    /// - [`ConfigError::InvalidServiceName`] — `service` is not a dotted name.
    pub fn add(
        &mut self,
        path: &str,
        method: Method,
        service: &str,
    ) -> Result<&mut Self, ConfigError> {
        let binding = validate(path, method, service)?;
        self.bindings.push(binding);
        Ok(self)
    }

    /// Binds `path` and `method` to `service`, replacing an existing binding for
    /// the same endpoint instead of adding a second one.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn rebind(
        &mut self,
        path: &str,
        method: Method,
        service: &str,
    ) -> Result<&mut Self, ConfigError> {
        let binding = validate(path, method, service)?;
        self.bindings
            .retain(|b| !(b.path == binding.path && b.method == binding.method));
        self.bindings.push(binding);
        Ok(self)
    }

    /// Returns the service requested by the first binding of `path` and `method`.
    pub fn get(&self, path: &str, method: &Method) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.path == path && &b.method == method)
            .map(|b| b.service.as_str())
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Parses a `{"data": [{"endpoint", "method", "service"}, ...]}` document.
    ///
    /// Every entry goes through [`add`](Self::add), in document order.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Json`] for malformed JSON, or whatever [`add`](Self::add)
    /// reports for the first bad entry.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let document: JsonConfig = serde_json::from_str(data)?;
        let mut config = Self::new();
        for entry in document.data {
            let method = match entry.method.parse::<Method>() {
                Ok(method) => method,
                Err(never) => match never {},
            };
            config.add(&entry.endpoint, method, &entry.service)?;
        }
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&data)
    }
}

impl<'a> IntoIterator for &'a Config {
    type Item = &'a Binding;
    type IntoIter = std::slice::Iter<'a, Binding>;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings.iter()
    }
}

fn validate(path: &str, method: Method, service: &str) -> Result<Binding, ConfigError> {
    if grammar::parse_binding_path(path).is_none() {
        return Err(ConfigError::InvalidPath {
            path: path.to_owned(),
        });
    }
    if !method.is_routable() {
        return Err(ConfigError::UnsupportedMethod {
            path: path.to_owned(),
            method,
        });
    }
    if service == WILDCARD_SERVICE {
        return Err(ConfigError::WildcardBinding {
            path: path.to_owned(),
            method,
        });
    }
    if !grammar::is_valid_service(service) {
        return Err(ConfigError::InvalidServiceName {
            name: service.to_owned(),
        });
    }
    Ok(Binding {
        path: path.to_owned(),
        method,
        service: service.to_owned(),
    })
}

#[derive(Deserialize)]
struct JsonConfig {
    data: Vec<JsonBinding>,
}

#[derive(Deserialize)]
struct JsonBinding {
    endpoint: String,
    method: String,
    service: String,
}

/// Handlers for requests that fail to route, keyed by status code.
///
/// The dispatcher sets `404 Not Found` or `405 Method Not Allowed` on the
/// context and then runs the handler registered here, if any, in place of a
/// service handler.
///
/// # Examples
///
/// ```
/// use waygate::config::ErrorConfig;
/// use waygate::context::Context;
/// use waygate::http::StatusCode;
///
/// let mut errors = ErrorConfig::new();
/// errors.add(StatusCode::NotFound, |ctx: &mut Context<'_>| {
///     ctx.set_body("nothing here");
///     Ok(())
/// });
/// assert!(errors.get(StatusCode::NotFound).is_some());
/// ```
#[derive(Default, Clone)]
pub struct ErrorConfig {
    handlers: HashMap<StatusCode, Handler>,
}

impl ErrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `status`, replacing any earlier one.
    pub fn add<F>(&mut self, status: StatusCode, handler: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_handler(status, crate::context::handler(handler))
    }

    pub fn add_handler(&mut self, status: StatusCode, handler: Handler) -> &mut Self {
        self.handlers.insert(status, handler);
        self
    }

    pub fn get(&self, status: StatusCode) -> Option<&Handler> {
        self.handlers.get(&status)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for ErrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.handlers.keys().map(|s| s.as_u16()).collect();
        codes.sort_unstable();
        f.debug_struct("ErrorConfig")
            .field("statuses", &codes)
            .finish()
    }
}
