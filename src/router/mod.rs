//! Endpoint table — map request paths and methods to resolved services.
//!
//! Two kinds of bindings are supported:
//!
//! | Binding     | Matches                                  | Does not match        |
//! |-------------|------------------------------------------|-----------------------|
//! | `/api/echo` | `/api/echo`, `/api/echo/`                | `/api/echo/x`, `/api` |
//! | `/api/*`    | `/api`, `/api/echo`, `/api/a/b/c`        | `/apix`, `/`          |
//! | `/*`        | every path                               |                       |
//!
//! Lookup strips one trailing slash from the request path, tries an exact
//! binding first, then walks up the path one directory at a time looking for a
//! prefix binding. The deepest prefix wins, so given `/api/*` and `/api/foo/*`
//! a request for `/api/foo/bar` goes to `/api/foo/*`.
//!
//! A path that matches but has nothing bound for the request method is
//! reported as [`RouteMiss::MethodNotAllowed`], not [`RouteMiss::NotFound`].

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::context::Handler;
use crate::grammar;
use crate::http::{Method, StatusCode};

/// A service resolved for one endpoint.
#[derive(Clone)]
pub struct Route {
    service: String,
    handler: Handler,
}

impl Route {
    pub fn new(service: impl Into<String>, handler: Handler) -> Self {
        Self {
            service: service.into(),
            handler,
        }
    }

    /// The registered service name that serves this endpoint.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// All routes bound to one path, keyed by method.
#[derive(Debug, Clone, Default)]
pub struct RouteEntry {
    methods: HashMap<Method, Route>,
}

impl RouteEntry {
    pub fn get(&self, method: &Method) -> Option<&Route> {
        self.methods.get(method)
    }

    /// Methods bound on this path, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.keys()
    }
}

/// Why a lookup produced no route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteMiss {
    #[error("no endpoint matches the path")]
    NotFound,

    #[error("the endpoint has no service for this method")]
    MethodNotAllowed,
}

impl RouteMiss {
    /// The response status this miss maps to.
    pub fn status(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NotFound,
            Self::MethodNotAllowed => StatusCode::MethodNotAllowed,
        }
    }
}

/// Path → method → route table with exact and prefix entries.
///
/// # Examples
///
/// ```
/// use waygate::context::{Context, handler};
/// use waygate::http::Method;
/// use waygate::router::{EndpointTable, Route, RouteMiss};
///
/// let noop = handler(|_ctx: &mut Context<'_>| Ok(()));
///
/// let mut table = EndpointTable::new();
/// table.bind("/api/*", Method::Get, Route::new("api", noop.clone()))?;
/// table.bind("/api/foo/*", Method::Get, Route::new("api.foo", noop))?;
///
/// assert_eq!(table.lookup("/api/foo/bar", &Method::Get).unwrap().service(), "api.foo");
/// assert_eq!(table.lookup("/api/bar", &Method::Get).unwrap().service(), "api");
/// assert_eq!(table.lookup("/api/bar", &Method::Put).unwrap_err(), RouteMiss::MethodNotAllowed);
/// assert_eq!(table.lookup("/", &Method::Get).unwrap_err(), RouteMiss::NotFound);
/// # Ok::<(), waygate::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    exact: HashMap<String, RouteEntry>,
    prefixes: HashMap<String, RouteEntry>,
    len: usize,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `route` to `path` (optionally ending in `/*`) and `method`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidPath`] — `path` fails the path grammar.
    /// - [`ConfigError::UnsupportedMethod`] — `method` is not GET, POST, PUT or DELETE.
    /// - [`ConfigError::DuplicateBinding`] — `(path, method)` is already bound.
    pub fn bind(&mut self, path: &str, method: Method, route: Route) -> Result<(), ConfigError> {
        let binding = grammar::parse_binding_path(path).ok_or_else(|| ConfigError::InvalidPath {
            path: path.to_owned(),
        })?;
        if !method.is_routable() {
            return Err(ConfigError::UnsupportedMethod {
                path: path.to_owned(),
                method,
            });
        }

        let table = if binding.prefix {
            &mut self.prefixes
        } else {
            &mut self.exact
        };
        let entry = table.entry(binding.path).or_default();
        if entry.methods.contains_key(&method) {
            return Err(ConfigError::DuplicateBinding {
                path: path.to_owned(),
                method,
            });
        }
        entry.methods.insert(method, route);
        self.len += 1;
        Ok(())
    }

    /// Finds the entry serving `request_path`, ignoring the method.
    pub fn find(&self, request_path: &str) -> Option<&RouteEntry> {
        let path = normalize(request_path);
        if let Some(entry) = self.exact.get(path) {
            return Some(entry);
        }

        let mut dir = path;
        while !dir.is_empty() {
            if let Some(entry) = self.prefixes.get(dir) {
                return Some(entry);
            }
            dir = grammar::remove_last_dir(dir);
        }
        None
    }

    /// Finds the route serving `method` on `request_path`.
    ///
    /// # Errors
    ///
    /// [`RouteMiss::NotFound`] if no entry matches the path,
    /// [`RouteMiss::MethodNotAllowed`] if one does but not for `method`.
    pub fn lookup(&self, request_path: &str, method: &Method) -> Result<&Route, RouteMiss> {
        self.find(request_path)
            .ok_or(RouteMiss::NotFound)?
            .get(method)
            .ok_or(RouteMiss::MethodNotAllowed)
    }

    /// Number of `(path, method)` bindings.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// Strip one trailing slash, leaving the root alone.
fn normalize(path: &str) -> &str {
    if path == "/" {
        path
    } else {
        path.strip_suffix('/').unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, handler};

    fn route(service: &str) -> Route {
        Route::new(service, handler(|_ctx: &mut Context<'_>| Ok(())))
    }

    fn table(bindings: &[(&str, Method, &str)]) -> EndpointTable {
        let mut table = EndpointTable::new();
        for (path, method, service) in bindings {
            table.bind(path, method.clone(), route(service)).unwrap();
        }
        table
    }

    fn served_by(table: &EndpointTable, path: &str, method: Method) -> Result<String, RouteMiss> {
        table
            .lookup(path, &method)
            .map(|route| route.service().to_owned())
    }

    // ── normalize ─────────────────────────────────────────────────────────────

    #[test]
    fn normalize_strips_one_trailing_slash() {
        assert_eq!(normalize("/users/"), "/users");
        assert_eq!(normalize("/users"), "/users");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/users//"), "/users/");
    }

    // ── exact bindings ────────────────────────────────────────────────────────

    #[test]
    fn exact_match_hit() {
        let t = table(&[("/users", Method::Get, "users")]);
        assert_eq!(served_by(&t, "/users", Method::Get), Ok("users".into()));
    }

    #[test]
    fn exact_match_trailing_slash_normalized() {
        let t = table(&[("/users", Method::Get, "users")]);
        assert_eq!(served_by(&t, "/users/", Method::Get), Ok("users".into()));
    }

    #[test]
    fn exact_match_does_not_cover_children() {
        let t = table(&[("/users", Method::Get, "users")]);
        assert_eq!(
            served_by(&t, "/users/42", Method::Get),
            Err(RouteMiss::NotFound)
        );
        assert_eq!(served_by(&t, "/", Method::Get), Err(RouteMiss::NotFound));
    }

    #[test]
    fn exact_root() {
        let t = table(&[("/", Method::Get, "home")]);
        assert_eq!(served_by(&t, "/", Method::Get), Ok("home".into()));
        assert_eq!(served_by(&t, "/other", Method::Get), Err(RouteMiss::NotFound));
    }

    // ── prefix bindings ───────────────────────────────────────────────────────

    #[test]
    fn prefix_matches_itself_and_descendants() {
        let t = table(&[("/files/*", Method::Get, "files")]);
        for path in ["/files", "/files/", "/files/a", "/files/docs/readme.txt"] {
            assert_eq!(served_by(&t, path, Method::Get), Ok("files".into()), "{path}");
        }
        assert_eq!(served_by(&t, "/filesx", Method::Get), Err(RouteMiss::NotFound));
        assert_eq!(served_by(&t, "/", Method::Get), Err(RouteMiss::NotFound));
    }

    #[test]
    fn deepest_prefix_wins() {
        let t = table(&[
            ("/api/*", Method::Get, "api"),
            ("/api/foo/*", Method::Get, "api.foo"),
        ]);
        assert_eq!(served_by(&t, "/api/foo/bar", Method::Get), Ok("api.foo".into()));
        assert_eq!(served_by(&t, "/api/foo", Method::Get), Ok("api.foo".into()));
        assert_eq!(served_by(&t, "/api/fo", Method::Get), Ok("api".into()));
    }

    #[test]
    fn root_prefix_matches_everything() {
        let t = table(&[("/*", Method::Get, "root")]);
        for path in ["/", "/a", "/a/b/c/", "/x%20y"] {
            assert_eq!(served_by(&t, path, Method::Get), Ok("root".into()), "{path}");
        }
    }

    #[test]
    fn exact_beats_prefix() {
        let t = table(&[
            ("/api/*", Method::Get, "api"),
            ("/api/echo", Method::Get, "api.echo"),
        ]);
        assert_eq!(served_by(&t, "/api/echo", Method::Get), Ok("api.echo".into()));
        assert_eq!(served_by(&t, "/api/echo/x", Method::Get), Ok("api".into()));
    }

    // ── methods ───────────────────────────────────────────────────────────────

    #[test]
    fn unbound_method_is_method_not_allowed() {
        let t = table(&[("/r", Method::Get, "r")]);
        assert_eq!(
            served_by(&t, "/r", Method::Post),
            Err(RouteMiss::MethodNotAllowed)
        );
        assert_eq!(
            served_by(&t, "/r", Method::Patch),
            Err(RouteMiss::MethodNotAllowed)
        );
    }

    #[test]
    fn matched_exact_entry_does_not_fall_back_to_prefix_for_other_methods() {
        let t = table(&[
            ("/api/*", Method::Post, "api"),
            ("/api/echo", Method::Get, "api.echo"),
        ]);
        assert_eq!(
            served_by(&t, "/api/echo", Method::Post),
            Err(RouteMiss::MethodNotAllowed)
        );
    }

    #[test]
    fn each_method_routes_independently() {
        let t = table(&[
            ("/r", Method::Get, "get"),
            ("/r", Method::Post, "post"),
            ("/r", Method::Put, "put"),
            ("/r", Method::Delete, "delete"),
        ]);
        assert_eq!(t.len(), 4);
        assert_eq!(served_by(&t, "/r", Method::Put), Ok("put".into()));
        assert_eq!(served_by(&t, "/r", Method::Delete), Ok("delete".into()));
        let entry = t.find("/r").unwrap();
        assert_eq!(entry.methods().count(), 4);
    }

    #[test]
    fn miss_statuses() {
        assert_eq!(RouteMiss::NotFound.status(), StatusCode::NotFound);
        assert_eq!(
            RouteMiss::MethodNotAllowed.status(),
            StatusCode::MethodNotAllowed
        );
    }

    // ── bind ──────────────────────────────────────────────────────────────────

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut t = table(&[("/r", Method::Get, "first")]);
        let err = t.bind("/r", Method::Get, route("second")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBinding { .. }));
        assert_eq!(served_by(&t, "/r", Method::Get), Ok("first".into()));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn exact_and_prefix_of_same_path_coexist() {
        let t = table(&[("/r", Method::Get, "exact"), ("/r/*", Method::Get, "prefix")]);
        assert_eq!(served_by(&t, "/r", Method::Get), Ok("exact".into()));
        assert_eq!(served_by(&t, "/r/x", Method::Get), Ok("prefix".into()));
    }

    #[test]
    fn bind_validates_path_and_method() {
        let mut t = EndpointTable::new();
        assert!(matches!(
            t.bind("/r/", Method::Get, route("r")),
            Err(ConfigError::InvalidPath { .. })
        ));
        assert!(matches!(
            t.bind("/r", Method::Options, route("r")),
            Err(ConfigError::UnsupportedMethod { .. })
        ));
        assert!(t.is_empty());
    }
}
