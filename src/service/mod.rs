//! Service registry — named handlers and closest-ancestor name resolution.
//!
//! Service names are dot-separated, general to specific: `api.users` can serve
//! requests for `api.users.create`, but `api.users.create` never serves
//! `api.users`. The wildcard `*` serves anything no registered ancestor claims.
//!
//! | Registered               | Requested      | Served by | Distance |
//! |--------------------------|----------------|-----------|----------|
//! | `foo`, `foo.baz`         | `foo.bar`      | `foo`     | 1        |
//! | `foo`, `foo.baz`         | `foo.baz.bar`  | `foo.baz` | 1        |
//! | `foo.bar.baz`            | `foo.bar`      | *(none)*  |          |
//! | `foo`, `*`               | `bar`          | `*`       | 1        |

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::config::ConfigError;
use crate::context::{Context, Handler, HandlerResult};
use crate::grammar::{self, WILDCARD_SERVICE};

/// The outcome of resolving a requested service name.
#[derive(Clone)]
pub struct Resolved {
    /// The registered name that matched.
    pub name: String,
    pub handler: Handler,
    /// Segments stripped from the requested name to reach `name`.
    pub distance: usize,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("name", &self.name)
            .field("distance", &self.distance)
            .finish_non_exhaustive()
    }
}

/// Handlers keyed by service name.
///
/// The registry is filled before the dispatcher is built and is moved into
/// [`DispatcherBuilder`](crate::dispatcher::DispatcherBuilder), after which it
/// can no longer change.
///
/// # Examples
///
/// ```
/// use waygate::context::Context;
/// use waygate::service::ServiceRegistry;
///
/// let mut services = ServiceRegistry::new();
/// services
///     .register("api", |_ctx: &mut Context<'_>| Ok(()))?
///     .register("api.users", |_ctx: &mut Context<'_>| Ok(()))?;
///
/// let resolved = services.resolve("api.users.create").unwrap();
/// assert_eq!(resolved.name, "api.users");
/// assert_eq!(resolved.distance, 1);
/// # Ok::<(), waygate::ConfigError>(())
/// ```
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<String, Handler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`.
    ///
    /// Registering the same name again replaces the earlier handler.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidServiceName`] if `name` is neither `*` nor a
    /// dot-separated identifier.
    pub fn register<F>(&mut self, name: &str, handler: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(name, crate::context::handler(handler))
    }

    /// Registers an already type-erased [`Handler`] under `name`.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_handler(
        &mut self,
        name: &str,
        handler: Handler,
    ) -> Result<&mut Self, ConfigError> {
        if !grammar::is_valid_service(name) {
            return Err(ConfigError::InvalidServiceName {
                name: name.to_owned(),
            });
        }
        if self.services.insert(name.to_owned(), handler).is_some() {
            warn!(service = name, "service registered twice; keeping the later handler");
        }
        Ok(self)
    }

    /// Finds the most specific registered service able to serve `requested`.
    ///
    /// Tries `requested` itself, then each ancestor obtained by dropping the
    /// last segment, then the wildcard. Returns `None` if none is registered.
    pub fn resolve(&self, requested: &str) -> Option<Resolved> {
        let requested_len = grammar::segment_count(requested);

        let mut candidate = requested;
        while !candidate.is_empty() {
            if let Some(handler) = self.services.get(candidate) {
                return Some(Resolved {
                    name: candidate.to_owned(),
                    handler: handler.clone(),
                    distance: requested_len - grammar::segment_count(candidate),
                });
            }
            candidate = grammar::remove_last_segment(candidate);
        }

        self.services.get(WILDCARD_SERVICE).map(|handler| Resolved {
            name: WILDCARD_SERVICE.to_owned(),
            handler: handler.clone(),
            distance: requested_len,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.services.keys().collect();
        names.sort();
        f.debug_struct("ServiceRegistry")
            .field("services", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }

    fn registry(names: &[&str]) -> ServiceRegistry {
        let mut services = ServiceRegistry::new();
        for name in names {
            services.register(name, noop).unwrap();
        }
        services
    }

    fn resolved(services: &ServiceRegistry, requested: &str) -> Option<(String, usize)> {
        services
            .resolve(requested)
            .map(|r| (r.name, r.distance))
    }

    #[test]
    fn closest_ancestor_wins() {
        let services = registry(&["foo", "foo.bar.baz", "foo.baz"]);

        assert_eq!(resolved(&services, "foo"), Some(("foo".into(), 0)));
        assert_eq!(resolved(&services, "foo.bar"), Some(("foo".into(), 1)));
        assert_eq!(
            resolved(&services, "foo.bar.baz"),
            Some(("foo.bar.baz".into(), 0))
        );
        assert_eq!(resolved(&services, "foo.baz"), Some(("foo.baz".into(), 0)));
        assert_eq!(
            resolved(&services, "foo.baz.bar"),
            Some(("foo.baz".into(), 1))
        );
        assert_eq!(resolved(&services, "bar"), None);
    }

    #[test]
    fn more_specific_registration_never_serves_a_general_request() {
        let services = registry(&["foo.bar.baz"]);
        assert_eq!(resolved(&services, "foo.bar"), None);
        assert_eq!(resolved(&services, "foo"), None);
    }

    #[test]
    fn sibling_names_do_not_match() {
        let services = registry(&["foo.bar"]);
        assert_eq!(resolved(&services, "foo.baz"), None);
        assert_eq!(resolved(&services, "foo.barx"), None);
    }

    #[test]
    fn wildcard_is_the_last_resort() {
        let services = registry(&["foo", "foo.bar.baz", "foo.baz", "*"]);

        assert_eq!(resolved(&services, "bar"), Some(("*".into(), 1)));
        assert_eq!(resolved(&services, "bar.baz.qux"), Some(("*".into(), 3)));
        assert_eq!(resolved(&services, "foo.bar"), Some(("foo".into(), 1)));
    }

    #[test]
    fn wildcard_alone_serves_everything() {
        let services = registry(&["*"]);
        assert_eq!(resolved(&services, "foo.bar"), Some(("*".into(), 2)));
        assert_eq!(resolved(&services, "foo"), Some(("*".into(), 1)));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut services = ServiceRegistry::new();
        for name in ["", "foo.", ".foo", "foo*", "foo bar"] {
            let err = services.register(name, noop).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidServiceName { .. }),
                "{name}: {err}"
            );
        }
        assert!(services.is_empty());
    }

    #[test]
    fn re_registering_replaces_the_handler() {
        let mut services = registry(&["foo"]);
        services.register("foo", noop).unwrap();
        assert_eq!(services.len(), 1);
        assert!(services.contains("foo"));
    }
}
