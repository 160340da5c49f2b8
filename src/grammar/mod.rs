//! Path and service-name grammar.
//!
//! | Kind          | Accepted                                  | Rejected                  |
//! |---------------|-------------------------------------------|---------------------------|
//! | path          | `/`, `/api/echo`, `/a%2Fb`, `/v1.0/~me`   | `/api/`, `api`, `/a b`    |
//! | prefix path   | `/*`, `/api/*`                            | `/api*`, `/api/*/x`       |
//! | service name  | `foo`, `foo.bar-2.baz_3`, `*`             | `foo.`, `.foo`, `foo*`    |
//!
//! Everything here is a pure function over `&str`.

use std::sync::OnceLock;

use regex::Regex;

/// The service name that serves any request no more specific name claims.
pub const WILDCARD_SERVICE: &str = "*";

/// Suffix that turns a binding path into a prefix binding.
pub const PREFIX_MARKER: &str = "/*";

fn path_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?:/|(?:/(?:[A-Za-z0-9\-._~]|%[0-9A-Fa-f]{2})+)+)$")
            .expect("path grammar is a valid regex")
    })
}

fn service_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_-]+(?:\.[a-zA-Z0-9_-]+)*$")
            .expect("service grammar is a valid regex")
    })
}

/// Returns `true` if `path` is a concrete path such as `/` or `/api/echo`.
///
/// A trailing slash is not part of the grammar: `/api/` is rejected. Prefix
/// markers are not accepted either; use [`parse_binding_path`] for those.
pub fn is_valid_path(path: &str) -> bool {
    path_regex().is_match(path)
}

/// Returns `true` for `*` or a dot-separated name like `api.users.create`.
pub fn is_valid_service(name: &str) -> bool {
    name == WILDCARD_SERVICE || service_regex().is_match(name)
}

/// A binding path split into its concrete path and its prefix flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPath {
    /// The path without the `/*` marker; `/*` alone becomes `/`.
    pub path: String,
    /// `true` if the binding matches the path and all its descendants.
    pub prefix: bool,
}

/// Strips an optional trailing `/*` from `raw` and validates the rest.
///
/// Returns `None` if what remains is not a valid path.
///
/// # Examples
///
/// ```
/// use waygate::grammar::parse_binding_path;
///
/// let root = parse_binding_path("/*").unwrap();
/// assert_eq!((root.path.as_str(), root.prefix), ("/", true));
///
/// let api = parse_binding_path("/api/*").unwrap();
/// assert_eq!((api.path.as_str(), api.prefix), ("/api", true));
///
/// assert!(parse_binding_path("/api/").is_none());
/// ```
pub fn parse_binding_path(raw: &str) -> Option<BindingPath> {
    let (path, prefix) = match raw.strip_suffix(PREFIX_MARKER) {
        Some("") => ("/", true),
        Some(rest) => (rest, true),
        None => (raw, false),
    };

    is_valid_path(path).then(|| BindingPath {
        path: path.to_owned(),
        prefix,
    })
}

/// Removes the last directory of a path.
///
/// `/foo/bar/baz` gives `/foo/bar`, `/foo` gives `/`, and `/` gives the empty
/// string, which ends an upward walk.
pub fn remove_last_dir(path: &str) -> &str {
    if path == "/" {
        return "";
    }
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Removes the last segment of a service name.
///
/// `foo.bar.baz` gives `foo.bar`; `foo` gives the empty string.
pub fn remove_last_segment(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Number of dot-separated segments in `name`; the wildcard has none.
pub fn segment_count(name: &str) -> usize {
    if name.is_empty() || name == WILDCARD_SERVICE {
        0
    } else {
        name.split('.').count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_paths() {
        for path in ["/", "/foo", "/foo/bar/baz", "/a%2Fb", "/v1.0/~me/_x-y"] {
            assert!(is_valid_path(path), "{path} should be valid");
        }
    }

    #[test]
    fn invalid_paths() {
        for path in ["", "foo", "/foo/", "//", "/foo*", "/*", "/foo/*", "/a b", "/%zz"] {
            assert!(!is_valid_path(path), "{path} should be invalid");
        }
    }

    #[test]
    fn binding_path_strips_marker() {
        assert_eq!(
            parse_binding_path("/foo/*"),
            Some(BindingPath {
                path: "/foo".into(),
                prefix: true
            })
        );
        assert_eq!(
            parse_binding_path("/foo"),
            Some(BindingPath {
                path: "/foo".into(),
                prefix: false
            })
        );
        assert!(parse_binding_path("/foo*").is_none());
        assert!(parse_binding_path("/foo/*/*").is_none());
        assert!(parse_binding_path("").is_none());
    }

    #[test]
    fn valid_and_invalid_services() {
        assert!(is_valid_service("foo.bar.baz"));
        assert!(is_valid_service("foo"));
        assert!(is_valid_service("api-v2.user_info"));
        assert!(is_valid_service("*"));
        assert!(!is_valid_service("foo."));
        assert!(!is_valid_service(""));
        assert!(!is_valid_service("foo*"));
        assert!(!is_valid_service(".foo"));
        assert!(!is_valid_service("foo..bar"));
        assert!(!is_valid_service("foo.*"));
    }

    #[test]
    fn last_dir_walk_terminates_at_root() {
        assert_eq!(remove_last_dir("/foo/bar/baz"), "/foo/bar");
        assert_eq!(remove_last_dir("/foo"), "/");
        assert_eq!(remove_last_dir("/"), "");
    }

    #[test]
    fn last_segment_walk_terminates() {
        assert_eq!(remove_last_segment("foo.bar.baz"), "foo.bar");
        assert_eq!(remove_last_segment("foo"), "");
    }

    #[test]
    fn segment_counts() {
        assert_eq!(segment_count("foo.bar.baz"), 3);
        assert_eq!(segment_count("foo"), 1);
        assert_eq!(segment_count("*"), 0);
    }
}
