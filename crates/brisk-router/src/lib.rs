//! brisk-router: Zero-dependency ordered HTTP router
//!
//! Routes are kept in registration order and matched by a linear scan.
//! The first route whose method and pattern both match wins; a route
//! registered later never shadows an earlier one, however specific it is.
//!
//! ## Path Syntax
//! - `/users`, `/api/v1/health` - static segments (exact, case-sensitive)
//! - `:name` - named parameter (captures one segment)
//! - `*` or `*name` - wildcard (captures one or more remaining segments)
//!
//! Empty segments are ignored, so `/users/` and `/users` are the same path.
//! A wildcard is terminal: anything after it in the pattern is ignored.
//!
//! ## Example
//! ```
//! use brisk_router::Router;
//!
//! let mut router = Router::new();
//! router.insert("GET", "/users/me", "me");
//! router.insert("GET", "/users/:id", "user");
//! router.insert("GET", "/files/*path", "file");
//!
//! let m = router.find("GET", "/users/123").unwrap();
//! assert_eq!(*m.value, "user");
//! assert_eq!(m.param("id"), Some("123"));
//!
//! assert_eq!(*router.find("GET", "/users/me").unwrap().value, "me");
//! assert!(router.find("POST", "/users/me").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;

/// One compiled pattern segment
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

/// Compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern such as `/users/:id/files/*rest`
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        for segment in split_path(path) {
            if let Some(name) = segment.strip_prefix(':') {
                segments.push(Segment::Param(name.to_string()));
            } else if let Some(name) = segment.strip_prefix('*') {
                let name = if name.is_empty() { "*" } else { name };
                segments.push(Segment::Wildcard(name.to_string()));
                break;
            } else {
                segments.push(Segment::Static(segment.to_string()));
            }
        }

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// The pattern as it was registered
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a request path, returning captured params on success
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = Vec::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.push((name.clone(), (*value).to_string()));
                }
                Segment::Wildcard(name) => {
                    if i >= parts.len() {
                        return None;
                    }
                    params.push((name.clone(), parts[i..].join("/")));
                    return Some(params);
                }
            }
        }

        if parts.len() == self.segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// A registered (method, pattern) -> value binding
#[derive(Debug, Clone)]
pub struct Route<T> {
    method: String,
    pattern: Pattern,
    value: T,
}

impl<T> Route<T> {
    /// Upper-cased HTTP method
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

/// Route match result
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a, T> {
    /// Registration index of the matched route
    pub index: usize,
    /// The matched value
    pub value: &'a T,
    /// Captured path parameters as (name, value) pairs
    pub params: Vec<(String, String)>,
}

impl<T> Match<'_, T> {
    /// Get params as HashMap for convenient access
    pub fn params_map(&self) -> HashMap<String, String> {
        self.params.iter().cloned().collect()
    }

    /// Get a single captured parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered HTTP router
///
/// Registration order is priority. The route table is meant to be built
/// once and then shared read-only.
#[derive(Debug, Clone)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
}

impl<T> Router<T> {
    /// Create a new router
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Append a route and return its index
    ///
    /// # Example
    /// ```
    /// use brisk_router::Router;
    ///
    /// let mut router = Router::new();
    /// assert_eq!(router.insert("GET", "/users/:id", 0), 0);
    /// assert_eq!(router.insert("post", "/users", 1), 1);
    /// ```
    pub fn insert(&mut self, method: &str, path: &str, value: T) -> usize {
        self.routes.push(Route {
            method: method.to_uppercase(),
            pattern: Pattern::parse(path),
            value,
        });
        self.routes.len() - 1
    }

    /// Find the first route matching `method` and `path`
    pub fn find(&self, method: &str, path: &str) -> Option<Match<'_, T>> {
        self.routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.method.eq_ignore_ascii_case(method))
            .find_map(|(index, route)| {
                route.pattern.matches(path).map(|params| Match {
                    index,
                    value: &route.value,
                    params,
                })
            })
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes in priority order
    pub fn routes(&self) -> impl Iterator<Item = &Route<T>> {
        self.routes.iter()
    }

    /// Check if a method has any routes registered
    pub fn has_method(&self, method: &str) -> bool {
        self.routes
            .iter()
            .any(|r| r.method.eq_ignore_ascii_case(method))
    }

    /// Get all registered methods, in first-registration order
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = Vec::new();
        for route in &self.routes {
            if !methods.contains(&route.method) {
                methods.push(route.method.clone());
            }
        }
        methods
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_routes() {
        let mut router = Router::new();
        router.insert("GET", "/", 0);
        router.insert("GET", "/users", 1);
        router.insert("GET", "/users/list", 2);
        router.insert("POST", "/users", 3);

        assert_eq!(*router.find("GET", "/").unwrap().value, 0);
        assert_eq!(*router.find("GET", "/users").unwrap().value, 1);
        assert_eq!(*router.find("GET", "/users/list").unwrap().value, 2);
        assert_eq!(*router.find("POST", "/users").unwrap().value, 3);
        assert!(router.find("GET", "/unknown").is_none());
        assert!(router.find("DELETE", "/users").is_none());
    }

    #[test]
    fn test_param_routes() {
        let mut router = Router::new();
        router.insert("GET", "/users/:id", 1);
        router.insert("GET", "/users/:id/posts/:post_id", 2);

        let m = router.find("GET", "/users/42").unwrap();
        assert_eq!(*m.value, 1);
        assert_eq!(m.params, vec![("id".to_string(), "42".to_string())]);

        let m = router.find("GET", "/users/42/posts/99").unwrap();
        assert_eq!(*m.value, 2);
        assert_eq!(
            m.params,
            vec![
                ("id".to_string(), "42".to_string()),
                ("post_id".to_string(), "99".to_string()),
            ]
        );
    }

    #[test]
    fn test_first_match_wins() {
        let mut router = Router::new();
        router.insert("GET", "/users/:id", 1);
        router.insert("GET", "/users/me", 2);

        // The later, more specific route never shadows the earlier one
        let m = router.find("GET", "/users/me").unwrap();
        assert_eq!(*m.value, 1);
        assert_eq!(m.index, 0);
        assert_eq!(m.param("id"), Some("me"));
    }

    #[test]
    fn test_specific_first_wins_when_registered_first() {
        let mut router = Router::new();
        router.insert("GET", "/users/me", 2);
        router.insert("GET", "/users/:id", 1);

        assert_eq!(*router.find("GET", "/users/me").unwrap().value, 2);
        assert_eq!(*router.find("GET", "/users/7").unwrap().value, 1);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut router = Router::new();
        router.insert("GET", "/hello", "first");
        router.insert("GET", "/hello", "second");

        assert_eq!(*router.find("GET", "/hello").unwrap().value, "first");
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_named_wildcard() {
        let mut router = Router::new();
        router.insert("GET", "/files/*path", 1);

        let m = router.find("GET", "/files/docs/readme.md").unwrap();
        assert_eq!(*m.value, 1);
        assert_eq!(
            m.params,
            vec![("path".to_string(), "docs/readme.md".to_string())]
        );
        assert!(router.find("GET", "/files").is_none());
    }

    #[test]
    fn test_bare_wildcard() {
        let mut router = Router::new();
        router.insert("GET", "/static/*", 1);

        let m = router.find("GET", "/static/js/app.js").unwrap();
        assert_eq!(m.params, vec![("*".to_string(), "js/app.js".to_string())]);
    }

    #[test]
    fn test_wildcard_is_terminal() {
        let pattern = Pattern::parse("/a/*rest/ignored");
        assert_eq!(
            pattern.matches("/a/b/c"),
            Some(vec![("rest".to_string(), "b/c".to_string())])
        );
    }

    #[test]
    fn test_param_needs_segment() {
        let mut router = Router::new();
        router.insert("GET", "/users/:id", 1);

        assert!(router.find("GET", "/users").is_none());
        assert!(router.find("GET", "/users/1/extra").is_none());
    }

    #[test]
    fn test_case_insensitive_method() {
        let mut router = Router::new();
        router.insert("get", "/users", 1);

        assert_eq!(*router.find("GET", "/users").unwrap().value, 1);
        assert_eq!(*router.find("get", "/users").unwrap().value, 1);
        assert_eq!(*router.find("Get", "/users").unwrap().value, 1);
        assert_eq!(router.routes().next().unwrap().method(), "GET");
    }

    #[test]
    fn test_static_segments_are_case_sensitive() {
        let mut router = Router::new();
        router.insert("GET", "/Hello", 1);

        assert!(router.find("GET", "/hello").is_none());
        assert!(router.find("GET", "/Hello").is_some());
    }

    #[test]
    fn test_trailing_slash() {
        let mut router = Router::new();
        router.insert("GET", "/users/", 1);

        assert_eq!(*router.find("GET", "/users").unwrap().value, 1);
        assert_eq!(*router.find("GET", "/users/").unwrap().value, 1);
    }

    #[test]
    fn test_methods() {
        let mut router = Router::new();
        router.insert("GET", "/users", 1);
        router.insert("POST", "/users", 2);
        router.insert("DELETE", "/users/:id", 3);
        router.insert("GET", "/posts", 4);

        assert!(router.has_method("GET"));
        assert!(router.has_method("post"));
        assert!(!router.has_method("PUT"));
        assert_eq!(router.methods(), vec!["GET", "POST", "DELETE"]);
    }

    #[test]
    fn test_params_map() {
        let mut router = Router::new();
        router.insert("GET", "/users/:id", 1);

        let m = router.find("GET", "/users/42").unwrap();
        let map = m.params_map();
        assert_eq!(map.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn test_empty_router() {
        let router: Router<u32> = Router::default();
        assert!(router.is_empty());
        assert!(router.find("GET", "/").is_none());
    }
}
