//! Navigation state handed to data functions.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Resolved dynamic parameters of a segment, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(IndexMap<String, String>);

impl Params {
    /// No parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Params::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set `name`, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Value of `name`, if matched.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parameters in the order they were matched.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The current URL, split into its routing-relevant parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub search: String,
    /// Fragment including the leading `#`, or empty.
    pub hash: String,
}

impl Location {
    /// Split a path such as `/gryffindor/students?year=1#top`.
    pub fn parse(url: &str) -> Self {
        let (rest, hash) = match url.find('#') {
            Some(i) => (&url[..i], &url[i..]),
            None => (url, ""),
        };
        let (pathname, search) = match rest.find('?') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        Self {
            pathname: if pathname.is_empty() { "/".to_string() } else { pathname.to_string() },
            search: search.to_string(),
            hash: hash.to_string(),
        }
    }

    /// Value of a query parameter, undecoded.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.search
            .trim_start_matches('?')
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.pathname, self.search, self.hash)
    }
}

/// Options for a programmatic navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing.
    pub replace: bool,
    /// Scroll to top after navigating.
    pub scroll: bool,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            replace: false,
            scroll: true,
        }
    }
}

/// Navigation trigger supplied by the router.
#[derive(Clone)]
pub struct Navigator(Arc<dyn Fn(&str, NavigateOptions) + Send + Sync>);

impl Navigator {
    /// Wrap the router's navigation callback.
    pub fn new(navigate: impl Fn(&str, NavigateOptions) + Send + Sync + 'static) -> Self {
        Self(Arc::new(navigate))
    }

    /// A navigator that ignores every request, for server renders.
    pub fn noop() -> Self {
        Self::new(|to, _| tracing::debug!(%to, "navigation ignored"))
    }

    /// Forward a navigation request to the router.
    pub fn navigate(&self, to: &str, options: NavigateOptions) {
        (self.0)(to, options)
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Navigator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn location_parse_splits_parts() {
        let loc = Location::parse("/gryffindor/students?year=1&sort#top");
        assert_eq!(loc.pathname, "/gryffindor/students");
        assert_eq!(loc.search, "?year=1&sort");
        assert_eq!(loc.hash, "#top");
        assert_eq!(loc.query("year"), Some("1"));
        assert_eq!(loc.query("sort"), Some(""));
        assert_eq!(loc.query("house"), None);
        assert_eq!(loc.to_string(), "/gryffindor/students?year=1&sort#top");
    }

    #[test]
    fn empty_path_is_root() {
        assert_eq!(Location::parse("?q=1").pathname, "/");
    }

    #[test]
    fn params_keep_order() {
        let params = Params::new().with("house", "gryffindor").with("year", "1");
        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["house", "year"]);
        assert_eq!(params.get("year"), Some("1"));
    }

    #[test]
    fn navigator_forwards_requests() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let nav = Navigator::new(move |to, opts| {
            seen_clone.lock().push((to.to_string(), opts.replace))
        });

        nav.navigate("/slytherin", NavigateOptions { replace: true, scroll: false });
        assert_eq!(*seen.lock(), vec![("/slytherin".to_string(), true)]);
    }
}
