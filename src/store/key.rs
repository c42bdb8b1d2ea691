//! Resource keys.

use std::collections::BTreeMap;
use std::fmt;

/// Identifies one cacheable remote resource.
///
/// A key is a path such as `watchlist` or `stock:ABC:preview`, plus optional
/// params kept in sorted order so equal requests hash equally. The segment
/// before the first `:` is the key's family, which is what fetchers and
/// policies are registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    path: String,
    params: BTreeMap<String, String>,
}

impl ResourceKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a param (builder pattern).
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Family name: `stock` for `stock:ABC:preview`.
    pub fn family(&self) -> &str {
        self.path.split(':').next().unwrap_or(&self.path)
    }

    /// Path segment at `index` (`ABC` is segment 1 of `stock:ABC:preview`).
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.path.split(':').nth(index)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

impl From<&str> for ResourceKey {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ResourceKey {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_and_segments() {
        let key = ResourceKey::new("stock:ABC:preview");
        assert_eq!(key.family(), "stock");
        assert_eq!(key.segment(1), Some("ABC"));
        assert_eq!(ResourceKey::new("watchlist").family(), "watchlist");
    }

    #[test]
    fn test_params_are_order_independent() {
        let a = ResourceKey::new("alerts:triggered")
            .with_param("limit", 50)
            .with_param("unread", true);
        let b = ResourceKey::new("alerts:triggered")
            .with_param("unread", true)
            .with_param("limit", 50);

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "alerts:triggered?limit=50&unread=true");
    }
}
