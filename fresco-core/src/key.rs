//! Cache key types and construction.
//!
//! This module provides types for building and representing cache keys:
//!
//! - [`CacheKey`] - The complete identity of a cacheable resource
//! - [`KeyPart`] - A single key-value component of a cache key
//! - [`KeyParts`] - Builder for accumulating key parts
//!
//! ## Key Structure
//!
//! A cache key is a resource **kind** (e.g. `institutions`, `reviews`) followed
//! by an ordered list of query parameters. Two requests rendering to the same
//! string are the same resource.
//!
//! ## Format
//!
//! `{kind}:key1=value1&key2=value2`
//!
//! - The `:` separator is omitted when there are no parts
//! - A part without a value renders as its key only
//!
//! ```
//! use fresco_core::{CacheKey, KeyPart};
//!
//! let key = CacheKey::new("institutions", vec![KeyPart::new("page", Some("2"))]);
//! assert_eq!(key.to_string(), "institutions:page=2");
//!
//! let key = CacheKey::builder("reviews")
//!     .part("institution", Some("42"))
//!     .flag("verified")
//!     .build();
//! assert_eq!(key.to_string(), "reviews:institution=42&verified");
//!
//! assert_eq!(CacheKey::from_raw("people"), CacheKey::new("people", vec![]));
//! ```
//!
//! ## Performance
//!
//! [`CacheKey`] uses `Arc` internally for cheap cloning: keys are copied into
//! every spawned fetch task and every listener registration.

use smol_str::SmolStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug)]
struct CacheKeyInner {
    kind: SmolStr,
    parts: Vec<KeyPart>,
    /// Rendered identity, used for equality and hashing.
    rendered: Box<str>,
}

/// Opaque, stable identifier of a cacheable resource.
///
/// Equality and hashing are defined over the rendered form, so a key built from
/// parts and a key parsed with [`CacheKey::from_raw`] compare equal when they
/// render identically.
#[derive(Clone, Debug)]
pub struct CacheKey {
    inner: Arc<CacheKeyInner>,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.rendered == other.inner.rendered
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.rendered.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.rendered)
    }
}

impl serde::Serialize for CacheKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.inner.rendered)
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        CacheKey::from_raw(raw)
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        CacheKey::from_raw(raw)
    }
}

impl CacheKey {
    /// Creates a new cache key from a resource kind and its parameters.
    pub fn new(kind: impl Into<SmolStr>, parts: Vec<KeyPart>) -> Self {
        let kind = kind.into();
        let rendered = render(&kind, &parts);
        CacheKey {
            inner: Arc::new(CacheKeyInner {
                kind,
                parts,
                rendered,
            }),
        }
    }

    /// Wraps an already opaque key string.
    ///
    /// The whole string becomes the kind; the key has no parts.
    pub fn from_raw(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        CacheKey {
            inner: Arc::new(CacheKeyInner {
                kind: SmolStr::new(raw),
                parts: Vec::new(),
                rendered: raw.into(),
            }),
        }
    }

    /// Starts building a key for the given resource kind.
    pub fn builder(kind: impl Into<SmolStr>) -> KeyParts {
        KeyParts::new(kind)
    }

    /// Returns the resource kind.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Returns the key parts.
    pub fn parts(&self) -> &[KeyPart] {
        &self.inner.parts
    }

    /// Returns the rendered key.
    pub fn as_str(&self) -> &str {
        &self.inner.rendered
    }
}

fn render(kind: &str, parts: &[KeyPart]) -> Box<str> {
    use std::fmt::Write;

    let mut out = String::from(kind);
    for (i, part) in parts.iter().enumerate() {
        out.push(if i == 0 { ':' } else { '&' });
        // Writing into a String cannot fail.
        let _ = write!(out, "{}", part);
    }
    out.into_boxed_str()
}

/// A single component of a cache key.
///
/// The value is optional - some parts are flags.
///
/// ```
/// use fresco_core::KeyPart;
///
/// let page = KeyPart::new("page", Some("3"));
/// assert_eq!(page.key(), "page");
/// assert_eq!(page.value(), Some("3"));
///
/// let flag = KeyPart::new("verified", None::<&str>);
/// assert_eq!(flag.value(), None);
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct KeyPart {
    key: SmolStr,
    value: Option<SmolStr>,
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(ref value) = self.value {
            write!(f, "={}", value)?;
        }
        Ok(())
    }
}

impl KeyPart {
    /// Creates a new key part.
    pub fn new<K: AsRef<str>, V: AsRef<str>>(key: K, value: Option<V>) -> Self {
        KeyPart {
            key: SmolStr::new(key),
            value: value.map(SmolStr::new),
        }
    }

    /// Returns the key name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the optional value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Builder for accumulating cache key parts.
#[derive(Debug)]
pub struct KeyParts {
    kind: SmolStr,
    parts: Vec<KeyPart>,
}

impl KeyParts {
    /// Creates an empty builder for the given resource kind.
    pub fn new(kind: impl Into<SmolStr>) -> Self {
        KeyParts {
            kind: kind.into(),
            parts: Vec::new(),
        }
    }

    /// Adds a key-value part.
    pub fn part<K: AsRef<str>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        self.parts
            .push(KeyPart::new(key, value.map(|v| v.to_string())));
        self
    }

    /// Adds a key-only part.
    pub fn flag<K: AsRef<str>>(mut self, key: K) -> Self {
        self.parts.push(KeyPart::new(key, None::<&str>));
        self
    }

    /// Adds a single key part.
    pub fn push(&mut self, part: KeyPart) {
        self.parts.push(part)
    }

    /// Finishes the key.
    pub fn build(self) -> CacheKey {
        CacheKey::new(self.kind, self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_render_without_parts() {
        let key = CacheKey::new("institutions", vec![]);
        assert_eq!(key.as_str(), "institutions");
        assert!(key.parts().is_empty());
    }

    #[test]
    fn test_builder_keeps_part_order() {
        let key = CacheKey::builder("institutions")
            .part("type", Some("university"))
            .part("page", Some(2))
            .build();
        assert_eq!(key.to_string(), "institutions:type=university&page=2");
        assert_eq!(key.kind(), "institutions");
        assert_eq!(key.parts().len(), 2);
    }

    #[test]
    fn test_raw_and_built_keys_are_the_same_resource() {
        let built = CacheKey::builder("people").part("id", Some(7)).build();
        let raw = CacheKey::from_raw("people:id=7");

        assert_eq!(built, raw);

        let mut set = HashSet::new();
        set.insert(built);
        assert!(set.contains(&raw));
    }

    #[test]
    fn test_different_parameters_are_different_keys() {
        let first = CacheKey::builder("reviews").part("page", Some(1)).build();
        let second = CacheKey::builder("reviews").part("page", Some(2)).build();
        assert_ne!(first, second);
    }

    #[test]
    fn test_serializes_as_rendered_string() {
        let key = CacheKey::builder("reviews").flag("verified").build();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"reviews:verified\"");
    }
}
