//! Cache Key Module
//!
//! Stable string keys derived from call arguments, and a memoizing helper
//! over [`LruCache`].

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::cache::LruCache;

const SEPARATOR: &str = ":";

// == Cache Key ==
/// Builds a deterministic key from positional and named arguments.
///
/// Positional arguments keep their order; named arguments are sorted by
/// name, and object fields are sorted at every depth, so two calls with the
/// same logical arguments always produce the same key.
///
/// ```
/// use arena_shield::cache::CacheKey;
///
/// let key = CacheKey::new()
///     .arg("standard")
///     .named("limit", &10)
///     .named("colors", &["W", "U"])
///     .finish()
///     .unwrap();
/// assert_eq!(key, r#"standard:colors=["W","U"]:limit=10"#);
/// ```
#[derive(Debug, Default, Clone)]
pub struct CacheKey {
    positional: Vec<String>,
    named: BTreeMap<String, String>,
    unkeyable: bool,
}

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match render(value) {
            Some(part) => self.positional.push(part),
            None => self.unkeyable = true,
        }
        self
    }

    /// Adds a named argument. Repeating a name replaces the earlier value.
    pub fn named<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Self {
        match render(value) {
            Some(part) => {
                self.named.insert(name.to_string(), part);
            }
            None => self.unkeyable = true,
        }
        self
    }

    /// The finished key, or None if an argument could not be serialized.
    pub fn finish(self) -> Option<String> {
        if self.unkeyable {
            return None;
        }

        let parts: Vec<String> = self
            .positional
            .into_iter()
            .chain(
                self.named
                    .into_iter()
                    .map(|(name, value)| format!("{name}={value}")),
            )
            .collect();
        Some(parts.join(SEPARATOR))
    }
}

fn render<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    let value = serde_json::to_value(value).ok()?;
    match value {
        // Strings are JSON-escaped but unquoted
        Value::String(s) => {
            let quoted = serde_json::to_string(&s).ok()?;
            Some(quoted[1..quoted.len() - 1].to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        composite => serde_json::to_string(&canonicalize(composite)).ok(),
    }
}

/// Rebuilds every object with its fields in sorted order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

// == Cached ==
/// Memoizes an async call in `cache` under `"{name}:{key}"`.
///
/// On a hit `f` is not invoked. On a miss `f` runs and only a successful
/// result is stored. If the key could not be derived the call runs uncached.
pub async fn cached<V, E, F, Fut>(
    cache: &LruCache<V>,
    name: &str,
    key: CacheKey,
    ttl: Option<Duration>,
    f: F,
) -> Result<V, E>
where
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    match key.finish() {
        Some(key) => {
            let key = format!("{name}{SEPARATOR}{key}");
            cache.get_or_insert_with(&key, ttl, f).await
        }
        None => {
            warn!(name, "Arguments are not serializable, calling uncached");
            f().await
        }
    }
}
