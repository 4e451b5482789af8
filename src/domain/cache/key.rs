//! Cache key generation

use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::fetch::{Endpoint, FetchParams};

/// Deterministic identifier for an (endpoint, parameters) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the string representation of the key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Derives cache keys from an endpoint and its canonicalized parameters
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    /// Whether to emit a SHA-256 digest instead of the full serialization
    hashed: bool,
}

impl CacheKeyGenerator {
    /// Creates a generator producing full, human readable keys
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator that produces 64 char SHA-256 hex keys
    pub fn with_hashed_keys(mut self) -> Self {
        self.hashed = true;
        self
    }

    /// Generates the key for `endpoint` called with `params`.
    ///
    /// The pair is serialized as the JSON array `[endpoint, params]` with
    /// parameter keys sorted at every depth.
    pub fn generate(&self, endpoint: &Endpoint, params: &FetchParams) -> CacheKey {
        let joined = serde_json::Value::Array(vec![
            serde_json::Value::String(endpoint.as_str().to_string()),
            params.to_canonical(),
        ])
        .to_string();

        if self.hashed {
            CacheKey(hex::encode(Sha256::digest(joined.as_bytes())))
        } else {
            CacheKey(joined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint(value: &str) -> Endpoint {
        Endpoint::new(value).unwrap()
    }

    #[test]
    fn test_generate_full_key() {
        let generator = CacheKeyGenerator::new();
        let params = FetchParams::new().with("userId", 1);

        let key = generator.generate(&endpoint("/posts"), &params);
        assert_eq!(key.as_str(), r#"["/posts",{"userId":1}]"#);
    }

    #[test]
    fn test_key_ignores_parameter_order() {
        let generator = CacheKeyGenerator::new();

        let a = FetchParams::new()
            .with("zebra", "z")
            .with("apple", json!({"y": 2, "x": 1}));
        let b = FetchParams::from_json(json!({"apple": {"x": 1, "y": 2}, "zebra": "z"})).unwrap();

        assert_eq!(
            generator.generate(&endpoint("/posts"), &a),
            generator.generate(&endpoint("/posts"), &b)
        );
    }

    #[test]
    fn test_distinct_pairs_produce_distinct_keys() {
        let generator = CacheKeyGenerator::new();
        let params = FetchParams::new().with("userId", 1);

        let base = generator.generate(&endpoint("/posts"), &params);

        assert_ne!(base, generator.generate(&endpoint("/users"), &params));
        assert_ne!(
            base,
            generator.generate(&endpoint("/posts"), &FetchParams::new().with("userId", 2))
        );
        assert_ne!(base, generator.generate(&endpoint("/posts"), &FetchParams::new()));
    }

    #[test]
    fn test_separator_like_endpoints_do_not_collide() {
        let generator = CacheKeyGenerator::new();

        let a = generator.generate(&endpoint(r#"/a",{"x":1}"#), &FetchParams::new());
        let b = generator.generate(&endpoint("/a"), &FetchParams::new().with("x", 1));

        assert_ne!(a, b);
    }

    #[test]
    fn test_hashed_keys() {
        let generator = CacheKeyGenerator::new().with_hashed_keys();
        let params = FetchParams::new().with("userId", 1);

        let key = generator.generate(&endpoint("/posts"), &params);
        assert_eq!(key.as_str().len(), 64);
        assert_eq!(key, generator.generate(&endpoint("/posts"), &params.clone()));
    }
}
