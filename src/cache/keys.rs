// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache key composition.
//!
//! Point lookups use `operation:resource:argsHash`; bulk invalidation uses
//! the wildcard form `operation:resource:*`, which matches by prefix.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex chars of the SHA-256 digest kept in a key.
const ARGS_HASH_LEN: usize = 16;

/// Stable short hash of the JSON encoding of `args`.
pub fn args_hash<A: Serialize + ?Sized>(args: &A) -> String {
    let encoded = serde_json::to_vec(args).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    let mut hex = hex::encode(digest);
    hex.truncate(ARGS_HASH_LEN);
    hex
}

/// Key for a single cached result.
pub fn point<A: Serialize + ?Sized>(operation: &str, resource: &str, args: &A) -> String {
    format!("{}:{}:{}", operation, resource, args_hash(args))
}

/// Wildcard covering every cached result of `operation` on `resource`.
pub fn wildcard(operation: &str, resource: &str) -> String {
    format!("{}:{}:*", operation, resource)
}

/// The literal prefix of a wildcard key, or `None` for a point key.
pub fn wildcard_prefix(key: &str) -> Option<&str> {
    key.strip_suffix('*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_key_shape() {
        let key = point("get_record", "users", &("local", "users", "u1"));
        let parts: Vec<&str> = key.split(':').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "get_record");
        assert_eq!(parts[1], "users");
        assert_eq!(parts[2].len(), ARGS_HASH_LEN);
    }

    #[test]
    fn test_hash_is_stable_and_argument_sensitive() {
        let a = args_hash(&json!({"id": "u1"}));
        let b = args_hash(&json!({"id": "u1"}));
        let c = args_hash(&json!({"id": "u2"}));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_wildcard_matches_point_keys_by_prefix() {
        let pattern = wildcard("query_records", "users");
        let prefix = wildcard_prefix(&pattern).unwrap();

        assert_eq!(pattern, "query_records:users:*");
        assert!(point("query_records", "users", &1).starts_with(prefix));
        assert!(!point("query_records", "users_archive", &1).starts_with(prefix));
        assert!(wildcard_prefix("get_record:users:abc").is_none());
    }
}
