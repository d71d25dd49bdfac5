use serde_json::{Map, Value};
use vouch_types::Digest;

use crate::error::CryptoError;

/// BLAKE3 hashing for credential payloads and Merkle nodes.
///
/// Unlike a domain-separated hasher, node hashing here is the bare hash of
/// the concatenated child digests, so roots can be recomputed by any party
/// holding only the leaves and the hash function.
///
/// Roots are BLAKE3 roots. They are not interchangeable with keccak256
/// Merkle roots anchored by EVM-side tooling for the same leaves; a root
/// must be verified with the hasher that produced it.
pub struct ContentHasher;

impl ContentHasher {
    /// Hash raw bytes.
    pub fn hash(data: &[u8]) -> Digest {
        Digest::of(data)
    }

    /// Hash the concatenation `left ++ right` of two digests.
    pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(left.as_bytes());
        hasher.update(right.as_bytes());
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a JSON value in canonical form (see [`canonical_json`]).
    pub fn hash_json(value: &Value) -> Result<Digest, CryptoError> {
        Ok(Self::hash(&canonical_json(value)?))
    }

    /// Hash any serializable credential in canonical JSON form.
    pub fn hash_credential<T: serde::Serialize>(credential: &T) -> Result<Digest, CryptoError> {
        let value =
            serde_json::to_value(credential).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Self::hash_json(&value)
    }

    /// Verify that data produces the expected digest.
    pub fn verify(data: &[u8], expected: &Digest) -> bool {
        Self::hash(data) == *expected
    }
}

/// Encode a JSON value canonically: object keys sorted at every depth,
/// compact separators.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CryptoError> {
    serde_json::to_vec(&sorted(value)).map_err(|e| CryptoError::Serialization(e.to_string()))
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, inner) in entries {
                out.insert(key.clone(), sorted(inner));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(ContentHasher::hash(b"hello"), ContentHasher::hash(b"hello"));
    }

    #[test]
    fn hash_pair_is_plain_concatenation() {
        let a = Digest::of(b"a");
        let b = Digest::of(b"b");
        let mut concat = a.as_bytes().to_vec();
        concat.extend_from_slice(b.as_bytes());
        assert_eq!(ContentHasher::hash_pair(&a, &b), Digest::of(&concat));
    }

    #[test]
    fn hash_pair_is_order_sensitive() {
        let a = Digest::of(b"a");
        let b = Digest::of(b"b");
        assert_ne!(
            ContentHasher::hash_pair(&a, &b),
            ContentHasher::hash_pair(&b, &a)
        );
    }

    #[test]
    fn key_order_does_not_affect_credential_hash() {
        let first: Value =
            serde_json::from_str(r#"{"name":"student1","degree":"Blockchain 101","year":2024}"#)
                .unwrap();
        let second: Value =
            serde_json::from_str(r#"{"year":2024,"degree":"Blockchain 101","name":"student1"}"#)
                .unwrap();
        assert_eq!(
            ContentHasher::hash_json(&first).unwrap(),
            ContentHasher::hash_json(&second).unwrap()
        );
    }

    #[test]
    fn nested_objects_are_sorted() {
        let value = json!({"b": {"z": 1, "a": [{"y": 2, "x": 3}]}, "a": null});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":null,"b":{"a":[{"x":3,"y":2}],"z":1}}"#
        );
    }

    #[test]
    fn different_values_hash_differently() {
        let a = ContentHasher::hash_json(&json!({"year": 2024})).unwrap();
        let b = ContentHasher::hash_json(&json!({"year": 2025})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_credential_matches_hash_json() {
        #[derive(serde::Serialize)]
        struct Credential {
            name: &'static str,
            year: u32,
        }
        let typed = ContentHasher::hash_credential(&Credential {
            name: "student1",
            year: 2024,
        })
        .unwrap();
        let untyped = ContentHasher::hash_json(&json!({"year": 2024, "name": "student1"})).unwrap();
        assert_eq!(typed, untyped);
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::hash(b"original");
        assert!(ContentHasher::verify(b"original", &id));
        assert!(!ContentHasher::verify(b"tampered", &id));
    }
}
