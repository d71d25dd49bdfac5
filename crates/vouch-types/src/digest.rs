use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length in bytes of every [`Digest`].
pub const DIGEST_LEN: usize = 32;

/// Content digest used as leaf, node, and storage identity.
///
/// A `Digest` is the BLAKE3 hash of some canonical byte content. Equality is
/// byte equality. Digests serialize as `0x`-prefixed lowercase hex and parse
/// with or without the prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash raw bytes into a `Digest`.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; DIGEST_LEN]) -> Self {
        Self(hash)
    }

    /// The all-zero digest.
    pub const fn zero() -> Self {
        Self([0u8; DIGEST_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Hex-encoded string, without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hex-encoded string with the `0x` prefix used on the wire.
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        parse_fixed_hex::<DIGEST_LEN>(s).map(Self)
    }

    /// Return a copy with a single bit flipped.
    pub fn with_flipped_bit(&self, bit: usize) -> Self {
        let mut bytes = self.0;
        let bit = bit % (DIGEST_LEN * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);
        Self(bytes)
    }
}

/// Decode a hex string of exactly `N` bytes, accepting an optional `0x` prefix.
pub(crate) fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], TypeError> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(TypeError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefixed_hex())
    }
}

impl FromStr for Digest {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Digest> for [u8; DIGEST_LEN] {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_is_deterministic() {
        assert_eq!(Digest::of(b"hello world"), Digest::of(b"hello world"));
    }

    #[test]
    fn different_data_produces_different_digests() {
        assert_ne!(Digest::of(b"hello"), Digest::of(b"world"));
    }

    #[test]
    fn of_matches_raw_blake3() {
        let d = Digest::of(b"abc");
        assert_eq!(d.as_bytes(), blake3::hash(b"abc").as_bytes());
    }

    #[test]
    fn zero_is_all_zeros() {
        assert!(Digest::zero().is_zero());
        assert!(!Digest::of(b"x").is_zero());
    }

    #[test]
    fn hex_roundtrip_with_and_without_prefix() {
        let d = Digest::of(b"test");
        assert_eq!(Digest::from_hex(&d.to_hex()).unwrap(), d);
        assert_eq!(Digest::from_hex(&d.to_prefixed_hex()).unwrap(), d);
        assert_eq!(d.to_prefixed_hex().parse::<Digest>().unwrap(), d);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = Digest::from_hex("0xabcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            Digest::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn display_is_prefixed_hex() {
        let d = Digest::of(b"test");
        let shown = format!("{d}");
        assert!(shown.starts_with("0x"));
        assert_eq!(shown.len(), 66);
    }

    #[test]
    fn serializes_as_hex_string() {
        let d = Digest::from_hash([0xab; 32]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
        let parsed: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn flipped_bit_changes_exactly_one_bit() {
        let d = Digest::from_hash([0u8; 32]);
        let flipped = d.with_flipped_bit(9);
        assert_ne!(d, flipped);
        assert_eq!(flipped.as_bytes()[1], 0b10);
        assert_eq!(flipped.with_flipped_bit(9), d);
    }
}
