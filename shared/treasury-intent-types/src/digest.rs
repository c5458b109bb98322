//! 32-byte intent digests and their lower-case hex form of record.

use core::{fmt, str::FromStr};

use alloy_primitives::B256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ValidationError;

/// Keccak-256 digest of an encoded intent, optionally domain-bound.
///
/// Two digests are equal iff their bytes are equal; the hex form of record is `0x` + lower-case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntentDigest(B256);

impl IntentDigest {
    pub const fn new(bytes: B256) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }

    /// `0x` + 64 lower-case hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0.as_slice()))
    }

    /// Case-insensitive comparison against a hex string (with or without `0x`).
    pub fn matches_hex(&self, other: &str) -> bool {
        normalize_digest_hex(other) == self.to_hex()
    }
}

impl From<B256> for IntentDigest {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl fmt::Display for IntentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for IntentDigest {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_digest_hex(s);
        let digits = &normalized[2..];
        if digits.len() != 64 {
            return Err(ValidationError::InvalidDigest(s.to_string()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|_| ValidationError::InvalidDigest(s.to_string()))?;
        Ok(Self(B256::from(out)))
    }
}

impl Serialize for IntentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IntentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Trim, lower-case and `0x`-prefix a digest string. Used as the ledger and comparison key.
pub fn normalize_digest_hex(digest: &str) -> String {
    let lowered = digest.trim().to_ascii_lowercase();
    match lowered.strip_prefix("0x") {
        Some(_) => lowered,
        None => format!("0x{lowered}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0xF3AE5FED19CD9E0FCCBDF564A664F370C1FE0255AD0934995819524BFFA212C9";

    #[test]
    fn test_parse_and_display_lowercase() {
        let digest: IntentDigest = HEX.parse().expect("valid digest");
        assert_eq!(digest.to_string(), HEX.to_ascii_lowercase());
        assert!(digest.matches_hex(HEX));
        assert!(digest.matches_hex(&HEX[2..]));
    }

    #[test]
    fn test_rejects_short_or_non_hex() {
        assert!("0x1234".parse::<IntentDigest>().is_err());
        let bad = format!("0x{}", "zz".repeat(32));
        assert!(bad.parse::<IntentDigest>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let digest: IntentDigest = HEX.parse().expect("valid digest");
        let json = serde_json::to_string(&digest).expect("serialize");
        assert_eq!(json, format!("\"{}\"", HEX.to_ascii_lowercase()));
        let back: IntentDigest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, digest);
    }
}
