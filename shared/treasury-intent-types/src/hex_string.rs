//! `0x`-prefixed hex strings.

use core::fmt;

use crate::errors::ValidationError;

/// A validated, lower-cased `0x`-prefixed hex string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HexString(String);

impl HexString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits after the `0x` prefix.
    pub fn digits(&self) -> &str {
        &self.0[2..]
    }

    /// Decode into bytes. Fails on an odd digit count.
    pub fn to_bytes(&self, field: &'static str) -> Result<Vec<u8>, ValidationError> {
        if self.digits().len() % 2 != 0 {
            return Err(ValidationError::OddHexLength { field });
        }
        hex::decode(self.digits()).map_err(|_| ValidationError::NotHex {
            field,
            value: self.0.clone(),
        })
    }
}

impl fmt::Display for HexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HexString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Require `value` to be `0x` followed only by hex digits (an empty payload is allowed).
pub fn ensure_hex(value: &str) -> Result<HexString, ValidationError> {
    ensure_hex_field("value", value)
}

pub(crate) fn ensure_hex_field(
    field: &'static str,
    value: &str,
) -> Result<HexString, ValidationError> {
    let not_hex = || ValidationError::NotHex {
        field,
        value: value.to_string(),
    };
    let digits = value.strip_prefix("0x").ok_or_else(not_hex)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(not_hex());
    }
    Ok(HexString(format!("0x{}", digits.to_ascii_lowercase())))
}
