//! Treasury intent value type and normalisation of loosely-typed input.

use alloy_primitives::{Address, Bytes, U256};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

use crate::{errors::ValidationError, hex_string::ensure_hex_field};

const ADDRESS_LEN: usize = 20;

/// The call a treasury is asked to make: `executeTransaction(to, value, data)`.
///
/// Immutable once constructed; one per authorization round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreasuryIntent {
    to: Address,
    value: U256,
    data: Bytes,
}

impl TreasuryIntent {
    pub fn new(to: Address, value: U256, data: Bytes) -> Self {
        Self { to, value, data }
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Intent amount as supplied by a caller: a native integer or a decimal / `0x` string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentValue {
    Native(U256),
    Text(String),
}

impl IntentValue {
    /// Resolve to a 256-bit integer, parsing text as decimal or `0x` hex.
    pub fn into_u256(self) -> Result<U256, ValidationError> {
        match self {
            IntentValue::Native(v) => Ok(v),
            IntentValue::Text(s) => parse_u256(&s),
        }
    }
}

impl From<U256> for IntentValue {
    fn from(value: U256) -> Self {
        IntentValue::Native(value)
    }
}

impl From<u64> for IntentValue {
    fn from(value: u64) -> Self {
        IntentValue::Native(U256::from(value))
    }
}

impl From<u128> for IntentValue {
    fn from(value: u128) -> Self {
        IntentValue::Native(U256::from(value))
    }
}

impl From<&str> for IntentValue {
    fn from(value: &str) -> Self {
        IntentValue::Text(value.to_string())
    }
}

impl<'de> Deserialize<'de> for IntentValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(number) => {
                if let Some(v) = number.as_u64() {
                    return Ok(IntentValue::Native(U256::from(v)));
                }
                // Exact digits are kept for integers wider than u64.
                let digits = number.to_string();
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(de::Error::custom(format!(
                        "value {digits} is not a non-negative integer"
                    )));
                }
                U256::from_str_radix(&digits, 10)
                    .map(IntentValue::Native)
                    .map_err(|_| de::Error::custom(format!("value {digits} exceeds 256 bits")))
            }
            Value::String(text) => Ok(IntentValue::Text(text)),
            other => Err(de::Error::custom(format!(
                "value must be an integer or a string, got {other}"
            ))),
        }
    }
}

/// Unvalidated intent fields, e.g. straight from a JSON request file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawIntent {
    pub to: Option<String>,
    pub value: Option<IntentValue>,
    pub data: Option<String>,
}

impl RawIntent {
    pub fn new(to: &str, value: impl Into<IntentValue>, data: Option<&str>) -> Self {
        Self {
            to: Some(to.to_string()),
            value: Some(value.into()),
            data: data.map(str::to_string),
        }
    }
}

/// Validate raw input into a [`TreasuryIntent`].
///
/// - `to` must be `0x` hex of exactly 20 bytes.
/// - `value` must be present; strings are parsed as decimal, or hex with a `0x` prefix.
/// - `data` defaults to empty and otherwise must be `0x` hex.
pub fn normalize_intent(raw: RawIntent) -> Result<TreasuryIntent, ValidationError> {
    let to_raw = raw.to.ok_or(ValidationError::MissingField("to"))?;
    let to_bytes = ensure_hex_field("to", to_raw.trim())?.to_bytes("to")?;
    if to_bytes.len() != ADDRESS_LEN {
        return Err(ValidationError::AddressLength(to_bytes.len()));
    }
    let to = Address::from_slice(&to_bytes);

    let value = raw
        .value
        .ok_or(ValidationError::MissingField("value"))?
        .into_u256()?;

    let data = match raw.data {
        Some(data) => Bytes::from(ensure_hex_field("data", data.trim())?.to_bytes("data")?),
        None => Bytes::new(),
    };

    Ok(TreasuryIntent::new(to, value, data))
}

fn parse_u256(text: &str) -> Result<U256, ValidationError> {
    let trimmed = text.trim();
    let invalid = || ValidationError::InvalidValue(text.to_string());
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(digits) if !digits.is_empty() => U256::from_str_radix(digits, 16),
        Some(_) => return Err(invalid()),
        None if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) => {
            U256::from_str_radix(trimmed, 10)
        }
        None => return Err(invalid()),
    };
    parsed.map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TO: &str = "0x00000000000000000000000000000000000000cc";

    #[test]
    fn test_normalize_defaults_data_to_empty() {
        let intent = normalize_intent(RawIntent::new(TO, 5u64, None)).expect("valid intent");
        assert_eq!(intent.value(), U256::from(5u64));
        assert!(intent.data().is_empty());
        assert_eq!(intent.to().as_slice()[19], 0xcc);
    }

    #[test]
    fn test_normalize_accepts_decimal_and_hex_strings() {
        let dec = normalize_intent(RawIntent::new(TO, "10000000000000000", Some("0x12345678")))
            .expect("decimal value");
        let hex = normalize_intent(RawIntent::new(TO, "0x2386f26fc10000", Some("0x12345678")))
            .expect("hex value");
        assert_eq!(dec, hex);
        assert_eq!(dec.data().as_ref(), &[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_normalize_rejects_bad_inputs() {
        let missing_to = RawIntent {
            value: Some(1u64.into()),
            ..RawIntent::default()
        };
        assert_eq!(normalize_intent(missing_to), Err(ValidationError::MissingField("to")));

        let missing_value = RawIntent {
            to: Some(TO.into()),
            ..RawIntent::default()
        };
        assert_eq!(
            normalize_intent(missing_value),
            Err(ValidationError::MissingField("value"))
        );

        assert_eq!(
            normalize_intent(RawIntent::new("0x00cc", 1u64, None)),
            Err(ValidationError::AddressLength(2))
        );
        assert!(matches!(
            normalize_intent(RawIntent::new(&TO[2..], 1u64, None)),
            Err(ValidationError::NotHex { field: "to", .. })
        ));
        assert!(matches!(
            normalize_intent(RawIntent::new(TO, "-1", None)),
            Err(ValidationError::InvalidValue(_))
        ));
        assert!(matches!(
            normalize_intent(RawIntent::new(TO, 1u64, Some("1234"))),
            Err(ValidationError::NotHex { field: "data", .. })
        ));
    }

    #[test]
    fn test_raw_intent_from_json() {
        let raw: RawIntent = serde_json::from_str(&format!(
            r#"{{"to":"{TO}","value":1000,"data":"0xabcd"}}"#
        ))
        .expect("json");
        let intent = normalize_intent(raw).expect("valid");
        assert_eq!(intent.value(), U256::from(1000u64));

        let raw: RawIntent =
            serde_json::from_str(&format!(r#"{{"to":"{TO}","value":"0x10"}}"#)).expect("json");
        assert_eq!(normalize_intent(raw).expect("valid").value(), U256::from(16u64));
    }

    #[test]
    fn test_raw_intent_json_integers_wider_than_u64() {
        let raw: RawIntent = serde_json::from_str(&format!(
            r#"{{"to":"{TO}","value":100000000000000000000}}"#
        ))
        .expect("json");
        assert_eq!(
            normalize_intent(raw).expect("valid").value(),
            U256::from(100_000_000_000_000_000_000u128)
        );

        let max = U256::MAX.to_string();
        let raw: RawIntent =
            serde_json::from_str(&format!(r#"{{"to":"{TO}","value":{max}}}"#)).expect("json");
        assert_eq!(normalize_intent(raw).expect("valid").value(), U256::MAX);

        // 2^256
        let overflow = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        let json = format!(r#"{{"to":"{TO}","value":{overflow}}}"#);
        assert!(serde_json::from_str::<RawIntent>(&json).is_err());
        for bad in ["-1", "1.5", "1e20", "true"] {
            let json = format!(r#"{{"to":"{TO}","value":{bad}}}"#);
            assert!(serde_json::from_str::<RawIntent>(&json).is_err(), "{bad} accepted");
        }
    }
}
