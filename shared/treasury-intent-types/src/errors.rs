use thiserror::Error;

/// Malformed intent, hex or address input. The caller must fix the input; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("{field} must be 0x-prefixed hex, got `{value}`")]
    NotHex {
        field: &'static str,
        value: String,
    },
    #[error("{field} has an odd number of hex digits")]
    OddHexLength { field: &'static str },
    #[error("address must be exactly 20 bytes, got {0}")]
    AddressLength(usize),
    #[error("value `{0}` is not a non-negative 256-bit integer")]
    InvalidValue(String),
    #[error("digest must be 32 bytes of hex, got `{0}`")]
    InvalidDigest(String),
}
