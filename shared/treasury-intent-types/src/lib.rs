//! Shared types for treasury intents, domain bindings and intent digests.
//!
//! These are consumed by both the off-chain guardian tooling and anything that must agree with
//! the executor contract on how an intent is represented.

pub mod digest;
pub mod domain;
pub mod errors;
pub mod hex_string;
pub mod intent;

pub use digest::{normalize_digest_hex, IntentDigest};
pub use domain::{default_selector, function_selector, DomainBinding, DEFAULT_EXECUTE_SIGNATURE};
pub use errors::ValidationError;
pub use hex_string::{ensure_hex, HexString};
pub use intent::{normalize_intent, IntentValue, RawIntent, TreasuryIntent};
