//! Error types for signing, registry/config loading, the ledger and envelope collection.
//!
//! Per-envelope verification problems are not errors: they surface as [`RejectionReason`]s in
//! the aggregation report so one bad envelope never aborts evaluation of the rest.

use std::path::PathBuf;

use thiserror::Error;

pub use treasury_intent_types::ValidationError;

/// Key material could not be loaded or decoded.
#[derive(Debug, Error)]
pub enum KeyMaterialError {
    #[error("{description} is empty")]
    Empty { description: String },
    #[error("{description} hex has an odd number of digits")]
    OddHexLength { description: String },
    #[error("{description} is not valid hex: {source}")]
    Hex {
        description: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("{description} is not valid base64: {source}")]
    Base64 {
        description: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("failed reading {description} from {path}: {source}")]
    Io {
        description: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Signing, key generation or envelope encoding/decoding failed.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("unsupported parameter set {0} (expected 0..=3)")]
    UnsupportedParameterSet(u8),
    #[error("{what} length for parameter set {parameter_set}: expected {expected}, got {actual}")]
    KeyLength {
        what: &'static str,
        parameter_set: u8,
        expected: usize,
        actual: usize,
    },
    #[error("public key does not belong to the supplied private key")]
    KeyPairMismatch,
    #[error("ML-DSA operation failed: {0}")]
    Backend(&'static str),
    #[error("unsupported envelope algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u64),
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("CBOR encoding failed: {0}")]
    CborEncode(String),
    #[error("CBOR decoding failed: {0}")]
    CborDecode(String),
    #[error("JSON envelope error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed writing envelope file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Guardian registry or quorum configuration is unusable. Fatal to the session.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("guardian record #{index} is missing `{field}`")]
    MissingField {
        index: usize,
        field: &'static str,
    },
    #[error("duplicate guardian id `{0}`")]
    DuplicateId(String),
    #[error("guardians `{first}` and `{second}` share the same public key")]
    DuplicatePublicKey { first: String, second: String },
    #[error("guardian `{id}` declares unsupported parameter set {parameter_set}")]
    InvalidParameterSet { id: String, parameter_set: u8 },
    #[error("guardian `{id}` public key: {source}")]
    PublicKey {
        id: String,
        #[source]
        source: KeyMaterialError,
    },
    #[error("invalid configuration value `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Replay ledger persistence failure.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("intent {0} is already recorded as executed")]
    AlreadyExecuted(String),
    #[error("ledger {path} is not a valid ledger document: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed serialising ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The envelope directory itself could not be listed.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed listing envelope directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of one authorization round.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Collector(#[from] CollectorError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("failed opening audit log {path}: {source}")]
    AuditLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("intent {digest} has {approvals} of {threshold} required approvals")]
    ThresholdNotMet {
        digest: String,
        approvals: usize,
        threshold: usize,
    },
    #[error("intent {0} was already executed")]
    ReplayDetected(String),
}

/// Why a single envelope did not count toward the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("Unknown guardian")]
    UnknownGuardian,
    #[error("Parameter set mismatch")]
    ParameterSetMismatch,
    #[error("Duplicate guardian signature")]
    DuplicateGuardian,
    #[error("Missing digest")]
    MissingDigest,
    #[error("Digest mismatch")]
    DigestMismatch,
    #[error("Malformed digest")]
    MalformedDigest,
    #[error("Missing signature")]
    MissingSignature,
    #[error("Missing public key")]
    MissingPublicKey,
    #[error("Unsupported parameter set")]
    UnsupportedParameterSet,
    #[error("Signature verification failed")]
    SignatureInvalid,
}

impl serde::Serialize for RejectionReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
