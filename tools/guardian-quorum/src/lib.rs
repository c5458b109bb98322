//! Guardian quorum authorization for treasury intents.
//!
//! Guardians sign a domain-bound Keccak-256 digest of an intent with ML-DSA (Dilithium). The
//! resulting envelopes are collected, verified against a guardian registry and counted toward a
//! threshold; a file-backed ledger refuses any digest that already executed.

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod contract;
pub mod digest;
pub mod envelope;
pub mod errors;
pub mod execution_log;
pub mod keys;
pub mod ledger;
pub mod pq;
pub mod registry;
pub mod session;
pub mod util;

#[cfg(test)]
mod tests;

pub use aggregate::{
    aggregate_guardian_envelopes, canonical_order, AggregationOptions, AggregationReport,
    ExecutionCheck, ReplayStatus,
};
pub use collector::{load_envelopes_from_directory, CollectedEnvelopes, FileOutcome, FileReport};
pub use config::QuorumConfig;
pub use contract::{decode_execute_call, encode_execute_call, on_chain_digest};
pub use digest::{digest, digest_treasury_intent, encode_domain, encode_intent};
pub use envelope::{
    decode_envelope_from_cbor, decode_envelope_from_json, encode_envelope_to_cbor,
    encode_envelope_to_json, sign_intent_digest, sign_intent_with_keys, verify_signed_envelope,
    write_envelope_outputs, EnvelopeMetadata, SignedIntentEnvelope, SigningInput, Verification,
};
pub use errors::{
    CollectorError, ConfigurationError, EnvelopeError, KeyMaterialError, LedgerError,
    RejectionReason, SessionError,
};
pub use execution_log::{
    ExecutionEvent, ExecutionLogger, ExecutionSink, JsonLinesSink, LogContext, MultiSink,
    TracingSink,
};
pub use keys::{
    derive_envelope_basename, load_key_material, plan_envelope_outputs, EnvelopeOutputPlan,
    EnvelopeOutputRequest, KeyEncoding,
};
pub use ledger::{ExecutionMetadata, IntentExecutionRecord, IntentLedger, LockedLedger};
pub use pq::{generate_guardian_key_pair, GuardianKeyPair};
pub use registry::{GuardianRecord, GuardianRegistry};
pub use session::{Authorization, AuthorizationSession};
pub use treasury_intent_types::{
    normalize_intent, DomainBinding, IntentDigest, RawIntent, TreasuryIntent, ValidationError,
};
