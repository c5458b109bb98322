//! Signed intent envelopes: ML-DSA signatures over an intent digest, portable as CBOR or JSON.
//!
//! Wire shape (both encodings):
//! - `version`: always 1
//! - `algorithm`: always `"dilithium"`
//! - `parameterSet`: 0..=3
//! - `digest`: lower-case `0x` hex text
//! - `publicKey`, `signature`: CBOR byte strings / `0x` hex strings in JSON
//! - `metadata` (optional): `{ guardianId?, issuedAt?, note? }`

use std::collections::HashSet;

use alloy_primitives::B256;
use ciborium::value::{Integer, Value};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use treasury_intent_types::{DomainBinding, IntentDigest, RawIntent, TreasuryIntent};

use crate::{
    digest::digest_treasury_intent,
    errors::{EnvelopeError, RejectionReason},
    keys::{EnvelopeOutputPlan, KeyEncoding},
    pq::{self, GuardianKeyPair, MlDsaLevel, DEFAULT_PARAMETER_SET},
    util::write_atomic,
};

pub const ENVELOPE_VERSION: u64 = 1;
pub const ENVELOPE_ALGORITHM: &str = "dilithium";

/// Free-text context a guardian attaches to a signature.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_id: Option<String>,
    /// RFC 3339 / ISO-8601 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl EnvelopeMetadata {
    /// Metadata for `guardian_id`, stamped with the current UTC time.
    pub fn issued_now(guardian_id: &str) -> Self {
        Self {
            guardian_id: Some(guardian_id.to_string()),
            issued_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
            note: None,
        }
    }
}

/// One guardian's signature over one digest. Version and algorithm are fixed literals that are
/// written on encode and enforced on decode.
///
/// Empty `digest`, `public_key` or `signature` model fields absent from the wire; they are
/// reported by [`verify_signed_envelope`] rather than rejected at decode time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedIntentEnvelope {
    pub parameter_set: u8,
    pub digest: String,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub metadata: Option<EnvelopeMetadata>,
}

impl SignedIntentEnvelope {
    pub fn guardian_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.guardian_id.as_deref()
    }
}

impl Serialize for SignedIntentEnvelope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JsonEnvelope::from(self).serialize(serializer)
    }
}

/// Inputs for [`sign_intent_digest`]. Parameter set defaults to 2.
#[derive(Clone, Debug)]
pub struct SigningInput<'a> {
    pub digest: &'a IntentDigest,
    pub private_key: &'a [u8],
    pub public_key: &'a [u8],
    pub parameter_set: u8,
    pub metadata: Option<EnvelopeMetadata>,
}

impl<'a> SigningInput<'a> {
    pub fn new(digest: &'a IntentDigest, private_key: &'a [u8], public_key: &'a [u8]) -> Self {
        Self {
            digest,
            private_key,
            public_key,
            parameter_set: DEFAULT_PARAMETER_SET,
            metadata: None,
        }
    }

    pub fn from_key_pair(digest: &'a IntentDigest, keys: &'a GuardianKeyPair) -> Self {
        Self {
            parameter_set: keys.parameter_set,
            ..Self::new(digest, keys.private_key.as_bytes(), &keys.public_key)
        }
    }

    pub fn parameter_set(mut self, parameter_set: u8) -> Self {
        self.parameter_set = parameter_set;
        self
    }

    pub fn metadata(mut self, metadata: EnvelopeMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Sign the raw 32 digest bytes and wrap the signature in an envelope.
///
/// Fails if the public key is not the one derived from the private key.
pub fn sign_intent_digest(input: SigningInput<'_>) -> Result<SignedIntentEnvelope, EnvelopeError> {
    let level = MlDsaLevel::for_parameter_set(input.parameter_set)?;
    if input.public_key.len() != level.public_key_len() {
        return Err(EnvelopeError::KeyLength {
            what: "public key",
            parameter_set: input.parameter_set,
            expected: level.public_key_len(),
            actual: input.public_key.len(),
        });
    }
    let derived = pq::derive_public_key(input.parameter_set, input.private_key)?;
    if derived != input.public_key {
        return Err(EnvelopeError::KeyPairMismatch);
    }

    let signature = pq::sign(input.parameter_set, input.private_key, input.digest.as_bytes())?;
    tracing::debug!(
        digest = %input.digest,
        parameter_set = input.parameter_set,
        guardian = input.metadata.as_ref().and_then(|m| m.guardian_id.as_deref()).unwrap_or("-"),
        "signed intent digest"
    );

    Ok(SignedIntentEnvelope {
        parameter_set: input.parameter_set,
        digest: input.digest.to_hex(),
        public_key: input.public_key.to_vec(),
        signature,
        metadata: input.metadata,
    })
}

/// Normalise `raw`, derive its (optionally domain-bound) digest and sign it.
pub fn sign_intent_with_keys(
    raw: RawIntent,
    domain: Option<&DomainBinding>,
    keys: &GuardianKeyPair,
    metadata: Option<EnvelopeMetadata>,
) -> Result<(TreasuryIntent, SignedIntentEnvelope), EnvelopeError> {
    let (intent, digest) = digest_treasury_intent(raw, domain)?;
    let mut input = SigningInput::from_key_pair(&digest, keys);
    input.metadata = metadata;
    let envelope = sign_intent_digest(input)?;
    Ok((intent, envelope))
}

/// Outcome of [`verify_signed_envelope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid(RejectionReason),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }

    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            Verification::Valid => None,
            Verification::Invalid(reason) => Some(*reason),
        }
    }
}

/// Check an envelope, optionally against the digest the caller expects.
///
/// Structural preconditions are reported individually before any cryptography runs, so a
/// wiring problem (wrong digest, missing key) is distinguishable from a bad signature.
pub fn verify_signed_envelope(
    envelope: &SignedIntentEnvelope,
    expected_digest: Option<&IntentDigest>,
) -> Verification {
    use RejectionReason::*;

    if envelope.digest.trim().is_empty() {
        return Verification::Invalid(MissingDigest);
    }
    if let Some(expected) = expected_digest {
        if !expected.matches_hex(&envelope.digest) {
            return Verification::Invalid(DigestMismatch);
        }
    }
    if envelope.signature.is_empty() {
        return Verification::Invalid(MissingSignature);
    }
    if envelope.public_key.is_empty() {
        return Verification::Invalid(MissingPublicKey);
    }
    if !pq::is_supported_parameter_set(envelope.parameter_set) {
        return Verification::Invalid(UnsupportedParameterSet);
    }
    let Ok(digest) = envelope.digest.parse::<IntentDigest>() else {
        return Verification::Invalid(MalformedDigest);
    };

    if pq::verify(
        envelope.parameter_set,
        &envelope.public_key,
        digest.as_bytes(),
        &envelope.signature,
    ) {
        Verification::Valid
    } else {
        Verification::Invalid(SignatureInvalid)
    }
}

// --- CBOR ----------------------------------------------------------------------------------

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Encode with a fixed key order so identical envelopes produce identical bytes.
pub fn encode_envelope_to_cbor(envelope: &SignedIntentEnvelope) -> Result<Vec<u8>, EnvelopeError> {
    let mut entries = vec![
        (text("version"), Value::Integer(ENVELOPE_VERSION.into())),
        (text("algorithm"), text(ENVELOPE_ALGORITHM)),
        (text("parameterSet"), Value::Integer(envelope.parameter_set.into())),
        (text("digest"), text(&envelope.digest)),
        (text("publicKey"), Value::Bytes(envelope.public_key.clone())),
        (text("signature"), Value::Bytes(envelope.signature.clone())),
    ];
    if let Some(metadata) = &envelope.metadata {
        let mut fields = Vec::new();
        if let Some(id) = &metadata.guardian_id {
            fields.push((text("guardianId"), text(id)));
        }
        if let Some(issued_at) = &metadata.issued_at {
            fields.push((text("issuedAt"), text(issued_at)));
        }
        if let Some(note) = &metadata.note {
            fields.push((text("note"), text(note)));
        }
        entries.push((text("metadata"), Value::Map(fields)));
    }

    let mut out = Vec::new();
    ciborium::ser::into_writer(&Value::Map(entries), &mut out)
        .map_err(|e| EnvelopeError::CborEncode(e.to_string()))?;
    Ok(out)
}

/// Decode a CBOR envelope, rejecting anything that is not a version-1 `dilithium` envelope.
pub fn decode_envelope_from_cbor(bytes: &[u8]) -> Result<SignedIntentEnvelope, EnvelopeError> {
    let value: Value =
        ciborium::de::from_reader(bytes).map_err(|e| EnvelopeError::CborDecode(e.to_string()))?;
    let Value::Map(entries) = value else {
        return Err(EnvelopeError::Malformed("top-level CBOR item is not a map".into()));
    };

    let mut version = None;
    let mut algorithm = None;
    let mut parameter_set = None;
    let mut digest = String::new();
    let mut public_key = Vec::new();
    let mut signature = Vec::new();
    let mut metadata = None;

    let mut seen = HashSet::new();
    for (key, value) in entries {
        let Value::Text(key) = key else {
            continue;
        };
        if !seen.insert(key.clone()) {
            return Err(EnvelopeError::Malformed(format!("duplicate key `{key}`")));
        }
        match key.as_str() {
            "version" => version = Some(integer_field(&value, "version")?),
            "algorithm" => algorithm = Some(text_field(value, "algorithm")?),
            "parameterSet" => {
                let raw = integer_field(&value, "parameterSet")?;
                parameter_set = Some(u8::try_from(raw).map_err(|_| {
                    EnvelopeError::Malformed(format!("parameterSet {raw} out of range"))
                })?);
            }
            "digest" => digest = text_field(value, "digest")?,
            "publicKey" => public_key = bytes_field(value, "publicKey")?,
            "signature" => signature = bytes_field(value, "signature")?,
            "metadata" => metadata = metadata_field(value)?,
            _ => {}
        }
    }

    check_literals(version, algorithm.as_deref())?;
    let parameter_set =
        parameter_set.ok_or_else(|| EnvelopeError::Malformed("missing parameterSet".into()))?;

    Ok(SignedIntentEnvelope {
        parameter_set,
        digest,
        public_key,
        signature,
        metadata,
    })
}

fn check_literals(version: Option<u64>, algorithm: Option<&str>) -> Result<(), EnvelopeError> {
    match algorithm {
        Some(ENVELOPE_ALGORITHM) => {}
        Some(other) => return Err(EnvelopeError::UnsupportedAlgorithm(other.to_string())),
        None => return Err(EnvelopeError::Malformed("missing algorithm".into())),
    }
    match version {
        Some(ENVELOPE_VERSION) => Ok(()),
        Some(other) => Err(EnvelopeError::UnsupportedVersion(other)),
        None => Err(EnvelopeError::Malformed("missing version".into())),
    }
}

fn integer_field(value: &Value, name: &str) -> Result<u64, EnvelopeError> {
    value
        .as_integer()
        .and_then(|i: Integer| u64::try_from(i).ok())
        .ok_or_else(|| EnvelopeError::Malformed(format!("{name} is not an unsigned integer")))
}

fn text_field(value: Value, name: &str) -> Result<String, EnvelopeError> {
    match value {
        Value::Text(s) => Ok(s),
        Value::Bytes(b) if name == "digest" && b.len() == 32 => {
            Ok(IntentDigest::new(B256::from_slice(&b)).to_hex())
        }
        _ => Err(EnvelopeError::Malformed(format!("{name} is not a text string"))),
    }
}

fn bytes_field(value: Value, name: &str) -> Result<Vec<u8>, EnvelopeError> {
    match value {
        Value::Bytes(b) => Ok(b),
        Value::Text(s) => decode_text_bytes(&s, name),
        _ => Err(EnvelopeError::Malformed(format!("{name} is not a byte string"))),
    }
}

fn metadata_field(value: Value) -> Result<Option<EnvelopeMetadata>, EnvelopeError> {
    let entries = match value {
        Value::Null => return Ok(None),
        Value::Map(entries) => entries,
        _ => return Err(EnvelopeError::Malformed("metadata is not a map".into())),
    };
    let mut metadata = EnvelopeMetadata::default();
    let mut seen = HashSet::new();
    for (key, value) in entries {
        let Value::Text(key) = key else {
            continue;
        };
        if !seen.insert(key.clone()) {
            return Err(EnvelopeError::Malformed(format!("duplicate metadata key `{key}`")));
        }
        let slot = match key.as_str() {
            "guardianId" => &mut metadata.guardian_id,
            "issuedAt" => &mut metadata.issued_at,
            "note" => &mut metadata.note,
            _ => continue,
        };
        *slot = match value {
            Value::Null => None,
            Value::Text(text) => Some(text),
            _ => {
                return Err(EnvelopeError::Malformed(format!(
                    "metadata.{key} is not a text string"
                )))
            }
        };
    }
    Ok(Some(metadata))
}

fn decode_text_bytes(s: &str, name: &str) -> Result<Vec<u8>, EnvelopeError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    crate::keys::decode_key_string(s, KeyEncoding::Auto, name)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

// --- JSON ----------------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonEnvelope {
    version: u64,
    algorithm: String,
    parameter_set: u8,
    #[serde(default)]
    digest: String,
    #[serde(default)]
    public_key: String,
    #[serde(default)]
    signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<EnvelopeMetadata>,
}

impl From<&SignedIntentEnvelope> for JsonEnvelope {
    fn from(envelope: &SignedIntentEnvelope) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            algorithm: ENVELOPE_ALGORITHM.to_string(),
            parameter_set: envelope.parameter_set,
            digest: envelope.digest.clone(),
            public_key: format!("0x{}", hex::encode(&envelope.public_key)),
            signature: format!("0x{}", hex::encode(&envelope.signature)),
            metadata: envelope.metadata.clone(),
        }
    }
}

pub fn encode_envelope_to_json(envelope: &SignedIntentEnvelope) -> Result<String, EnvelopeError> {
    Ok(serde_json::to_string_pretty(&JsonEnvelope::from(envelope))?)
}

/// Decode a JSON envelope with the same version/algorithm allow-list as CBOR.
pub fn decode_envelope_from_json(bytes: &[u8]) -> Result<SignedIntentEnvelope, EnvelopeError> {
    let wire: JsonEnvelope = serde_json::from_slice(bytes)?;
    check_literals(Some(wire.version), Some(&wire.algorithm))?;
    Ok(SignedIntentEnvelope {
        parameter_set: wire.parameter_set,
        digest: wire.digest,
        public_key: decode_text_bytes(&wire.public_key, "publicKey")?,
        signature: decode_text_bytes(&wire.signature, "signature")?,
        metadata: wire.metadata,
    })
}

/// Write the envelope to the planned CBOR (and optional JSON) paths.
pub fn write_envelope_outputs(
    plan: &EnvelopeOutputPlan,
    envelope: &SignedIntentEnvelope,
) -> Result<(), EnvelopeError> {
    let cbor = encode_envelope_to_cbor(envelope)?;
    write_atomic(&plan.cbor_path, &cbor).map_err(|source| EnvelopeError::Io {
        path: plan.cbor_path.clone(),
        source,
    })?;
    if let Some(json_path) = &plan.json_path {
        let json = encode_envelope_to_json(envelope)?;
        write_atomic(json_path, json.as_bytes()).map_err(|source| EnvelopeError::Io {
            path: json_path.clone(),
            source,
        })?;
    }
    Ok(())
}
