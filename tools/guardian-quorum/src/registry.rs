//! Guardian registry: the identities allowed to approve intents.
//!
//! Built once per aggregation session and read-only afterwards. Two indexes (by id, by public
//! key) back the lookups. A public key may belong to exactly one active guardian, otherwise one
//! physical key could be counted twice toward a threshold.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    envelope::SignedIntentEnvelope,
    errors::ConfigurationError,
    keys::{decode_key_string, KeyEncoding},
    pq::{is_supported_parameter_set, DEFAULT_PARAMETER_SET},
    util::serialize_hex,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianRecord {
    pub id: String,
    #[serde(serialize_with = "serialize_hex")]
    pub public_key: Vec<u8>,
    pub parameter_set: u8,
    /// Advisory only; threshold math counts approvals, not weight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    pub revoked: bool,
}

/// A guardian entry as written in the registry JSON file.
///
/// `publicKey` is `0x` hex or base64.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianRecordConfig {
    pub id: Option<String>,
    pub public_key: Option<String>,
    pub parameter_set: Option<u8>,
    pub weight: Option<f64>,
    pub revoked: Option<bool>,
}

impl GuardianRecordConfig {
    fn into_record(self, index: usize) -> Result<GuardianRecord, ConfigurationError> {
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ConfigurationError::MissingField { index, field: "id" })?;
        let public_key = self
            .public_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigurationError::MissingField {
                index,
                field: "publicKey",
            })?;
        let public_key = decode_key_string(
            &public_key,
            KeyEncoding::Auto,
            &format!("public key of guardian `{id}`"),
        )
        .map_err(|source| ConfigurationError::PublicKey {
            id: id.clone(),
            source,
        })?;

        Ok(GuardianRecord {
            id,
            public_key,
            parameter_set: self.parameter_set.unwrap_or(DEFAULT_PARAMETER_SET),
            weight: self.weight,
            revoked: self.revoked.unwrap_or(false),
        })
    }
}

#[derive(Clone, Debug)]
pub struct GuardianRegistry {
    records: Vec<GuardianRecord>,
    by_id: HashMap<String, usize>,
    by_public_key: HashMap<Vec<u8>, usize>,
}

impl GuardianRegistry {
    /// Validate and index `records`. Revoked records are dropped, not rejected.
    pub fn new(records: Vec<GuardianRecord>) -> Result<Self, ConfigurationError> {
        let mut active = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            if record.id.trim().is_empty() {
                return Err(ConfigurationError::MissingField { index, field: "id" });
            }
            if record.public_key.is_empty() {
                return Err(ConfigurationError::MissingField {
                    index,
                    field: "publicKey",
                });
            }
            if !is_supported_parameter_set(record.parameter_set) {
                return Err(ConfigurationError::InvalidParameterSet {
                    id: record.id,
                    parameter_set: record.parameter_set,
                });
            }
            if !record.revoked {
                active.push(record);
            }
        }

        let mut by_id = HashMap::with_capacity(active.len());
        let mut by_public_key: HashMap<Vec<u8>, usize> = HashMap::with_capacity(active.len());
        for (index, record) in active.iter().enumerate() {
            if by_id.insert(record.id.clone(), index).is_some() {
                return Err(ConfigurationError::DuplicateId(record.id.clone()));
            }
            if let Some(first) = by_public_key.insert(record.public_key.clone(), index) {
                return Err(ConfigurationError::DuplicatePublicKey {
                    first: active[first].id.clone(),
                    second: record.id.clone(),
                });
            }
        }

        tracing::debug!(guardians = active.len(), "guardian registry loaded");
        Ok(Self {
            records: active,
            by_id,
            by_public_key,
        })
    }

    pub fn from_config_records(
        records: Vec<GuardianRecordConfig>,
    ) -> Result<Self, ConfigurationError> {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| record.into_record(index))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(records)
    }

    /// Load a JSON array of guardian records.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<GuardianRecordConfig> =
            serde_json::from_str(&raw).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_config_records(records)
    }

    pub fn has(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&GuardianRecord> {
        self.by_id.get(id).map(|&index| &self.records[index])
    }

    /// Resolve the guardian behind an envelope.
    ///
    /// A stated `guardianId` must also carry that guardian's registered key, otherwise the
    /// envelope is treated as unknown. Without an id the public key alone decides.
    pub fn find_by_envelope(&self, envelope: &SignedIntentEnvelope) -> Option<&GuardianRecord> {
        match envelope.guardian_id().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self
                .get(id)
                .filter(|record| record.public_key == envelope.public_key),
            None => self
                .by_public_key
                .get(&envelope.public_key)
                .map(|&index| &self.records[index]),
        }
    }

    /// Active guardians, in registry file order.
    pub fn list(&self) -> Vec<GuardianRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeMetadata;

    fn record(id: &str, key: &[u8]) -> GuardianRecord {
        GuardianRecord {
            id: id.to_string(),
            public_key: key.to_vec(),
            parameter_set: 2,
            weight: None,
            revoked: false,
        }
    }

    fn envelope(key: &[u8], guardian_id: Option<&str>) -> SignedIntentEnvelope {
        SignedIntentEnvelope {
            parameter_set: 2,
            digest: String::new(),
            public_key: key.to_vec(),
            signature: vec![],
            metadata: guardian_id.map(|id| EnvelopeMetadata {
                guardian_id: Some(id.to_string()),
                ..EnvelopeMetadata::default()
            }),
        }
    }

    #[test]
    fn test_rejects_duplicates_and_missing_fields() {
        assert!(matches!(
            GuardianRegistry::new(vec![record("a", &[1]), record("a", &[2])]),
            Err(ConfigurationError::DuplicateId(id)) if id == "a"
        ));
        assert!(matches!(
            GuardianRegistry::new(vec![record("a", &[1]), record("b", &[1])]),
            Err(ConfigurationError::DuplicatePublicKey { .. })
        ));
        assert!(matches!(
            GuardianRegistry::new(vec![record("a", &[])]),
            Err(ConfigurationError::MissingField { field: "publicKey", .. })
        ));
        assert!(matches!(
            GuardianRegistry::new(vec![record(" ", &[1])]),
            Err(ConfigurationError::MissingField { field: "id", .. })
        ));
        let mut bad = record("a", &[1]);
        bad.parameter_set = 9;
        assert!(matches!(
            GuardianRegistry::new(vec![bad]),
            Err(ConfigurationError::InvalidParameterSet { .. })
        ));
    }

    #[test]
    fn test_revoked_records_are_excluded() {
        let mut revoked = record("old", &[1]);
        revoked.revoked = true;
        let registry =
            GuardianRegistry::new(vec![revoked, record("new", &[1]), record("b", &[2])])
                .expect("revoked key may be reissued");
        assert!(!registry.has("old"));
        assert!(registry.has("new"));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.list().iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["new", "b"]
        );
    }

    #[test]
    fn test_find_by_envelope() {
        let registry =
            GuardianRegistry::new(vec![record("alice", &[1, 1]), record("bob", &[2, 2])])
                .expect("registry");

        assert_eq!(
            registry.find_by_envelope(&envelope(&[2, 2], None)).map(|r| r.id.as_str()),
            Some("bob")
        );
        assert_eq!(
            registry
                .find_by_envelope(&envelope(&[1, 1], Some("alice")))
                .map(|r| r.id.as_str()),
            Some("alice")
        );
        // Claimed id with someone else's key is never trusted.
        assert!(registry.find_by_envelope(&envelope(&[2, 2], Some("alice"))).is_none());
        assert!(registry.find_by_envelope(&envelope(&[9], None)).is_none());
        assert!(registry.find_by_envelope(&envelope(&[1, 1], Some("carol"))).is_none());
    }

    #[test]
    fn test_from_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("guardians.json");
        fs::write(
            &path,
            r#"[
                {"id": "alice", "publicKey": "0x0101", "parameterSet": 0, "weight": 2.5},
                {"id": "bob", "publicKey": " AgI= "},
                {"id": "carol", "publicKey": "0x0303", "revoked": true}
            ]"#,
        )
        .expect("write registry");

        let registry = GuardianRegistry::from_config_file(&path).expect("registry");
        assert_eq!(registry.len(), 2);
        let alice = registry.get("alice").expect("alice");
        assert_eq!(alice.public_key, vec![1, 1]);
        assert_eq!(alice.parameter_set, 0);
        assert_eq!(alice.weight, Some(2.5));
        let bob = registry.get("bob").expect("bob");
        assert_eq!(bob.public_key, vec![2, 2]);
        assert_eq!(bob.parameter_set, DEFAULT_PARAMETER_SET);

        fs::write(&path, r#"[{"id": "x"}]"#).expect("write");
        assert!(matches!(
            GuardianRegistry::from_config_file(&path),
            Err(ConfigurationError::MissingField { index: 0, field: "publicKey" })
        ));
        fs::write(&path, "{not json").expect("write");
        assert!(matches!(
            GuardianRegistry::from_config_file(&path),
            Err(ConfigurationError::Parse { .. })
        ));
    }
}
