//! Quorum configuration document.
//!
//! ```json
//! {
//!   "chainId": 1,
//!   "contractAddress": "0x...",
//!   "threshold": 2,
//!   "registryPath": "guardians.json",
//!   "ledgerPath": "state/ledger.json",
//!   "envelopeDir": "envelopes",
//!   "auditLogPath": "state/execution.jsonl"
//! }
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_primitives::{Address, U256};
use serde::Deserialize;
use treasury_intent_types::{DomainBinding, IntentValue, DEFAULT_EXECUTE_SIGNATURE};

use crate::errors::ConfigurationError;

const DEFAULT_DOMAIN_VERSION: u32 = 1;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct QuorumConfigFile {
    chain_id: Option<IntentValue>,
    contract_address: Option<String>,
    domain_version: Option<u32>,
    function_signature: Option<String>,
    include_selector: Option<bool>,
    threshold: Option<usize>,
    registry_path: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    envelope_dir: Option<PathBuf>,
    audit_log_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumConfig {
    pub chain_id: U256,
    pub contract_address: Address,
    pub domain_version: u32,
    pub function_signature: String,
    pub include_selector: bool,
    pub threshold: usize,
    pub registry_path: PathBuf,
    pub ledger_path: PathBuf,
    pub envelope_dir: PathBuf,
    pub audit_log_path: Option<PathBuf>,
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ConfigurationError> {
    value.ok_or(ConfigurationError::InvalidValue {
        field,
        reason: "missing".into(),
    })
}

impl QuorumConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: QuorumConfigFile =
            serde_json::from_str(&contents).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_file(file, base_dir)
    }

    fn from_file(file: QuorumConfigFile, base_dir: &Path) -> Result<Self, ConfigurationError> {
        let chain_id = required(file.chain_id, "chainId")?
            .into_u256()
            .map_err(|e| ConfigurationError::InvalidValue {
                field: "chainId",
                reason: e.to_string(),
            })?;

        let address_text = required(file.contract_address, "contractAddress")?;
        let contract_address = Address::from_str(address_text.trim()).map_err(|e| {
            ConfigurationError::InvalidValue {
                field: "contractAddress",
                reason: e.to_string(),
            }
        })?;

        let function_signature = file
            .function_signature
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_EXECUTE_SIGNATURE.to_string());
        if function_signature.is_empty() {
            return Err(ConfigurationError::InvalidValue {
                field: "functionSignature",
                reason: "must not be empty".into(),
            });
        }

        let threshold = required(file.threshold, "threshold")?;
        if threshold == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "threshold",
                reason: "must be at least 1".into(),
            });
        }

        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                base_dir.join(p)
            }
        };
        Ok(Self {
            chain_id,
            contract_address,
            domain_version: file.domain_version.unwrap_or(DEFAULT_DOMAIN_VERSION),
            function_signature,
            include_selector: file.include_selector.unwrap_or(true),
            threshold,
            registry_path: resolve(required(file.registry_path, "registryPath")?),
            ledger_path: resolve(required(file.ledger_path, "ledgerPath")?),
            envelope_dir: resolve(required(file.envelope_dir, "envelopeDir")?),
            audit_log_path: file.audit_log_path.map(resolve),
        })
    }

    pub fn domain_binding(&self) -> DomainBinding {
        let binding = DomainBinding::new(self.chain_id, self.contract_address)
            .with_version(self.domain_version)
            .with_function_signature(&self.function_signature);
        if self.include_selector {
            binding
        } else {
            binding.without_selector()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treasury_intent_types::{default_selector, function_selector};

    fn write_config(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("quorum.json");
        fs::write(&path, json).expect("write config");
        path
    }

    #[test]
    fn test_defaults_and_relative_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"{
                "chainId": "0x2105",
                "contractAddress": "0x0000000000000000000000000000000000000ddd",
                "threshold": 2,
                "registryPath": "guardians.json",
                "ledgerPath": "state/ledger.json",
                "envelopeDir": "/var/envelopes"
            }"#,
        );

        let config = QuorumConfig::load(&path).expect("load");
        assert_eq!(config.chain_id, U256::from(8453u64));
        assert_eq!(config.domain_version, 1);
        assert!(config.include_selector);
        assert_eq!(config.registry_path, dir.path().join("guardians.json"));
        assert_eq!(config.ledger_path, dir.path().join("state/ledger.json"));
        assert_eq!(config.envelope_dir, PathBuf::from("/var/envelopes"));
        assert_eq!(config.audit_log_path, None);

        let binding = config.domain_binding();
        assert_eq!(binding.chain_id, U256::from(8453u64));
        assert_eq!(binding.version, 1);
        assert_eq!(binding.function_selector, default_selector());
        assert!(binding.include_selector);
    }

    #[test]
    fn test_explicit_domain_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"{
                "chainId": 10,
                "contractAddress": "0x0000000000000000000000000000000000000ddd",
                "domainVersion": 3,
                "functionSignature": "transfer(address,uint256)",
                "includeSelector": false,
                "threshold": 1,
                "registryPath": "r.json",
                "ledgerPath": "l.json",
                "envelopeDir": "env",
                "auditLogPath": "audit.jsonl"
            }"#,
        );
        let config = QuorumConfig::load(&path).expect("load");
        let binding = config.domain_binding();
        assert_eq!(binding.version, 3);
        assert_eq!(binding.function_selector, function_selector("transfer(address,uint256)"));
        assert!(!binding.include_selector);
        assert_eq!(config.audit_log_path, Some(dir.path().join("audit.jsonl")));
    }

    #[test]
    fn test_invalid_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = r#""contractAddress": "0x0000000000000000000000000000000000000ddd",
            "registryPath": "r.json", "ledgerPath": "l.json", "envelopeDir": "env""#;

        let zero = write_config(
            dir.path(),
            &format!(r#"{{"chainId": 1, "threshold": 0, {base}}}"#),
        );
        assert!(matches!(
            QuorumConfig::load(&zero),
            Err(ConfigurationError::InvalidValue { field: "threshold", .. })
        ));

        let no_chain = write_config(dir.path(), &format!(r#"{{"threshold": 1, {base}}}"#));
        assert!(matches!(
            QuorumConfig::load(&no_chain),
            Err(ConfigurationError::InvalidValue { field: "chainId", .. })
        ));

        let bad_chain =
            write_config(dir.path(), &format!(r#"{{"chainId": "one", "threshold": 1, {base}}}"#));
        assert!(matches!(
            QuorumConfig::load(&bad_chain),
            Err(ConfigurationError::InvalidValue { field: "chainId", .. })
        ));

        let unknown = write_config(
            dir.path(),
            &format!(r#"{{"chainId": 1, "threshold": 1, "quorum": 2, {base}}}"#),
        );
        assert!(matches!(QuorumConfig::load(&unknown), Err(ConfigurationError::Parse { .. })));
    }
}
