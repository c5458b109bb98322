//! Domain binding: the chain/contract/function scope mixed into a guardian-signed digest.

use std::sync::OnceLock;

use alloy_primitives::{keccak256, Address, FixedBytes, U256};

/// Canonical entry point on the executor contract.
pub const DEFAULT_EXECUTE_SIGNATURE: &str = "executeTransaction(address,uint256,bytes)";

/// `bytes4(keccak256(signature))`.
pub fn function_selector(signature: &str) -> FixedBytes<4> {
    let hash = keccak256(signature.as_bytes());
    FixedBytes::from_slice(&hash[..4])
}

/// Selector of [`DEFAULT_EXECUTE_SIGNATURE`], computed once.
pub fn default_selector() -> FixedBytes<4> {
    static SELECTOR: OnceLock<FixedBytes<4>> = OnceLock::new();
    *SELECTOR.get_or_init(|| function_selector(DEFAULT_EXECUTE_SIGNATURE))
}

/// Scope of an approval. Only used to derive the digest guardians sign; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainBinding {
    pub chain_id: U256,
    pub contract_address: Address,
    pub version: u32,
    pub function_selector: FixedBytes<4>,
    pub include_selector: bool,
}

impl DomainBinding {
    /// Version 1, bound to the default `executeTransaction` selector.
    pub fn new(chain_id: U256, contract_address: Address) -> Self {
        Self {
            chain_id,
            contract_address,
            version: 1,
            function_selector: default_selector(),
            include_selector: true,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Bind to a different on-chain entry point.
    pub fn with_function_signature(mut self, signature: &str) -> Self {
        self.function_selector = function_selector(signature);
        self
    }

    pub fn without_selector(mut self) -> Self {
        self.include_selector = false;
        self
    }
}
