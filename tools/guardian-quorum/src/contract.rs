//! Boundary with the on-chain executor contract.
//!
//! The contract takes `(to, value, data)` unchanged from the normalized intent and keys its own
//! replay guard on `keccak256(abi.encode(to, value, data))`, i.e. the domain-free digest.

use alloy_sol_types::{sol, SolCall};
use treasury_intent_types::{IntentDigest, TreasuryIntent};

use crate::digest::digest;

sol! {
    interface ITreasuryExecutor {
        function executeTransaction(address to, uint256 value, bytes data) external;
    }
}

/// Calldata for `executeTransaction(intent.to, intent.value, intent.data)`.
pub fn encode_execute_call(intent: &TreasuryIntent) -> Vec<u8> {
    ITreasuryExecutor::executeTransactionCall {
        to: intent.to(),
        value: intent.value(),
        data: intent.data().clone(),
    }
    .abi_encode()
}

/// Recover the intent from `executeTransaction` calldata, e.g. to audit a broadcast transaction.
pub fn decode_execute_call(calldata: &[u8]) -> alloy_sol_types::Result<TreasuryIntent> {
    let call = ITreasuryExecutor::executeTransactionCall::abi_decode(calldata, true)?;
    Ok(TreasuryIntent::new(call.to, call.value, call.data))
}

/// The digest the contract recomputes for its own replay guard.
pub fn on_chain_digest(intent: &TreasuryIntent) -> IntentDigest {
    digest(intent, None)
}
