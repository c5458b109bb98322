//! ABI encoding of intents and domain bindings, and Keccak-256 digest derivation.
//!
//! `encode_intent` must be byte-identical to Solidity's `abi.encode(to, value, data)`: the
//! executor contract hashes exactly that as its own replay key.

use alloy_primitives::{keccak256, Address, U256};
use treasury_intent_types::{
    normalize_intent, DomainBinding, IntentDigest, RawIntent, TreasuryIntent, ValidationError,
};

const WORD: usize = 32;

fn address_word(address: Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..32].copy_from_slice(address.as_slice());
    word
}

/// `abi.encode(address to, uint256 value, bytes data)`.
///
/// Layout:
/// - word 0: `to`, left-padded
/// - word 1: `value`
/// - word 2: offset of the `data` tail (always 0x60)
/// - word 3: `data.length`
/// - `data`, right-padded to a word boundary
pub fn encode_intent(intent: &TreasuryIntent) -> Vec<u8> {
    let data = intent.data();
    let padded_len = data.len().div_ceil(WORD) * WORD;

    let mut buf = Vec::with_capacity(WORD * 4 + padded_len);
    buf.extend_from_slice(&address_word(intent.to()));
    buf.extend_from_slice(&intent.value().to_be_bytes::<32>());
    buf.extend_from_slice(&U256::from(WORD * 3).to_be_bytes::<32>());
    buf.extend_from_slice(&U256::from(data.len()).to_be_bytes::<32>());
    buf.extend_from_slice(data);
    buf.resize(WORD * 4 + padded_len, 0);
    buf
}

/// `abi.encode(bytes4 selector, uint256 chainId, address contract, uint32 version)`, with the
/// selector word dropped when `include_selector` is false.
pub fn encode_domain(binding: &DomainBinding) -> Vec<u8> {
    let mut buf = Vec::with_capacity(WORD * 4);

    if binding.include_selector {
        // bytesN are left-aligned in their word.
        let mut selector_word = [0u8; WORD];
        selector_word[..4].copy_from_slice(binding.function_selector.as_slice());
        buf.extend_from_slice(&selector_word);
    }

    buf.extend_from_slice(&binding.chain_id.to_be_bytes::<32>());
    buf.extend_from_slice(&address_word(binding.contract_address));

    let mut version_word = [0u8; WORD];
    version_word[28..32].copy_from_slice(&binding.version.to_be_bytes());
    buf.extend_from_slice(&version_word);

    buf
}

/// Digest guardians sign.
///
/// Without a domain this is `keccak256(abi.encode(to, value, data))`, the value the contract
/// recomputes on its own. With a domain: `keccak256(encode_domain(d) || encode_intent(i))`.
pub fn digest(intent: &TreasuryIntent, domain: Option<&DomainBinding>) -> IntentDigest {
    let encoded_intent = encode_intent(intent);
    let hash = match domain {
        None => keccak256(&encoded_intent),
        Some(binding) => {
            let mut buf = encode_domain(binding);
            buf.extend_from_slice(&encoded_intent);
            keccak256(&buf)
        }
    };
    IntentDigest::new(hash)
}

/// Normalise raw input and derive its digest in one step.
pub fn digest_treasury_intent(
    raw: RawIntent,
    domain: Option<&DomainBinding>,
) -> Result<(TreasuryIntent, IntentDigest), ValidationError> {
    let intent = normalize_intent(raw)?;
    let digest = digest(&intent, domain);
    Ok((intent, digest))
}
