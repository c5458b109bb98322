//! ML-DSA (FIPS 204, standardised Dilithium) backend.
//!
//! Envelope parameter sets map onto ML-DSA levels:
//!
//! | parameter set | scheme    | public key | secret key | signature |
//! |---------------|-----------|------------|------------|-----------|
//! | 0, 1          | ML-DSA-44 | 1312       | 2560       | 2420      |
//! | 2 (default)   | ML-DSA-65 | 1952       | 4032       | 3309      |
//! | 3             | ML-DSA-87 | 2592       | 4896       | 4627      |
//!
//! Signing is hedged (randomised) with an empty context string, so two signatures over the same
//! digest differ byte-wise but both verify. Secret keys are never logged.

use core::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::EnvelopeError;

pub const MIN_PARAMETER_SET: u8 = 0;
pub const MAX_PARAMETER_SET: u8 = 3;
pub const DEFAULT_PARAMETER_SET: u8 = 2;

/// Concrete ML-DSA level behind a parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MlDsaLevel {
    MlDsa44,
    MlDsa65,
    MlDsa87,
}

impl MlDsaLevel {
    pub fn for_parameter_set(parameter_set: u8) -> Result<Self, EnvelopeError> {
        match parameter_set {
            0 | 1 => Ok(MlDsaLevel::MlDsa44),
            2 => Ok(MlDsaLevel::MlDsa65),
            3 => Ok(MlDsaLevel::MlDsa87),
            other => Err(EnvelopeError::UnsupportedParameterSet(other)),
        }
    }

    pub fn public_key_len(self) -> usize {
        match self {
            MlDsaLevel::MlDsa44 => fips204::ml_dsa_44::PK_LEN,
            MlDsaLevel::MlDsa65 => fips204::ml_dsa_65::PK_LEN,
            MlDsaLevel::MlDsa87 => fips204::ml_dsa_87::PK_LEN,
        }
    }

    pub fn secret_key_len(self) -> usize {
        match self {
            MlDsaLevel::MlDsa44 => fips204::ml_dsa_44::SK_LEN,
            MlDsaLevel::MlDsa65 => fips204::ml_dsa_65::SK_LEN,
            MlDsaLevel::MlDsa87 => fips204::ml_dsa_87::SK_LEN,
        }
    }

    pub fn signature_len(self) -> usize {
        match self {
            MlDsaLevel::MlDsa44 => fips204::ml_dsa_44::SIG_LEN,
            MlDsaLevel::MlDsa65 => fips204::ml_dsa_65::SIG_LEN,
            MlDsaLevel::MlDsa87 => fips204::ml_dsa_87::SIG_LEN,
        }
    }
}

pub fn is_supported_parameter_set(parameter_set: u8) -> bool {
    (MIN_PARAMETER_SET..=MAX_PARAMETER_SET).contains(&parameter_set)
}

// One set of byte-level helpers per fips204 parameter module.
macro_rules! ml_dsa_backend {
    ($name:ident, $module:ident) => {
        mod $name {
            use fips204::$module;
            use fips204::traits::{KeyGen, SerDes, Signer, Verifier};

            pub(super) fn keygen(
                seed: Option<&[u8; 32]>,
            ) -> Result<(Vec<u8>, Vec<u8>), &'static str> {
                let (pk, sk) = match seed {
                    Some(seed) => $module::KG::keygen_from_seed(seed),
                    None => $module::try_keygen()?,
                };
                Ok((pk.into_bytes().to_vec(), sk.into_bytes().to_vec()))
            }

            fn private_key(sk: &[u8]) -> Result<$module::PrivateKey, &'static str> {
                let sk: [u8; $module::SK_LEN] =
                    sk.try_into().map_err(|_| "malformed private key")?;
                $module::PrivateKey::try_from_bytes(sk)
            }

            pub(super) fn derive_public_key(sk: &[u8]) -> Result<Vec<u8>, &'static str> {
                Ok(private_key(sk)?.get_public_key().into_bytes().to_vec())
            }

            pub(super) fn sign(sk: &[u8], message: &[u8]) -> Result<Vec<u8>, &'static str> {
                let signature = private_key(sk)?.try_sign(message, &[])?;
                Ok(signature.to_vec())
            }

            pub(super) fn verify(pk: &[u8], message: &[u8], signature: &[u8]) -> bool {
                let Ok(pk) = <[u8; $module::PK_LEN]>::try_from(pk) else {
                    return false;
                };
                let Ok(signature) = <[u8; $module::SIG_LEN]>::try_from(signature) else {
                    return false;
                };
                match $module::PublicKey::try_from_bytes(pk) {
                    Ok(public_key) => public_key.verify(message, &signature, &[]),
                    Err(_) => false,
                }
            }
        }
    };
}

ml_dsa_backend!(level44, ml_dsa_44);
ml_dsa_backend!(level65, ml_dsa_65);
ml_dsa_backend!(level87, ml_dsa_87);

/// Guardian signing key, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct GuardianSecretKey {
    bytes: Vec<u8>,
}

impl GuardianSecretKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for GuardianSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardianSecretKey")
            .field("bytes", &format!("<redacted:{}>", self.bytes.len()))
            .finish()
    }
}

/// A guardian's key pair at a declared parameter set.
#[derive(Debug)]
pub struct GuardianKeyPair {
    pub public_key: Vec<u8>,
    pub private_key: GuardianSecretKey,
    pub parameter_set: u8,
}

/// Generate a key pair. A 32-byte seed makes generation reproducible (test/audit fixtures).
pub fn generate_guardian_key_pair(
    parameter_set: u8,
    seed: Option<&[u8; 32]>,
) -> Result<GuardianKeyPair, EnvelopeError> {
    let level = MlDsaLevel::for_parameter_set(parameter_set)?;
    let (public_key, private_key) = match level {
        MlDsaLevel::MlDsa44 => level44::keygen(seed),
        MlDsaLevel::MlDsa65 => level65::keygen(seed),
        MlDsaLevel::MlDsa87 => level87::keygen(seed),
    }
    .map_err(EnvelopeError::Backend)?;

    Ok(GuardianKeyPair {
        public_key,
        private_key: GuardianSecretKey::new(private_key),
        parameter_set,
    })
}

/// Public key belonging to `private_key`.
pub fn derive_public_key(parameter_set: u8, private_key: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let level = MlDsaLevel::for_parameter_set(parameter_set)?;
    check_len("private key", parameter_set, level.secret_key_len(), private_key.len())?;
    match level {
        MlDsaLevel::MlDsa44 => level44::derive_public_key(private_key),
        MlDsaLevel::MlDsa65 => level65::derive_public_key(private_key),
        MlDsaLevel::MlDsa87 => level87::derive_public_key(private_key),
    }
    .map_err(EnvelopeError::Backend)
}

/// Sign `message` (the raw digest bytes) with `private_key`.
pub fn sign(
    parameter_set: u8,
    private_key: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let level = MlDsaLevel::for_parameter_set(parameter_set)?;
    check_len("private key", parameter_set, level.secret_key_len(), private_key.len())?;
    match level {
        MlDsaLevel::MlDsa44 => level44::sign(private_key, message),
        MlDsaLevel::MlDsa65 => level65::sign(private_key, message),
        MlDsaLevel::MlDsa87 => level87::sign(private_key, message),
    }
    .map_err(EnvelopeError::Backend)
}

/// `true` only for a well-formed key and signature that verify over `message`.
pub fn verify(parameter_set: u8, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    match MlDsaLevel::for_parameter_set(parameter_set) {
        Ok(MlDsaLevel::MlDsa44) => level44::verify(public_key, message, signature),
        Ok(MlDsaLevel::MlDsa65) => level65::verify(public_key, message, signature),
        Ok(MlDsaLevel::MlDsa87) => level87::verify(public_key, message, signature),
        Err(_) => false,
    }
}

fn check_len(
    what: &'static str,
    parameter_set: u8,
    expected: usize,
    actual: usize,
) -> Result<(), EnvelopeError> {
    if expected != actual {
        return Err(EnvelopeError::KeyLength {
            what,
            parameter_set,
            expected,
            actual,
        });
    }
    Ok(())
}
