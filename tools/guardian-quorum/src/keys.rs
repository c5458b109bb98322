//! Guardian key material decoding and envelope file naming.

use std::{
    fs,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::KeyMaterialError;

/// How an inline key string is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyEncoding {
    /// `0x` prefix means hex, anything else base64.
    #[default]
    Auto,
    Hex,
    Base64,
}

/// Load key bytes from a file path, or decode them from an inline hex/base64 string.
///
/// `description` names the material in error messages (e.g. "guardian private key").
pub fn load_key_material(
    source: &str,
    encoding: KeyEncoding,
    description: &str,
) -> Result<Vec<u8>, KeyMaterialError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(KeyMaterialError::Empty {
            description: description.to_string(),
        });
    }

    let path = Path::new(trimmed);
    if path.is_file() {
        return fs::read(path).map_err(|source| KeyMaterialError::Io {
            description: description.to_string(),
            path: path.to_path_buf(),
            source,
        });
    }

    decode_key_string(trimmed, encoding, description)
}

/// Decode an inline key string; never touches the filesystem.
pub fn decode_key_string(
    value: &str,
    encoding: KeyEncoding,
    description: &str,
) -> Result<Vec<u8>, KeyMaterialError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(KeyMaterialError::Empty {
            description: description.to_string(),
        });
    }

    let use_hex = match encoding {
        KeyEncoding::Hex => true,
        KeyEncoding::Base64 => false,
        KeyEncoding::Auto => value.starts_with("0x") || value.starts_with("0X"),
    };

    if use_hex {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);
        if digits.len() % 2 != 0 {
            return Err(KeyMaterialError::OddHexLength {
                description: description.to_string(),
            });
        }
        hex::decode(digits).map_err(|source| KeyMaterialError::Hex {
            description: description.to_string(),
            source,
        })
    } else {
        STANDARD
            .decode(value)
            .map_err(|source| KeyMaterialError::Base64 {
                description: description.to_string(),
                source,
            })
    }
}

/// `<first 8 digest hex digits>-<guardian slug>`, e.g. `f3ae5fed-guardian-a`.
pub fn derive_envelope_basename(digest: &str, guardian_id: Option<&str>) -> String {
    let trimmed = digest.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase();
    let prefix: String = digits.chars().take(8).collect();
    format!("{prefix}-{}", guardian_slug(guardian_id))
}

fn guardian_slug(guardian_id: Option<&str>) -> String {
    match guardian_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '_' | '-' => c,
                _ => '-',
            })
            .collect(),
        None => "guardian".to_string(),
    }
}

/// Where an envelope should be written.
#[derive(Clone, Debug)]
pub struct EnvelopeOutputRequest<'a> {
    pub directory: &'a Path,
    /// Overrides the digest/guardian derived name.
    pub basename: Option<&'a str>,
    pub digest: &'a str,
    pub guardian_id: Option<&'a str>,
    pub emit_json: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeOutputPlan {
    pub cbor_path: PathBuf,
    pub json_path: Option<PathBuf>,
}

/// Pure path computation; no I/O.
pub fn plan_envelope_outputs(request: &EnvelopeOutputRequest<'_>) -> EnvelopeOutputPlan {
    let basename = match request.basename {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => derive_envelope_basename(request.digest, request.guardian_id),
    };
    EnvelopeOutputPlan {
        cbor_path: request.directory.join(format!("{basename}.cbor")),
        json_path: request
            .emit_json
            .then(|| request.directory.join(format!("{basename}.json"))),
    }
}
