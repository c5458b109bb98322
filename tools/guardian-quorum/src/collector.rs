//! Loads every envelope file in a directory, one report per file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    envelope::{decode_envelope_from_cbor, decode_envelope_from_json, SignedIntentEnvelope},
    errors::CollectorError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeFormat {
    Cbor,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum FileOutcome {
    Parsed { format: EnvelopeFormat },
    Skipped { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

impl FileReport {
    fn parsed(path: PathBuf, format: EnvelopeFormat) -> Self {
        Self {
            path,
            outcome: FileOutcome::Parsed { format },
        }
    }

    fn skipped(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            outcome: FileOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self.outcome, FileOutcome::Parsed { .. })
    }
}

#[derive(Clone, Debug, Default)]
pub struct CollectedEnvelopes {
    /// Parsed envelopes, in file-name order.
    pub envelopes: Vec<SignedIntentEnvelope>,
    /// Exactly one entry per directory entry.
    pub reports: Vec<FileReport>,
}

/// Read `dir` in file-name order. CBOR is tried first, then JSON.
pub fn load_envelopes_from_directory(
    dir: impl AsRef<Path>,
) -> Result<CollectedEnvelopes, CollectorError> {
    let dir = dir.as_ref();
    let read_dir_err = |source| CollectorError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        paths.push(entry.map_err(read_dir_err)?.path());
    }
    paths.sort();

    let mut collected = CollectedEnvelopes::default();
    for path in paths {
        let (envelope, report) = load_one(path);
        if let Some(envelope) = envelope {
            collected.envelopes.push(envelope);
        }
        collected.reports.push(report);
    }

    tracing::debug!(
        dir = %dir.display(),
        files = collected.reports.len(),
        envelopes = collected.envelopes.len(),
        "collected guardian envelopes"
    );
    Ok(collected)
}

fn load_one(path: PathBuf) -> (Option<SignedIntentEnvelope>, FileReport) {
    // Links are not followed; only regular files count.
    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) => return (None, FileReport::skipped(path, format!("stat failed: {err}"))),
    };
    if !metadata.is_file() {
        return (None, FileReport::skipped(path, "not a regular file"));
    }
    if metadata.len() == 0 {
        return (None, FileReport::skipped(path, "empty file"));
    }

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => return (None, FileReport::skipped(path, format!("read failed: {err}"))),
    };

    let cbor_err = match decode_envelope_from_cbor(&bytes) {
        Ok(envelope) => return (Some(envelope), FileReport::parsed(path, EnvelopeFormat::Cbor)),
        Err(err) => err,
    };
    match decode_envelope_from_json(&bytes) {
        Ok(envelope) => (Some(envelope), FileReport::parsed(path, EnvelopeFormat::Json)),
        Err(json_err) => {
            tracing::warn!(
                path = %path.display(),
                %cbor_err,
                %json_err,
                "skipping undecodable envelope file"
            );
            let reason =
                format!("not a CBOR envelope ({cbor_err}); not a JSON envelope ({json_err})");
            (None, FileReport::skipped(path, reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        envelope::{
            encode_envelope_to_cbor, encode_envelope_to_json, sign_intent_digest, SigningInput,
        },
        pq::generate_guardian_key_pair,
    };
    use alloy_primitives::keccak256;
    use treasury_intent_types::IntentDigest;

    fn envelope(seed: u8) -> SignedIntentEnvelope {
        let digest = IntentDigest::new(keccak256(b"collector"));
        let keys = generate_guardian_key_pair(0, Some(&[seed; 32])).expect("keygen");
        sign_intent_digest(SigningInput::from_key_pair(&digest, &keys)).expect("sign")
    }

    #[test]
    fn test_every_entry_gets_one_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = envelope(1);
        let second = envelope(2);
        fs::write(dir.path().join("a.cbor"), encode_envelope_to_cbor(&first).expect("cbor"))
            .expect("write");
        fs::write(dir.path().join("b.json"), encode_envelope_to_json(&second).expect("json"))
            .expect("write");
        fs::write(dir.path().join("c.txt"), b"not an envelope").expect("write");
        fs::write(dir.path().join("d.cbor"), b"").expect("write");
        fs::create_dir(dir.path().join("e-subdir")).expect("mkdir");

        let collected = load_envelopes_from_directory(dir.path()).expect("collect");
        assert_eq!(collected.envelopes, vec![first, second]);
        assert_eq!(collected.reports.len(), 5);

        let outcome = |i: usize| &collected.reports[i].outcome;
        assert_eq!(
            outcome(0),
            &FileOutcome::Parsed {
                format: EnvelopeFormat::Cbor,
            }
        );
        assert_eq!(
            outcome(1),
            &FileOutcome::Parsed {
                format: EnvelopeFormat::Json,
            }
        );
        assert!(matches!(outcome(2), FileOutcome::Skipped { reason } if reason.contains("JSON")));
        assert_eq!(
            outcome(3),
            &FileOutcome::Skipped {
                reason: "empty file".into(),
            }
        );
        assert_eq!(
            outcome(4),
            &FileOutcome::Skipped {
                reason: "not a regular file".into(),
            }
        );
        assert!(collected.reports[4].path.ends_with("e-subdir"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_envelope_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        let target = outside.path().join("real.cbor");
        let bytes = encode_envelope_to_cbor(&envelope(7)).expect("cbor");
        fs::write(&target, bytes).expect("write");
        std::os::unix::fs::symlink(&target, dir.path().join("link.cbor")).expect("symlink");

        let collected = load_envelopes_from_directory(dir.path()).expect("collect");
        assert!(collected.envelopes.is_empty());
        assert_eq!(
            collected.reports[0].outcome,
            FileOutcome::Skipped {
                reason: "not a regular file".into(),
            }
        );
    }

    #[test]
    fn test_file_name_order_is_stable() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, seed) in [("z.cbor", 3u8), ("m.cbor", 4), ("a.cbor", 5)] {
            let bytes = encode_envelope_to_cbor(&envelope(seed)).expect("cbor");
            fs::write(dir.path().join(name), bytes).expect("write");
        }
        let collected = load_envelopes_from_directory(dir.path()).expect("collect");
        let names: Vec<_> = collected
            .reports
            .iter()
            .filter_map(|r| r.path.file_name().and_then(|n| n.to_str()).map(str::to_owned))
            .collect();
        assert_eq!(names, ["a.cbor", "m.cbor", "z.cbor"]);
        // Signing is randomised; identify the envelope by its key.
        assert_eq!(collected.envelopes[0].public_key, envelope(5).public_key);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            load_envelopes_from_directory(dir.path().join("absent")),
            Err(CollectorError::ReadDir { .. })
        ));
    }
}
