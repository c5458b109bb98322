//! File-backed replay ledger of executed intent digests.
//!
//! On-disk shape: `{ "executed": [IntentExecutionRecord, ...] }`, sorted by `at`. Every write
//! rewrites the whole document through an atomic temp-file swap, so a crash can lose at most
//! the latest record and never corrupts older ones.
//!
//! Writers serialise on an exclusive advisory lock (`<ledger>.lock`). The ledger is re-read
//! under that lock before a record is added, closing the window where two orchestrators both
//! pass aggregation for the same digest and both record it.

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use treasury_intent_types::{normalize_digest_hex, IntentDigest};

use crate::{
    aggregate::{ExecutionCheck, ReplayStatus},
    errors::LedgerError,
    util::write_atomic,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentExecutionRecord {
    /// Lower-case `0x` hex.
    pub digest: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Ids of the guardians whose approvals authorised the execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approvals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Domain-free digest the executor contract recomputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain_digest: Option<String>,
}

/// Caller-supplied details stored alongside an execution.
#[derive(Clone, Debug, Default)]
pub struct ExecutionMetadata {
    pub tx_hash: Option<String>,
    pub approvals: Option<Vec<String>>,
    pub note: Option<String>,
    pub on_chain_digest: Option<String>,
}

#[derive(Serialize)]
struct LedgerDocument<'a> {
    executed: Vec<&'a IntentExecutionRecord>,
}

#[derive(Debug)]
pub struct IntentLedger {
    path: PathBuf,
    records: HashMap<String, IntentExecutionRecord>,
}

impl IntentLedger {
    /// Open the ledger at `path`, loading existing records if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let records = load_records(&path)?;
        tracing::debug!(path = %path.display(), records = records.len(), "intent ledger loaded");
        Ok(Self { path, records })
    }

    /// Refresh the in-memory snapshot from disk without taking the writer lock.
    pub fn reload(&mut self) -> Result<(), LedgerError> {
        self.records = load_records(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_executed(&self, digest: &str) -> bool {
        self.records.contains_key(&normalize_digest_hex(digest))
    }

    pub fn get_record(&self, digest: &str) -> Option<&IntentExecutionRecord> {
        self.records.get(&normalize_digest_hex(digest))
    }

    /// All records, oldest first.
    pub fn list_executed(&self) -> Vec<IntentExecutionRecord> {
        self.sorted().into_iter().cloned().collect()
    }

    /// Take the writer lock and refresh from disk.
    ///
    /// Hold the returned guard across aggregation, broadcast and recording to run the whole
    /// check-then-record sequence as a single writer.
    pub fn lock(&mut self) -> Result<LockedLedger<'_>, LedgerError> {
        let lock_path = lock_path_for(&self.path);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| LedgerError::Io {
                path: lock_path.clone(),
                source,
            })?;
        lock_file.lock_exclusive().map_err(|source| LedgerError::Io {
            path: lock_path.clone(),
            source,
        })?;

        self.records = load_records(&self.path)?;
        Ok(LockedLedger {
            ledger: self,
            lock_file,
        })
    }

    /// Record a successful execution. Fails if the digest is already recorded.
    pub fn record_execution(
        &mut self,
        digest: &str,
        metadata: ExecutionMetadata,
    ) -> Result<IntentExecutionRecord, LedgerError> {
        self.lock()?.record_execution(digest, metadata)
    }

    fn sorted(&self) -> Vec<&IntentExecutionRecord> {
        let mut records: Vec<&IntentExecutionRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.digest.cmp(&b.digest)));
        records
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let document = LedgerDocument {
            executed: self.sorted(),
        };
        let serialised = serde_json::to_string_pretty(&document)?;
        write_atomic(&self.path, serialised.as_bytes()).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl ExecutionCheck for IntentLedger {
    fn execution_status(&self, digest: &IntentDigest) -> ReplayStatus {
        self.get_record(&digest.to_hex()).cloned().into()
    }
}

/// Ledger held under the exclusive writer lock. The lock is released on drop.
pub struct LockedLedger<'a> {
    ledger: &'a mut IntentLedger,
    lock_file: File,
}

impl LockedLedger<'_> {
    pub fn is_executed(&self, digest: &str) -> bool {
        self.ledger.is_executed(digest)
    }

    pub fn get_record(&self, digest: &str) -> Option<&IntentExecutionRecord> {
        self.ledger.get_record(digest)
    }

    pub fn ledger(&self) -> &IntentLedger {
        &*self.ledger
    }

    /// Stamp, store and persist a record for `digest`.
    pub fn record_execution(
        &mut self,
        digest: &str,
        metadata: ExecutionMetadata,
    ) -> Result<IntentExecutionRecord, LedgerError> {
        let key = normalize_digest_hex(digest);
        if self.ledger.records.contains_key(&key) {
            return Err(LedgerError::AlreadyExecuted(key));
        }

        let record = IntentExecutionRecord {
            digest: key.clone(),
            at: OffsetDateTime::now_utc(),
            tx_hash: metadata.tx_hash,
            approvals: metadata.approvals,
            note: metadata.note,
            on_chain_digest: metadata.on_chain_digest.map(|d| normalize_digest_hex(&d)),
        };
        self.ledger.records.insert(key.clone(), record.clone());
        if let Err(err) = self.ledger.persist() {
            // Keep the mirror identical to what is on disk.
            self.ledger.records.remove(&key);
            return Err(err);
        }

        tracing::info!(
            digest = %record.digest,
            tx_hash = record.tx_hash.as_deref().unwrap_or("-"),
            "recorded intent execution"
        );
        Ok(record)
    }
}

impl Drop for LockedLedger<'_> {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.lock_file) {
            tracing::warn!(error = %err, "failed releasing intent ledger lock");
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_os_string();
    lock.push(".lock");
    PathBuf::from(lock)
}

fn load_records(path: &Path) -> Result<HashMap<String, IntentExecutionRecord>, LedgerError> {
    let mut records = HashMap::new();
    if !path.exists() {
        return Ok(records);
    }

    let raw = fs::read_to_string(path).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(records);
    }

    let unreadable = |reason: String| LedgerError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };
    let document: Value = serde_json::from_str(&raw).map_err(|e| unreadable(e.to_string()))?;
    let Value::Object(mut root) = document else {
        return Err(unreadable("top level is not an object".into()));
    };
    let entries = match root.remove("executed") {
        None | Some(Value::Null) => return Ok(records),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(unreadable("`executed` is not an array".into())),
    };

    for (index, entry) in entries.into_iter().enumerate() {
        let Some(digest) = entry
            .get("digest")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(normalize_digest_hex)
        else {
            tracing::warn!(path = %path.display(), index, "skipping ledger entry without digest");
            continue;
        };

        let record = match serde_json::from_value::<IntentExecutionRecord>(entry) {
            Ok(record) => IntentExecutionRecord { digest, ..record },
            Err(err) => {
                // The digest alone is enough to keep refusing a replay.
                tracing::warn!(
                    path = %path.display(),
                    index,
                    %digest,
                    error = %err,
                    "malformed ledger entry; keeping digest only"
                );
                IntentExecutionRecord {
                    digest,
                    at: OffsetDateTime::UNIX_EPOCH,
                    tx_hash: None,
                    approvals: None,
                    note: Some("recovered from malformed ledger entry".into()),
                    on_chain_digest: None,
                }
            }
        };
        records.entry(record.digest.clone()).or_insert(record);
    }

    Ok(records)
}
