//! Structured event trail for one authorization round.
//!
//! The logger is a caller-owned handle: every event it emits carries the round's [`LogContext`]
//! so each line can be correlated without external trace propagation. Sinks decide where the
//! records go; [`TracingSink`] feeds the `tracing` pipeline and [`JsonLinesSink`] keeps an
//! append-only audit file.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};

use serde::Serialize;
use time::OffsetDateTime;

pub const EXECUTION_LOG_TARGET: &str = "guardian_quorum::execution";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExecutionEvent {
    IntentReceived,
    SignaturesLoaded { count: usize },
    ThresholdSatisfied {
        threshold: usize,
        guardian_ids: Vec<String>,
    },
    ThresholdShortfall {
        threshold: usize,
        approvals: usize,
        pending_ids: Vec<String>,
    },
    Broadcast { tx_hash: String },
    Executed { tx_hash: String },
    Failure { reason: String },
}

impl ExecutionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IntentReceived => "intentReceived",
            Self::SignaturesLoaded { .. } => "signaturesLoaded",
            Self::ThresholdSatisfied { .. } => "thresholdSatisfied",
            Self::ThresholdShortfall { .. } => "thresholdShortfall",
            Self::Broadcast { .. } => "broadcast",
            Self::Executed { .. } => "executed",
            Self::Failure { .. } => "failure",
        }
    }

    fn summary(&self) -> String {
        match self {
            Self::IntentReceived => "intent received".to_string(),
            Self::SignaturesLoaded { count } => format!("{count} guardian envelopes loaded"),
            Self::ThresholdSatisfied {
                threshold,
                guardian_ids,
            } => format!(
                "threshold {threshold} satisfied by {}",
                guardian_ids.join(",")
            ),
            Self::ThresholdShortfall {
                threshold,
                approvals,
                pending_ids,
            } => {
                let pending = if pending_ids.is_empty() {
                    "-".to_string()
                } else {
                    pending_ids.join(",")
                };
                format!("threshold shortfall {approvals}/{threshold} (pending: {pending})")
            }
            Self::Broadcast { tx_hash } => format!("broadcast tx={tx_hash}"),
            Self::Executed { tx_hash } => format!("executed tx={tx_hash}"),
            Self::Failure { reason } => format!("failure: {reason}"),
        }
    }
}

/// Correlation fields attached to every event of a round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LogContext {
    pub digest: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionLogRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub context: LogContext,
    #[serde(flatten)]
    pub event: ExecutionEvent,
}

pub trait ExecutionSink: Send + Sync {
    fn write(&self, record: &ExecutionLogRecord);
}

/// Emits records as `tracing` events under [`EXECUTION_LOG_TARGET`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ExecutionSink for TracingSink {
    fn write(&self, record: &ExecutionLogRecord) {
        let context = if record.context.fields.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&record.context.fields).unwrap_or_default()
        };
        match &record.event {
            ExecutionEvent::Failure { .. } | ExecutionEvent::ThresholdShortfall { .. } => {
                tracing::warn!(
                    target: EXECUTION_LOG_TARGET,
                    event = record.event.name(),
                    digest = %record.context.digest,
                    context = %context,
                    "{}",
                    record.event.summary()
                );
            }
            _ => {
                tracing::info!(
                    target: EXECUTION_LOG_TARGET,
                    event = record.event.name(),
                    digest = %record.context.digest,
                    context = %context,
                    "{}",
                    record.event.summary()
                );
            }
        }
    }
}

/// Append-only JSON-lines audit file, flushed after every record.
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl ExecutionSink for JsonLinesSink {
    fn write(&self, record: &ExecutionLogRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialise execution log record");
                return;
            }
        };
        let Ok(mut file) = self.file.lock() else {
            tracing::warn!("execution log file mutex poisoned");
            return;
        };
        if let Err(err) = writeln!(file, "{line}").and_then(|()| file.flush()) {
            tracing::warn!(error = %err, "failed to append execution log record");
        }
    }
}

#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn ExecutionSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ExecutionSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.add_sink(sink);
        self
    }
}

impl ExecutionSink for MultiSink {
    fn write(&self, record: &ExecutionLogRecord) {
        for sink in &self.sinks {
            sink.write(record);
        }
    }
}

#[derive(Clone)]
pub struct ExecutionLogger {
    context: LogContext,
    sink: Arc<dyn ExecutionSink>,
}

impl ExecutionLogger {
    pub fn new(context: LogContext, sink: Arc<dyn ExecutionSink>) -> Self {
        Self {
            context,
            sink,
        }
    }

    /// Logger that only emits `tracing` events.
    pub fn tracing(context: LogContext) -> Self {
        Self::new(context, Arc::new(TracingSink))
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// Same sink, different round.
    pub fn with_context(&self, context: LogContext) -> Self {
        Self {
            context,
            sink: Arc::clone(&self.sink),
        }
    }

    pub fn intent_received(&self) {
        self.emit(ExecutionEvent::IntentReceived);
    }

    pub fn signatures_loaded(&self, count: usize) {
        self.emit(ExecutionEvent::SignaturesLoaded { count });
    }

    pub fn threshold_satisfied(&self, threshold: usize, guardian_ids: Vec<String>) {
        self.emit(ExecutionEvent::ThresholdSatisfied {
            threshold,
            guardian_ids,
        });
    }

    pub fn threshold_shortfall(
        &self,
        threshold: usize,
        approvals: usize,
        pending_ids: Vec<String>,
    ) {
        self.emit(ExecutionEvent::ThresholdShortfall {
            threshold,
            approvals,
            pending_ids,
        });
    }

    pub fn broadcast(&self, tx_hash: &str) {
        self.emit(ExecutionEvent::Broadcast {
            tx_hash: tx_hash.to_string(),
        });
    }

    pub fn executed(&self, tx_hash: &str) {
        self.emit(ExecutionEvent::Executed {
            tx_hash: tx_hash.to_string(),
        });
    }

    pub fn failure(&self, reason: impl ToString) {
        self.emit(ExecutionEvent::Failure {
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: ExecutionEvent) {
        let record = ExecutionLogRecord {
            timestamp: OffsetDateTime::now_utc(),
            context: self.context.clone(),
            event,
        };
        self.sink.write(&record);
    }
}
