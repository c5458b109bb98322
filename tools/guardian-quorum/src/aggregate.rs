//! Threshold aggregation of guardian envelopes against a registry and a target digest.
//!
//! Envelopes are classified in input order. Order only matters for duplicates: the first
//! accepted envelope of a guardian wins and later ones are reported, never dropped. Feed a
//! stable order (see [`canonical_order`]) for reproducible reports.

use std::collections::HashSet;

use serde::Serialize;
use treasury_intent_types::IntentDigest;

use crate::{
    envelope::{verify_signed_envelope, SignedIntentEnvelope, Verification},
    errors::RejectionReason,
    ledger::IntentExecutionRecord,
    registry::{GuardianRecord, GuardianRegistry},
};

/// Replay state of a digest at the moment of aggregation.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplayStatus {
    NotExecuted,
    Executed,
    Recorded(IntentExecutionRecord),
}

impl ReplayStatus {
    pub fn is_executed(&self) -> bool {
        !matches!(self, ReplayStatus::NotExecuted)
    }
}

impl From<bool> for ReplayStatus {
    fn from(executed: bool) -> Self {
        if executed {
            ReplayStatus::Executed
        } else {
            ReplayStatus::NotExecuted
        }
    }
}

impl From<Option<IntentExecutionRecord>> for ReplayStatus {
    fn from(record: Option<IntentExecutionRecord>) -> Self {
        record.map_or(ReplayStatus::NotExecuted, ReplayStatus::Recorded)
    }
}

/// Source of truth for "has this digest already executed?".
pub trait ExecutionCheck {
    fn execution_status(&self, digest: &IntentDigest) -> ReplayStatus;
}

impl<F> ExecutionCheck for F
where
    F: Fn(&IntentDigest) -> ReplayStatus,
{
    fn execution_status(&self, digest: &IntentDigest) -> ReplayStatus {
        self(digest)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Approval {
    pub guardian: GuardianRecord,
    pub envelope: SignedIntentEnvelope,
}

#[derive(Clone, Debug, Serialize)]
pub struct Rejection {
    pub envelope: SignedIntentEnvelope,
    pub reason: RejectionReason,
}

pub struct AggregationOptions<'a> {
    pub digest: &'a IntentDigest,
    pub threshold: usize,
    pub registry: &'a GuardianRegistry,
    pub executed_check: Option<&'a dyn ExecutionCheck>,
}

/// Single source of truth for "can we proceed": check `threshold_met`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    pub digest: IntentDigest,
    pub threshold: usize,
    pub approvals: Vec<Approval>,
    pub invalid: Vec<Rejection>,
    pub pending_guardians: Vec<GuardianRecord>,
    pub shortfall: usize,
    pub replay_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_record: Option<IntentExecutionRecord>,
    pub threshold_met: bool,
}

impl AggregationReport {
    pub fn approving_guardian_ids(&self) -> Vec<String> {
        self.approvals.iter().map(|a| a.guardian.id.clone()).collect()
    }

    pub fn pending_guardian_ids(&self) -> Vec<String> {
        self.pending_guardians.iter().map(|g| g.id.clone()).collect()
    }
}

pub fn aggregate_guardian_envelopes(
    envelopes: impl IntoIterator<Item = SignedIntentEnvelope>,
    options: AggregationOptions<'_>,
) -> AggregationReport {
    let mut approvals: Vec<Approval> = Vec::new();
    let mut invalid: Vec<Rejection> = Vec::new();
    let mut claimed: HashSet<String> = HashSet::new();

    for envelope in envelopes {
        match classify(&envelope, &options, &claimed) {
            Ok(guardian) => {
                claimed.insert(guardian.id.clone());
                approvals.push(Approval { guardian, envelope });
            }
            Err(reason) => {
                tracing::debug!(
                    digest = %options.digest,
                    guardian = envelope.guardian_id().unwrap_or("-"),
                    %reason,
                    "envelope rejected"
                );
                invalid.push(Rejection { envelope, reason });
            }
        }
    }

    let pending_guardians: Vec<GuardianRecord> = options
        .registry
        .list()
        .into_iter()
        .filter(|guardian| !claimed.contains(&guardian.id))
        .collect();

    let replay = options
        .executed_check
        .map_or(ReplayStatus::NotExecuted, |check| check.execution_status(options.digest));
    let replay_detected = replay.is_executed();
    let executed_record = match replay {
        ReplayStatus::Recorded(record) => Some(record),
        _ => None,
    };

    let shortfall = options.threshold.saturating_sub(approvals.len());
    let threshold_met = approvals.len() >= options.threshold && !replay_detected;

    if replay_detected {
        tracing::warn!(digest = %options.digest, "digest already executed; refusing to authorize");
    }
    tracing::info!(
        digest = %options.digest,
        approvals = approvals.len(),
        invalid = invalid.len(),
        threshold = options.threshold,
        threshold_met,
        "aggregated guardian envelopes"
    );

    AggregationReport {
        digest: *options.digest,
        threshold: options.threshold,
        approvals,
        invalid,
        pending_guardians,
        shortfall,
        replay_detected,
        executed_record,
        threshold_met,
    }
}

fn classify(
    envelope: &SignedIntentEnvelope,
    options: &AggregationOptions<'_>,
    claimed: &HashSet<String>,
) -> Result<GuardianRecord, RejectionReason> {
    let guardian = options
        .registry
        .find_by_envelope(envelope)
        .ok_or(RejectionReason::UnknownGuardian)?;
    // A mismatched parameter set makes the cryptographic check meaningless.
    if guardian.parameter_set != envelope.parameter_set {
        return Err(RejectionReason::ParameterSetMismatch);
    }
    if claimed.contains(&guardian.id) {
        return Err(RejectionReason::DuplicateGuardian);
    }
    match verify_signed_envelope(envelope, Some(options.digest)) {
        Verification::Valid => Ok(guardian.clone()),
        Verification::Invalid(reason) => Err(reason),
    }
}

/// Stable default ordering: by stated guardian id, then public key bytes.
///
/// Envelopes without a guardian id sort after those with one.
pub fn canonical_order(envelopes: &mut [SignedIntentEnvelope]) {
    envelopes.sort_by(|a, b| {
        let key = |e: &SignedIntentEnvelope| {
            (e.guardian_id().is_none(), e.guardian_id().map(str::to_string))
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| a.public_key.cmp(&b.public_key))
    });
}
