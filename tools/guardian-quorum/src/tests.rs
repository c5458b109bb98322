use std::{fs, path::Path, sync::Arc};

use alloy_primitives::{Address, U256};
use anyhow::Context;
use serde_json::{json, Value};
use treasury_intent_types::{DomainBinding, RawIntent};

use crate::{
    config::QuorumConfig,
    contract::on_chain_digest,
    envelope::{sign_intent_with_keys, write_envelope_outputs, EnvelopeMetadata},
    errors::{RejectionReason, SessionError},
    execution_log::{tests::MemorySink, ExecutionEvent},
    keys::{plan_envelope_outputs, EnvelopeOutputRequest},
    ledger::IntentLedger,
    pq::{generate_guardian_key_pair, GuardianKeyPair},
    registry::GuardianRegistry,
    session::AuthorizationSession,
};

const CONTRACT: &str = "0x0000000000000000000000000000000000000ddd";

fn raw_intent() -> RawIntent {
    RawIntent::new(
        "0x00000000000000000000000000000000000000cc",
        "10000000000000000",
        Some("0x12345678"),
    )
}

fn keys(seed: u8) -> GuardianKeyPair {
    generate_guardian_key_pair(0, Some(&[seed; 32])).expect("keygen")
}

fn write_registry(dir: &Path, guardians: &[(&str, &GuardianKeyPair)], revoked: &GuardianKeyPair) {
    let mut records: Vec<Value> = guardians
        .iter()
        .map(|(id, keys)| {
            json!({
                "id": id,
                "publicKey": format!("0x{}", hex::encode(&keys.public_key)),
                "parameterSet": 0,
            })
        })
        .collect();
    records.push(json!({
        "id": "mallory",
        "publicKey": format!("0x{}", hex::encode(&revoked.public_key)),
        "parameterSet": 0,
        "revoked": true,
    }));
    fs::write(dir.join("guardians.json"), Value::Array(records).to_string()).expect("registry");
}

fn write_config(dir: &Path, chain_id: u64, threshold: usize) -> std::path::PathBuf {
    let path = dir.join("quorum.json");
    let config = json!({
        "chainId": chain_id,
        "contractAddress": CONTRACT,
        "threshold": threshold,
        "registryPath": "guardians.json",
        "ledgerPath": "state/ledger.json",
        "envelopeDir": "envelopes",
        "auditLogPath": "state/execution.jsonl",
    });
    fs::write(&path, config.to_string()).expect("config");
    path
}

fn sign_to_dir(
    dir: &Path,
    domain: &DomainBinding,
    guardian_id: &str,
    keys: &GuardianKeyPair,
    emit_json: bool,
) {
    let (_, envelope) = sign_intent_with_keys(
        raw_intent(),
        Some(domain),
        keys,
        Some(EnvelopeMetadata::issued_now(guardian_id)),
    )
    .expect("sign");
    let plan = plan_envelope_outputs(&EnvelopeOutputRequest {
        directory: dir,
        basename: None,
        digest: &envelope.digest,
        guardian_id: Some(guardian_id),
        emit_json,
    });
    write_envelope_outputs(&plan, &envelope).expect("write envelope");
}

fn audit_events(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("audit log")
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).expect("json line");
            value["event"].as_str().expect("event name").to_string()
        })
        .collect()
}

#[test]
fn test_full_round_then_replay_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (alice, bob, carol, mallory) = (keys(1), keys(2), keys(3), keys(4));
    write_registry(dir.path(), &[("alice", &alice), ("bob", &bob), ("carol", &carol)], &mallory);
    let config_path = write_config(dir.path(), 1, 2);
    let config = QuorumConfig::load(&config_path).expect("config");
    let domain = config.domain_binding();

    // Alice writes both encodings; the second copy is a duplicate.
    sign_to_dir(&config.envelope_dir, &domain, "alice", &alice, true);
    sign_to_dir(&config.envelope_dir, &domain, "bob", &bob, false);
    sign_to_dir(&config.envelope_dir, &domain, "mallory", &mallory, false);

    let mut session = AuthorizationSession::load(&config_path).expect("session");
    assert_eq!(session.registry().len(), 3);

    let authorization = session.authorize(raw_intent()).expect("authorize");
    let report = &authorization.report;
    assert!(authorization.is_authorized());
    assert_eq!(authorization.files.len(), 4);
    assert_eq!(report.approving_guardian_ids(), ["alice", "bob"]);
    assert_eq!(report.pending_guardian_ids(), ["carol"]);
    let reasons: Vec<_> = report.invalid.iter().map(|r| r.reason).collect();
    assert_eq!(
        reasons,
        [RejectionReason::DuplicateGuardian, RejectionReason::UnknownGuardian]
    );
    assert!(!report.replay_detected);

    let calldata = authorization.calldata();
    assert_eq!(&calldata[..4], domain.function_selector.as_slice());

    session.record_broadcast(&authorization, "0xfeed");
    let record = session
        .record_execution(&authorization, "0xfeed", Some("q3 payroll".into()))
        .expect("record");
    assert_eq!(record.digest, report.digest.to_hex());
    assert_eq!(record.approvals, Some(vec!["alice".to_string(), "bob".to_string()]));
    assert_eq!(
        record.on_chain_digest,
        Some(on_chain_digest(&authorization.intent).to_hex())
    );
    assert_ne!(record.on_chain_digest.as_deref(), Some(record.digest.as_str()));

    // A fresh process sees the ledger and refuses the same intent.
    let mut restarted = AuthorizationSession::load(&config_path).expect("restart");
    let replay = restarted.authorize(raw_intent()).expect("authorize replay");
    assert!(replay.report.replay_detected);
    assert!(!replay.is_authorized());
    assert_eq!(replay.report.approvals.len(), 2);
    assert_eq!(replay.report.executed_record.as_ref(), Some(&record));
    assert!(matches!(
        restarted.record_execution(&replay, "0xbeef", None),
        Err(SessionError::ReplayDetected(_))
    ));

    let ledger = IntentLedger::open(&config.ledger_path).expect("ledger");
    assert_eq!(ledger.list_executed(), vec![record]);

    let events = audit_events(&dir.path().join("state/execution.jsonl"));
    assert_eq!(
        events,
        [
            "intentReceived",
            "signaturesLoaded",
            "thresholdSatisfied",
            "broadcast",
            "executed",
            "intentReceived",
            "signaturesLoaded",
            "failure",
            "failure",
        ]
    );
}

#[test]
fn test_stale_authorization_loses_race_to_other_process() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (alice, bob) = (keys(1), keys(2));
    write_registry(dir.path(), &[("alice", &alice), ("bob", &bob)], &keys(9));
    let config_path = write_config(dir.path(), 1, 1);
    let config = QuorumConfig::load(&config_path).context("loading quorum config")?;
    sign_to_dir(&config.envelope_dir, &config.domain_binding(), "alice", &alice, false);

    let mut first = AuthorizationSession::load(&config_path)?;
    let mut second = AuthorizationSession::load(&config_path)?;
    let a = first.authorize(raw_intent())?;
    let b = second.authorize(raw_intent())?;
    assert!(a.is_authorized() && b.is_authorized());

    first.record_execution(&a, "0x01", None).context("first recorder")?;
    assert!(matches!(
        second.record_execution(&b, "0x02", None),
        Err(SessionError::ReplayDetected(_))
    ));
    Ok(())
}

#[test]
fn test_approvals_for_another_chain_do_not_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (alice, bob) = (keys(1), keys(2));
    write_registry(dir.path(), &[("alice", &alice), ("bob", &bob)], &keys(9));
    let config_path = write_config(dir.path(), 1, 2);
    let config = QuorumConfig::load(&config_path).expect("config");

    let contract: Address = CONTRACT.parse().expect("address");
    let optimism = DomainBinding::new(U256::from(10u64), contract);
    sign_to_dir(&config.envelope_dir, &config.domain_binding(), "alice", &alice, false);
    sign_to_dir(&config.envelope_dir, &optimism, "bob", &bob, false);

    let sink = Arc::new(MemorySink::default());
    let mut session = AuthorizationSession::from_parts(
        config.clone(),
        GuardianRegistry::from_config_file(&config.registry_path).expect("registry"),
        IntentLedger::open(&config.ledger_path).expect("ledger"),
        sink.clone(),
    );

    let authorization = session.authorize(raw_intent()).expect("authorize");
    let report = &authorization.report;
    assert!(!report.threshold_met);
    assert_eq!(report.shortfall, 1);
    assert_eq!(report.approving_guardian_ids(), ["alice"]);
    assert_eq!(report.invalid.len(), 1);
    assert_eq!(report.invalid[0].reason, RejectionReason::DigestMismatch);
    assert_eq!(report.pending_guardian_ids(), ["bob"]);

    assert!(matches!(
        session.record_execution(&authorization, "0x01", None),
        Err(SessionError::ThresholdNotMet { approvals: 1, threshold: 2, .. })
    ));
    assert!(!session.ledger().is_executed(&report.digest.to_hex()));

    let events = sink.events();
    assert_eq!(
        events[2],
        ExecutionEvent::ThresholdShortfall {
            threshold: 2,
            approvals: 1,
            pending_ids: vec!["bob".into()],
        }
    );
    assert!(matches!(events.last(), Some(ExecutionEvent::Failure { .. })));
}

#[test]
fn test_invalid_intent_is_a_validation_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_registry(dir.path(), &[("alice", &keys(1))], &keys(9));
    let config_path = write_config(dir.path(), 1, 1);
    let mut session = AuthorizationSession::load(&config_path).expect("session");

    let bad = RawIntent::new("0x1234", 1u64, None);
    assert!(matches!(session.authorize(bad), Err(SessionError::Validation(_))));
}
