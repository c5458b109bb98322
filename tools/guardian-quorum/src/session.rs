//! One authorization round: config → registry → ledger → collector → aggregator → logger.

use std::{path::Path, sync::Arc};

use treasury_intent_types::{DomainBinding, RawIntent, TreasuryIntent};

use crate::{
    aggregate::{aggregate_guardian_envelopes, AggregationOptions, AggregationReport},
    collector::{load_envelopes_from_directory, FileReport},
    config::QuorumConfig,
    contract::{encode_execute_call, on_chain_digest},
    digest::digest_treasury_intent,
    errors::{LedgerError, SessionError},
    execution_log::{
        ExecutionLogger, ExecutionSink, JsonLinesSink, LogContext, MultiSink, TracingSink,
    },
    ledger::{ExecutionMetadata, IntentExecutionRecord, IntentLedger},
    registry::GuardianRegistry,
};

/// Outcome of [`AuthorizationSession::authorize`].
pub struct Authorization {
    pub intent: TreasuryIntent,
    pub report: AggregationReport,
    /// One entry per file found in the envelope directory.
    pub files: Vec<FileReport>,
    logger: ExecutionLogger,
}

impl Authorization {
    pub fn is_authorized(&self) -> bool {
        self.report.threshold_met
    }

    /// `executeTransaction` calldata for the authorized intent.
    pub fn calldata(&self) -> Vec<u8> {
        encode_execute_call(&self.intent)
    }

    pub fn logger(&self) -> &ExecutionLogger {
        &self.logger
    }
}

pub struct AuthorizationSession {
    config: QuorumConfig,
    domain: DomainBinding,
    registry: GuardianRegistry,
    ledger: IntentLedger,
    sink: Arc<dyn ExecutionSink>,
}

impl AuthorizationSession {
    /// Load the config file and everything it points at.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, SessionError> {
        Self::open(QuorumConfig::load(config_path)?)
    }

    /// Build a session whose events go to `tracing` and, if configured, the audit log.
    pub fn open(config: QuorumConfig) -> Result<Self, SessionError> {
        let registry = GuardianRegistry::from_config_file(&config.registry_path)?;
        let ledger = IntentLedger::open(&config.ledger_path)?;

        let sink: Arc<dyn ExecutionSink> = match &config.audit_log_path {
            Some(path) => {
                let audit = JsonLinesSink::open(path).map_err(|source| SessionError::AuditLog {
                    path: path.clone(),
                    source,
                })?;
                Arc::new(
                    MultiSink::new()
                        .with_sink(Arc::new(TracingSink))
                        .with_sink(Arc::new(audit)),
                )
            }
            None => Arc::new(TracingSink),
        };

        Ok(Self::from_parts(config, registry, ledger, sink))
    }

    pub fn from_parts(
        config: QuorumConfig,
        registry: GuardianRegistry,
        ledger: IntentLedger,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        let domain = config.domain_binding();
        Self {
            config,
            domain,
            registry,
            ledger,
            sink,
        }
    }

    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    pub fn domain(&self) -> &DomainBinding {
        &self.domain
    }

    pub fn registry(&self) -> &GuardianRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &IntentLedger {
        &self.ledger
    }

    /// Normalize and digest `raw`, collect envelopes and aggregate them.
    ///
    /// A shortfall or a replay is not an error: check [`Authorization::is_authorized`].
    pub fn authorize(&mut self, raw: RawIntent) -> Result<Authorization, SessionError> {
        let (intent, digest) = match digest_treasury_intent(raw, Some(&self.domain)) {
            Ok(normalized) => normalized,
            Err(err) => {
                self.logger(LogContext::new("-")).failure(&err);
                return Err(err.into());
            }
        };
        let logger = self.logger(
            LogContext::new(digest.to_hex())
                .with_field("chainId", self.config.chain_id)
                .with_field("contract", self.config.contract_address),
        );
        logger.intent_received();

        let collected = match load_envelopes_from_directory(&self.config.envelope_dir) {
            Ok(collected) => collected,
            Err(err) => {
                logger.failure(&err);
                return Err(err.into());
            }
        };
        logger.signatures_loaded(collected.envelopes.len());

        if let Err(err) = self.ledger.reload() {
            logger.failure(&err);
            return Err(err.into());
        }

        let report = aggregate_guardian_envelopes(
            collected.envelopes,
            AggregationOptions {
                digest: &digest,
                threshold: self.config.threshold,
                registry: &self.registry,
                executed_check: Some(&self.ledger),
            },
        );

        if report.replay_detected {
            logger.failure(format!("intent {digest} was already executed"));
        } else if report.threshold_met {
            logger.threshold_satisfied(report.threshold, report.approving_guardian_ids());
        } else {
            logger.threshold_shortfall(
                report.threshold,
                report.approvals.len(),
                report.pending_guardian_ids(),
            );
        }

        Ok(Authorization {
            intent,
            report,
            files: collected.reports,
            logger,
        })
    }

    pub fn record_broadcast(&self, authorization: &Authorization, tx_hash: &str) {
        authorization.logger.broadcast(tx_hash);
    }

    pub fn record_failure(&self, authorization: &Authorization, reason: &str) {
        authorization.logger.failure(reason);
    }

    /// Record the execution under the ledger lock.
    ///
    /// Refuses an authorization that did not meet the threshold, and a digest another process
    /// recorded in the meantime.
    pub fn record_execution(
        &mut self,
        authorization: &Authorization,
        tx_hash: &str,
        note: Option<String>,
    ) -> Result<IntentExecutionRecord, SessionError> {
        let report = &authorization.report;
        let logger = &authorization.logger;
        let digest = report.digest.to_hex();

        if report.replay_detected {
            logger.failure("refusing to record a replayed intent");
            return Err(SessionError::ReplayDetected(digest));
        }
        if !report.threshold_met {
            let err = SessionError::ThresholdNotMet {
                digest,
                approvals: report.approvals.len(),
                threshold: report.threshold,
            };
            logger.failure(&err);
            return Err(err);
        }

        let metadata = ExecutionMetadata {
            tx_hash: Some(tx_hash.to_string()),
            approvals: Some(report.approving_guardian_ids()),
            note,
            on_chain_digest: Some(on_chain_digest(&authorization.intent).to_hex()),
        };
        let recorded = self
            .ledger
            .lock()
            .and_then(|mut locked| locked.record_execution(&digest, metadata));
        match recorded {
            Ok(record) => {
                logger.executed(tx_hash);
                Ok(record)
            }
            Err(LedgerError::AlreadyExecuted(digest)) => {
                logger.failure("intent was recorded by another process");
                Err(SessionError::ReplayDetected(digest))
            }
            Err(err) => {
                logger.failure(&err);
                Err(err.into())
            }
        }
    }

    fn logger(&self, context: LogContext) -> ExecutionLogger {
        ExecutionLogger::new(context, Arc::clone(&self.sink))
    }
}
