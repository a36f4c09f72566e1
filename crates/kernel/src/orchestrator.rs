//! Orchestrator - drives each operation through validation, execution,
//! audit and checkpointing
//!
//! Every store mutation goes through the recorder task. The orchestrator
//! itself only holds in-memory scoring and monitoring state, so any number
//! of callers can process operations at once.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex, RwLock};
use warden_audit::{AuditEntry, AuditTrail, ChainReport};
use warden_core::{Operation, SystemState};
use warden_monitor::{AlertLevel, DriftMonitor, HealthSample, IntegrityValidator, SilentMonitor};
use warden_recovery::{CheckpointStore, RollbackEngine, RollbackEvent, RollbackTrigger};
use warden_rules::{Action, RuleRegistry, Verdict, ViolationDetector};

use crate::cancel::CancelToken;
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::events;
use crate::handler::HandlerRegistry;
use crate::notify::{DegradedReason, KernelEvent, Notifier};
use crate::outcome::{Attempt, ProcessOutcome};
use crate::recorder::{spawn_recorder, KernelStores, RecorderHandle, SharedStores};
use crate::stage::OperationStage;
use crate::status::{KernelStatus, LockdownInfo};

/// Observations averaged for the drift trend in status output
const DRIFT_TREND_WINDOW: usize = 10;

pub struct Orchestrator {
    config: KernelConfig,
    registry: Arc<RuleRegistry>,
    detector: Mutex<ViolationDetector>,
    drift: Mutex<DriftMonitor>,
    silent: Mutex<SilentMonitor>,
    integrity: IntegrityValidator,
    handlers: HandlerRegistry,
    stores: SharedStores,
    recorder: RecorderHandle,
    notifier: Notifier,
    lockdown: RwLock<Option<LockdownInfo>>,
    degraded: Mutex<BTreeSet<DegradedReason>>,
}

impl Orchestrator {
    /// Open every store, spawn the recorder and record the start
    ///
    /// Refuses to start when the rule registry fails its integrity check.
    /// A broken audit chain or tampered checkpoint does not stop startup;
    /// it is reported as a degraded flag instead.
    pub async fn start(config: KernelConfig, handlers: HandlerRegistry) -> KernelResult<Self> {
        let registry = Arc::new(RuleRegistry::load()?);
        if !registry.verify_integrity() {
            return Err(KernelError::IntegrityFailure(
                "rule registry hash mismatch".to_string(),
            ));
        }

        if let Some(dir) = &config.data_dir {
            std::fs::create_dir_all(dir).map_err(|e| KernelError::Storage(e.to_string()))?;
        }

        let mut degraded = BTreeSet::new();

        let audit = match config.audit_path() {
            Some(path) => AuditTrail::open(path)?,
            None => AuditTrail::in_memory(),
        }
        .with_merkle_interval(config.merkle_interval)
        .with_retention(config.audit_retention);
        if audit.is_sealed() {
            degraded.insert(DegradedReason::ChainCorruption);
        }

        let checkpoints = match config.checkpoint_path() {
            Some(path) => CheckpointStore::open(path, config.checkpoint.clone())?,
            None => CheckpointStore::in_memory(config.checkpoint.clone())?,
        };
        let tampered = checkpoints.verify_all()?;
        if !tampered.is_empty() {
            tracing::error!(?tampered, "Checkpoints failed verification");
            degraded.insert(DegradedReason::CheckpointIntegrity);
        }

        let rollback = RollbackEngine::load(&checkpoints)?;
        let state = match checkpoints.resume_point()? {
            Some(checkpoint) if checkpoint.verify() => checkpoint.state_snapshot,
            _ => SystemState::new(),
        };
        let lockdown = restore_lockdown(&audit);

        let drift = DriftMonitor::new(&config.drift)?;
        let silent = SilentMonitor::new(config.drift.threshold);
        let integrity = IntegrityValidator::new(&config.integrity_manifest)?;

        let stores = Arc::new(RwLock::new(KernelStores {
            audit,
            checkpoints,
            rollback,
            state,
        }));
        let recorder = spawn_recorder(stores.clone(), config.recorder_queue_depth);
        let notifier = Notifier::new(config.notification_capacity);

        for reason in &degraded {
            tracing::error!(%reason, "Kernel starting degraded");
        }

        let orchestrator = Self {
            detector: Mutex::new(ViolationDetector::new(registry.clone())),
            drift: Mutex::new(drift),
            silent: Mutex::new(silent),
            integrity,
            handlers,
            stores,
            recorder,
            notifier,
            lockdown: RwLock::new(lockdown),
            degraded: Mutex::new(degraded),
            registry,
            config,
        };

        let start = json!({
            "registry_hash": orchestrator.registry.registry_hash(),
            "rules": orchestrator.registry.len(),
            "version": env!("CARGO_PKG_VERSION"),
        });
        match orchestrator.recorder.audit(events::SYSTEM_START, start, Vec::new()).await {
            Ok(_) => {}
            Err(KernelError::ChainCorruption(reason)) => {
                tracing::warn!(reason = %reason, "Start not recorded, audit trail is sealed");
            }
            Err(err) => return Err(err),
        }

        let count = orchestrator.stores.read().await.checkpoints.count()?;
        if count == 0 {
            let genesis = orchestrator.recorder.checkpoint(1.0).await?;
            tracing::info!(checkpoint_id = genesis.id, "Genesis checkpoint created");
        }

        tracing::info!(
            rules = orchestrator.registry.len(),
            registry_hash = %orchestrator.registry.registry_hash(),
            "Kernel started"
        );
        Ok(orchestrator)
    }

    /// Parse and process a raw operation
    ///
    /// A value that is not a valid operation is rejected without touching
    /// any store.
    pub async fn process_value(&self, value: Value, cancel: &CancelToken) -> ProcessOutcome {
        match Operation::from_value(value.clone()) {
            Ok(op) => self.process_operation(op, cancel).await,
            Err(err) => {
                let op_type = value
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                tracing::warn!(error = %err, "Invalid operation rejected");
                let mut attempt = Attempt::new(op_type);
                attempt.advance(OperationStage::Rejected);
                attempt.fail(KernelError::InvalidOperation(err.to_string()))
            }
        }
    }

    /// Validate, execute, audit and (for medium/high criticality) checkpoint
    pub async fn process_operation(&self, op: Operation, cancel: &CancelToken) -> ProcessOutcome {
        let mut attempt = Attempt::new(&op.op_type);
        tracing::debug!(
            operation_id = %attempt.operation_id,
            op_type = %op.op_type,
            "Operation received"
        );

        // Nothing observable has happened yet, so nothing is audited
        if cancel.is_cancelled() {
            attempt.advance(OperationStage::Cancelled);
            return attempt.fail(KernelError::Cancelled);
        }

        if let Some(info) = self.lockdown.read().await.clone() {
            tracing::warn!(op_type = %op.op_type, "Operation refused during lockdown");
            attempt.advance(OperationStage::Rejected);
            return attempt.fail(KernelError::Lockdown(info.reason));
        }

        let verdict = self.detector.lock().await.check(&op);
        if !verdict.compliant {
            attempt.advance(OperationStage::Rejected);
            return self.handle_violation(attempt, &op, verdict, "validation").await;
        }
        attempt.advance(OperationStage::Validated);

        if cancel.is_cancelled() {
            attempt.advance(OperationStage::Cancelled);
            return attempt.fail(KernelError::Cancelled);
        }

        let handler = self.handlers.resolve(&op.op_type);
        let snapshot = self.stores.read().await.state.clone();
        let budget = match cancel.remaining() {
            Some(remaining) => remaining.min(self.config.handler_timeout()),
            None => self.config.handler_timeout(),
        };

        let output = match tokio::time::timeout(budget, handler.execute(&op, &snapshot)).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                let error = KernelError::ExecutionFailed(err.to_string());
                return self.handle_failure(attempt, &op, error).await;
            }
            Err(_) => {
                let error = KernelError::ExecutionTimeout(budget.as_millis() as u64);
                return self.handle_failure(attempt, &op, error).await;
            }
        };
        attempt.advance(OperationStage::Executed);

        let produced = json!({
            "result": output.result.clone(),
            "state_changes": output.state_changes.clone(),
        });
        let output_verdict = self.detector.lock().await.check_output(&produced);
        if !output_verdict.compliant {
            return self
                .handle_violation(attempt, &op, output_verdict, "execution")
                .await;
        }

        // Execution happened, so the outcome is audited but not applied
        if cancel.is_cancelled() {
            let data = json!({
                "operation_id": attempt.operation_id,
                "operation_type": op.op_type,
                "result": output.result.clone(),
                "cancelled": true,
            });
            match self.recorder.audit(events::DECISION, data, Vec::new()).await {
                Ok(id) => {
                    attempt.audit_ids.push(id);
                    attempt.advance(OperationStage::Audited);
                    attempt.advance(OperationStage::Cancelled);
                    return attempt.fail(KernelError::Cancelled);
                }
                Err(err) => {
                    self.note_error(&err).await;
                    return attempt.fail(err);
                }
            }
        }

        let data = json!({
            "operation_id": attempt.operation_id,
            "operation_type": op.op_type,
            "criticality": op.criticality(),
            "result": output.result.clone(),
        });
        let receipt = match self
            .recorder
            .commit(&op.op_type, output.state_changes, data)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::error!(op_type = %op.op_type, error = %err, "Decision not recorded");
                self.note_error(&err).await;
                return attempt.fail(err);
            }
        };
        attempt.audit_ids.push(receipt.audit_id);
        attempt.advance(OperationStage::Audited);

        let compliance = self.observe_health(&op, &mut attempt).await;

        if op.criticality().requires_checkpoint() {
            match self.recorder.checkpoint(compliance).await {
                Ok(checkpoint) => {
                    attempt.checkpoint_id = Some(checkpoint.id);
                    attempt.advance(OperationStage::Checkpointed);
                }
                Err(err) => {
                    tracing::error!(error = %err, "Checkpoint after operation failed");
                    self.note_error(&err).await;
                }
            }
        }

        tracing::info!(
            operation_id = %attempt.operation_id,
            op_type = %op.op_type,
            revision = receipt.revision,
            "Operation completed"
        );
        self.notifier.notify(KernelEvent::OperationCompleted {
            operation_id: attempt.operation_id,
            operation_type: op.op_type.clone(),
            checkpoint_id: attempt.checkpoint_id,
        });

        attempt.succeed(output.result)
    }

    async fn handle_violation(
        &self,
        mut attempt: Attempt,
        op: &Operation,
        verdict: Verdict,
        phase: &str,
    ) -> ProcessOutcome {
        attempt.violated = verdict.violated.clone();
        attempt.action = verdict.action;

        tracing::warn!(
            op_type = %op.op_type,
            phase,
            violated = ?verdict.violated,
            action = ?verdict.action,
            "Operation violated policy"
        );

        let data = json!({
            "operation_id": attempt.operation_id,
            "operation_type": op.op_type,
            "phase": phase,
            "violated": verdict.violated,
            "action": verdict.action,
            "scores": verdict.scores,
        });
        match self
            .recorder
            .audit(events::VIOLATION_ALERT, data, verdict.violated.clone())
            .await
        {
            Ok(id) => attempt.audit_ids.push(id),
            Err(err) => self.note_error(&err).await,
        }
        attempt.advance(OperationStage::ViolationHandled);

        if verdict.requires_rollback() {
            let trigger = if verdict.action == Some(Action::Lockdown) {
                RollbackTrigger::Lockdown
            } else {
                RollbackTrigger::CriticalViolation
            };
            let context = json!({
                "operation_id": attempt.operation_id,
                "operation_type": op.op_type,
                "violated": verdict.violated,
            });
            if let Ok(event) = self.rollback(trigger, context).await {
                attempt.restored_checkpoint_id = Some(event.restored_checkpoint_id);
                attempt.advance(OperationStage::RolledBack);
            }
        }

        if verdict.action == Some(Action::Lockdown) {
            self.engage_lockdown(format!(
                "{} violated {}",
                op.op_type,
                verdict.violated.join(", ")
            ))
            .await;
        }

        self.notifier.notify(KernelEvent::OperationRejected {
            operation_id: attempt.operation_id,
            operation_type: op.op_type.clone(),
            violated: verdict.violated.clone(),
            action: verdict.action,
        });

        attempt.fail(KernelError::ValidationRejected {
            codes: verdict.violated,
            action: verdict.action,
        })
    }

    async fn handle_failure(
        &self,
        mut attempt: Attempt,
        op: &Operation,
        error: KernelError,
    ) -> ProcessOutcome {
        attempt.advance(OperationStage::Failed);
        tracing::error!(op_type = %op.op_type, error = %error, "Operation execution failed");

        let data = json!({
            "operation_id": attempt.operation_id,
            "operation_type": op.op_type,
            "error": error.to_string(),
        });
        match self
            .recorder
            .audit(events::EXECUTION_FAILED, data, Vec::new())
            .await
        {
            Ok(id) => {
                attempt.audit_ids.push(id);
                attempt.advance(OperationStage::Audited);
            }
            Err(err) => self.note_error(&err).await,
        }

        attempt.fail(error)
    }

    /// Feed drift, integrity and compliance into the silent monitor
    ///
    /// Returns the compliance score used to classify a checkpoint.
    async fn observe_health(&self, op: &Operation, attempt: &mut Attempt) -> f64 {
        let compliance = self.detector.lock().await.overall_compliance();

        let mut metrics = op.metrics.clone();
        metrics.insert("overall_compliance".to_string(), compliance);
        let drift_score = self.drift.lock().await.observe(metrics);

        let integrity = self.integrity.validate();
        if !integrity.valid && self.mark_degraded(DegradedReason::ArtifactTampering).await {
            let tampered: Vec<String> = integrity
                .tampered
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            if let Err(err) = self
                .recorder
                .audit(events::INTEGRITY_ALERT, json!({ "tampered": tampered }), Vec::new())
                .await
            {
                self.note_error(&err).await;
            }
        }

        let mut silent = self.silent.lock().await;
        let observation = silent.observe_system_state(HealthSample {
            drift_score,
            integrity_valid: integrity.valid,
            compliance,
        });
        attempt.alert_level = Some(observation.alert_level);

        if observation.alert_level < AlertLevel::Concern {
            return compliance;
        }

        let actions = silent.trigger_self_healing(&observation.alerts);
        drop(silent);

        let data = json!({
            "operation_id": attempt.operation_id,
            "alert_level": observation.alert_level,
            "alerts": observation.alerts,
            "actions": actions,
        });
        match self.recorder.audit(events::SELF_HEALING, data, Vec::new()).await {
            Ok(id) => attempt.audit_ids.push(id),
            Err(err) => self.note_error(&err).await,
        }
        self.notifier.notify(KernelEvent::SelfHealingAdvised {
            level: observation.alert_level,
            actions: actions.into_iter().map(|a| a.action).collect(),
        });

        compliance
    }

    /// Restore the last SAFE checkpoint
    ///
    /// A missing SAFE checkpoint engages lockdown; a tampered one marks the
    /// kernel degraded. Either way the current state is left untouched.
    pub async fn rollback(
        &self,
        trigger: RollbackTrigger,
        context: Value,
    ) -> KernelResult<RollbackEvent> {
        match self.recorder.rollback(trigger, context).await {
            Ok(event) => {
                self.notifier.notify(KernelEvent::RollbackPerformed {
                    trigger,
                    checkpoint_id: event.restored_checkpoint_id,
                });
                Ok(event)
            }
            Err(err) => {
                tracing::error!(%trigger, error = %err, "Rollback failed");
                self.notifier.notify(KernelEvent::RollbackFailed {
                    trigger,
                    reason: err.to_string(),
                });
                match err {
                    KernelError::NoSafeCheckpoint => {
                        self.engage_lockdown("no safe checkpoint to roll back to".to_string())
                            .await
                    }
                    _ => self.note_error(&err).await,
                }
                Err(err)
            }
        }
    }

    async fn engage_lockdown(&self, reason: String) {
        let mut lockdown = self.lockdown.write().await;
        if lockdown.is_some() {
            return;
        }

        if let Err(err) = self
            .recorder
            .audit(events::LOCKDOWN_ENGAGED, json!({ "reason": reason }), Vec::new())
            .await
        {
            self.note_error(&err).await;
        }

        tracing::error!(reason = %reason, "Lockdown engaged");
        *lockdown = Some(LockdownInfo {
            reason: reason.clone(),
            engaged_at: Utc::now(),
        });
        self.notifier.notify(KernelEvent::LockdownEngaged { reason });
    }

    /// Lift a lockdown; returns false when none was engaged
    ///
    /// The release is audited before it takes effect, so a sealed trail
    /// keeps the kernel locked.
    pub async fn release_lockdown(&self, operator: &str) -> KernelResult<bool> {
        let mut lockdown = self.lockdown.write().await;
        let Some(info) = lockdown.as_ref() else {
            return Ok(false);
        };

        self.recorder
            .audit(
                events::LOCKDOWN_RELEASED,
                json!({ "operator": operator, "reason": info.reason }),
                Vec::new(),
            )
            .await?;

        *lockdown = None;
        tracing::warn!(operator, "Lockdown released");
        self.notifier.notify(KernelEvent::LockdownReleased {
            operator: operator.to_string(),
        });
        Ok(true)
    }

    /// Record a degraded reason; true when it was not already set
    async fn mark_degraded(&self, reason: DegradedReason) -> bool {
        let inserted = self.degraded.lock().await.insert(reason);
        if inserted {
            tracing::error!(%reason, "Kernel degraded");
            self.notifier.notify(KernelEvent::Degraded { reason });
        }
        inserted
    }

    async fn note_error(&self, err: &KernelError) {
        let reason = match err {
            KernelError::IntegrityFailure(_) => DegradedReason::CheckpointIntegrity,
            KernelError::ChainCorruption(_) => DegradedReason::ChainCorruption,
            _ => return,
        };
        self.mark_degraded(reason).await;
    }

    pub async fn status(&self) -> KernelResult<KernelStatus> {
        let compliance = self.detector.lock().await.compliance_report();
        let (drift_score, drift_trend) = {
            let drift = self.drift.lock().await;
            (drift.last_score(), drift.trend(DRIFT_TREND_WINDOW))
        };
        let alert_level = self
            .silent
            .lock()
            .await
            .last_observation()
            .map(|o| o.alert_level)
            .unwrap_or_default();
        let integrity = self.integrity.validate();
        let registry_valid = self.registry.verify_integrity();

        let (checkpoints, rollbacks, audit, state_revision, state_hash) = {
            let stores = self.stores.read().await;
            (
                stores.checkpoints.stats()?,
                stores.rollback.stats(),
                stores.audit.summary(),
                stores.state.revision,
                stores.state.state_hash(),
            )
        };

        if !integrity.valid {
            self.mark_degraded(DegradedReason::ArtifactTampering).await;
        }
        if !registry_valid {
            self.mark_degraded(DegradedReason::RegistryMismatch).await;
        }
        if !audit.chain_valid {
            self.mark_degraded(DegradedReason::ChainCorruption).await;
        }

        Ok(KernelStatus {
            overall_compliance: compliance.overall_compliance,
            total_violations: compliance.total_violations,
            per_rule_scores: compliance.per_rule_scores,
            recent_violations: compliance.recent_violations,
            checkpoints,
            rollbacks,
            drift_score,
            drift_trend,
            integrity_valid: integrity.valid,
            tampered: integrity.tampered,
            alert_level,
            audit,
            registry_hash: self.registry.registry_hash().to_string(),
            registry_valid,
            state_revision,
            state_hash,
            lockdown: self.lockdown.read().await.clone(),
            degraded: self.degraded().await,
            generated_at: Utc::now(),
        })
    }

    /// Pretty JSON status, recorded in the audit trail
    pub async fn generate_report(&self) -> KernelResult<String> {
        let status = self.status().await?;
        let report = status.to_pretty_json()?;

        let data = json!({
            "overall_compliance": status.overall_compliance,
            "total_violations": status.total_violations,
            "alert_level": status.alert_level,
            "degraded": status.degraded,
        });
        self.recorder
            .audit(events::COMPLIANCE_REPORT, data, Vec::new())
            .await?;

        Ok(report)
    }

    /// Walk the audit chain; a break seals the trail and degrades the kernel
    pub async fn verify_audit(&self) -> KernelResult<ChainReport> {
        let report = self.recorder.verify_audit().await?;
        if !report.valid {
            self.mark_degraded(DegradedReason::ChainCorruption).await;
        }
        Ok(report)
    }

    /// Most recent first
    pub async fn search_audit(
        &self,
        event_type: Option<&str>,
        principle: Option<&str>,
        limit: usize,
    ) -> Vec<AuditEntry> {
        self.stores
            .read()
            .await
            .audit
            .search(event_type, principle, limit)
    }

    pub async fn state(&self) -> SystemState {
        self.stores.read().await.state.clone()
    }

    pub async fn lockdown(&self) -> Option<LockdownInfo> {
        self.lockdown.read().await.clone()
    }

    pub async fn is_locked_down(&self) -> bool {
        self.lockdown.read().await.is_some()
    }

    pub async fn degraded(&self) -> Vec<DegradedReason> {
        self.degraded.lock().await.iter().copied().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.notifier.subscribe()
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

/// Lockdown persists across restarts through its audit entries
fn restore_lockdown(audit: &AuditTrail) -> Option<LockdownInfo> {
    let last = audit.last_of(&[events::LOCKDOWN_ENGAGED, events::LOCKDOWN_RELEASED])?;

    if last.event_type != events::LOCKDOWN_ENGAGED {
        return None;
    }

    let reason = last
        .data
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("restored from audit trail")
        .to_string();
    tracing::warn!(reason = %reason, "Lockdown restored from audit trail");

    Some(LockdownInfo {
        reason,
        engaged_at: last.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerError, HandlerOutput, OperationHandler};
    use async_trait::async_trait;

    async fn kernel() -> Orchestrator {
        Orchestrator::start(KernelConfig::default(), HandlerRegistry::with_defaults())
            .await
            .unwrap()
    }

    fn user_service() -> Operation {
        Operation::new("user_service")
            .with_reasoning("answer a support request")
            .with_audit_trail(true)
    }

    struct FailingHandler;

    #[async_trait]
    impl OperationHandler for FailingHandler {
        fn operation_type(&self) -> &str {
            "flaky"
        }

        async fn execute(
            &self,
            _op: &Operation,
            _state: &SystemState,
        ) -> Result<HandlerOutput, HandlerError> {
            Err(HandlerError::Failed("backend unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_start_records_system_start_and_genesis() {
        let kernel = kernel().await;

        let starts = kernel
            .search_audit(Some(events::SYSTEM_START), None, 10)
            .await;
        assert_eq!(starts.len(), 1);
        assert_eq!(
            starts[0].data["registry_hash"],
            json!(kernel.registry().registry_hash())
        );

        let status = kernel.status().await.unwrap();
        assert_eq!(status.checkpoints.total, 1);
        assert_eq!(status.checkpoints.safe, 1);
        assert!(!status.is_degraded());
    }

    #[tokio::test]
    async fn test_compliant_operation_path() {
        let kernel = kernel().await;
        let outcome = kernel
            .process_operation(user_service(), &CancelToken::new())
            .await;

        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(
            outcome.stages,
            vec![
                OperationStage::Received,
                OperationStage::Validated,
                OperationStage::Executed,
                OperationStage::Audited
            ]
        );
        assert_eq!(outcome.checkpoint_id, None);
        assert_eq!(outcome.alert_level, Some(AlertLevel::Normal));
        assert_eq!(kernel.state().await.revision, 1);
    }

    #[tokio::test]
    async fn test_invalid_value_rejected_without_audit() {
        let kernel = kernel().await;
        let before = kernel.search_audit(None, None, 100).await.len();

        let outcome = kernel
            .process_value(json!({"criticality": "low"}), &CancelToken::new())
            .await;

        assert!(!outcome.success);
        assert!(matches!(
            outcome.error,
            Some(KernelError::InvalidOperation(_))
        ));
        assert_eq!(outcome.final_stage(), OperationStage::Rejected);
        assert_eq!(kernel.search_audit(None, None, 100).await.len(), before);
    }

    #[tokio::test]
    async fn test_handler_failure_is_audited() {
        let handlers = HandlerRegistry::with_defaults().with_handler(Arc::new(FailingHandler));
        let kernel = Orchestrator::start(KernelConfig::default(), handlers)
            .await
            .unwrap();

        let op = Operation::new("flaky")
            .with_reasoning("retry the sync")
            .with_audit_trail(true);
        let outcome = kernel.process_operation(op, &CancelToken::new()).await;

        assert!(matches!(
            outcome.error,
            Some(KernelError::ExecutionFailed(_))
        ));
        assert_eq!(
            outcome.stages,
            vec![
                OperationStage::Received,
                OperationStage::Validated,
                OperationStage::Failed,
                OperationStage::Audited
            ]
        );
        assert_eq!(
            kernel
                .search_audit(Some(events::EXECUTION_FAILED), None, 10)
                .await
                .len(),
            1
        );
        assert_eq!(kernel.state().await.revision, 0);
    }

    #[tokio::test]
    async fn test_alert_violation_does_not_roll_back() {
        let kernel = kernel().await;
        // Missing reasoning violates explainability, an Alert-level rule
        let op = Operation::new("user_service").with_audit_trail(true);

        let outcome = kernel.process_operation(op, &CancelToken::new()).await;

        assert_eq!(outcome.violated, vec!["P-003".to_string()]);
        assert_eq!(outcome.action, Some(Action::Alert));
        assert_eq!(outcome.final_stage(), OperationStage::ViolationHandled);
        assert_eq!(outcome.restored_checkpoint_id, None);
        assert!(!kernel.is_locked_down().await);
    }

    #[tokio::test]
    async fn test_release_without_lockdown() {
        let kernel = kernel().await;
        assert!(!kernel.release_lockdown("ops").await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_report_is_audited() {
        let kernel = kernel().await;
        let report = kernel.generate_report().await.unwrap();

        let parsed: Value = serde_json::from_str(&report).unwrap();
        assert_eq!(parsed["overallCompliance"], json!(1.0));
        assert_eq!(
            kernel
                .search_audit(Some(events::COMPLIANCE_REPORT), None, 10)
                .await
                .len(),
            1
        );
    }
}
