//! End-to-end behaviour of the kernel over real stores

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::tempdir;
use warden_core::{Criticality, Operation, SystemState};
use warden_kernel::events;
use warden_kernel::{
    CancelToken, DegradedReason, HandlerError, HandlerOutput, HandlerRegistry, KernelConfig,
    KernelError, KernelEvent, OperationHandler, OperationPool, OperationStage, Orchestrator,
};
use warden_monitor::AlertLevel;
use warden_recovery::{CheckpointPolicy, RollbackTrigger};
use warden_rules::Action;

async fn kernel() -> Orchestrator {
    kernel_with(KernelConfig::default(), HandlerRegistry::with_defaults()).await
}

async fn kernel_with(config: KernelConfig, handlers: HandlerRegistry) -> Orchestrator {
    Orchestrator::start(config, handlers).await.unwrap()
}

fn user_service() -> Operation {
    Operation::new("user_service")
        .with_reasoning("answer a support request")
        .with_audit_trail(true)
        .with_criticality(Criticality::Low)
}

fn configure(key: &str, value: Value) -> Operation {
    let mut changes = serde_json::Map::new();
    changes.insert(key.to_string(), value);
    Operation::new("configure")
        .with_reasoning("operator requested change")
        .with_audit_trail(true)
        .with_criticality(Criticality::Medium)
        .with_payload("changes", Value::Object(changes))
}

fn forced_action() -> Value {
    json!({"type": "forced_action", "data": {"coercive": "pattern"}})
}

/// Returns a fixed result and state change after an optional delay
struct ScriptedHandler {
    op_type: &'static str,
    result: Value,
    changes: BTreeMap<String, Value>,
    delay: Duration,
    cancel_on_run: Option<CancelToken>,
}

impl ScriptedHandler {
    fn new(op_type: &'static str, result: Value) -> Self {
        Self {
            op_type,
            result,
            changes: BTreeMap::new(),
            delay: Duration::ZERO,
            cancel_on_run: None,
        }
    }
}

#[async_trait]
impl OperationHandler for ScriptedHandler {
    fn operation_type(&self) -> &str {
        self.op_type
    }

    async fn execute(
        &self,
        _op: &Operation,
        _state: &SystemState,
    ) -> Result<HandlerOutput, HandlerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(token) = &self.cancel_on_run {
            token.cancel();
        }
        Ok(HandlerOutput {
            result: self.result.clone(),
            state_changes: self.changes.clone(),
        })
    }
}

fn scripted(op_type: &str) -> Operation {
    Operation::new(op_type)
        .with_reasoning("scripted")
        .with_audit_trail(true)
}

#[tokio::test]
async fn test_coercive_operation_rolls_back_and_locks_down() {
    let kernel = kernel().await;
    let mut events_rx = kernel.subscribe();

    let outcome = kernel
        .process_value(forced_action(), &CancelToken::new())
        .await;

    assert!(!outcome.success);
    assert!(outcome.violated.contains(&"P-001".to_string()));
    assert!(outcome.action.unwrap() >= Action::Rollback);
    assert_eq!(outcome.action, Some(Action::Lockdown));
    assert_eq!(
        outcome.stages,
        vec![
            OperationStage::Received,
            OperationStage::Rejected,
            OperationStage::ViolationHandled,
            OperationStage::RolledBack
        ]
    );
    assert_eq!(outcome.restored_checkpoint_id, Some(1));
    assert!(matches!(
        outcome.error,
        Some(KernelError::ValidationRejected { .. })
    ));
    assert!(kernel.is_locked_down().await);

    let alerts = kernel
        .search_audit(Some(events::VIOLATION_ALERT), Some("P-001"), 10)
        .await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].data["phase"], json!("validation"));
    assert_eq!(
        kernel.search_audit(Some(events::ROLLBACK), None, 10).await.len(),
        1
    );
    assert_eq!(
        kernel
            .search_audit(Some(events::LOCKDOWN_ENGAGED), None, 10)
            .await
            .len(),
        1
    );

    let mut seen = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(
        e,
        KernelEvent::RollbackPerformed {
            trigger: RollbackTrigger::Lockdown,
            ..
        }
    )));
    assert!(seen
        .iter()
        .any(|e| matches!(e, KernelEvent::LockdownEngaged { .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, KernelEvent::OperationRejected { .. })));
}

#[tokio::test]
async fn test_check_is_deterministic() {
    let kernel = kernel().await;
    let first = kernel
        .process_value(forced_action(), &CancelToken::new())
        .await;
    kernel.release_lockdown("ops").await.unwrap();
    let second = kernel
        .process_value(forced_action(), &CancelToken::new())
        .await;

    assert_eq!(first.violated, second.violated);
    assert_eq!(first.action, second.action);
}

#[tokio::test]
async fn test_lockdown_refuses_until_released() {
    let kernel = kernel().await;
    kernel
        .process_value(forced_action(), &CancelToken::new())
        .await;

    let refused = kernel
        .process_operation(user_service(), &CancelToken::new())
        .await;
    assert!(matches!(refused.error, Some(KernelError::Lockdown(_))));
    assert_eq!(
        refused.stages,
        vec![OperationStage::Received, OperationStage::Rejected]
    );

    assert!(kernel.release_lockdown("alice").await.unwrap());
    assert!(!kernel.is_locked_down().await);
    let released = kernel
        .search_audit(Some(events::LOCKDOWN_RELEASED), None, 10)
        .await;
    assert_eq!(released[0].data["operator"], json!("alice"));

    let accepted = kernel
        .process_operation(user_service(), &CancelToken::new())
        .await;
    assert!(accepted.success, "{:?}", accepted.error);
}

#[tokio::test]
async fn test_low_criticality_accepted_without_checkpoint() {
    let kernel = kernel().await;

    let outcome = kernel
        .process_operation(user_service(), &CancelToken::new())
        .await;

    assert!(outcome.success);
    assert!(outcome.violated.is_empty());
    assert_eq!(outcome.checkpoint_id, None);
    assert_eq!(
        outcome.result,
        Some(json!({"acknowledged": "user_service", "revision": 0}))
    );

    let status = kernel.status().await.unwrap();
    assert_eq!(status.checkpoints.total, 1);
    assert_eq!(status.total_violations, 0);
}

#[tokio::test]
async fn test_medium_criticality_checkpoints() {
    let kernel = kernel().await;

    let outcome = kernel
        .process_operation(configure("mode", json!("strict")), &CancelToken::new())
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.checkpoint_id, Some(2));
    assert_eq!(outcome.final_stage(), OperationStage::Checkpointed);

    let status = kernel.status().await.unwrap();
    assert_eq!(status.checkpoints.total, 2);
    assert_eq!(status.checkpoints.safe, 2);
    assert_eq!(kernel.state().await.get("mode"), Some(&json!("strict")));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempdir().unwrap();
    let config = KernelConfig::default().with_data_dir(dir.path());

    {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;
        let outcome = kernel
            .process_operation(configure("mode", json!("strict")), &CancelToken::new())
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
    }

    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;
    assert_eq!(kernel.state().await.get("mode"), Some(&json!("strict")));

    let report = kernel.verify_audit().await.unwrap();
    assert!(report.valid);
    assert_eq!(
        kernel
            .search_audit(Some(events::SYSTEM_START), None, 10)
            .await
            .len(),
        2
    );

    let status = kernel.status().await.unwrap();
    assert_eq!(status.checkpoints.total, 2);
    assert!(!status.is_degraded());
}

#[tokio::test]
async fn test_lockdown_survives_restart() {
    let dir = tempdir().unwrap();
    let config = KernelConfig::default().with_data_dir(dir.path());

    {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;
        kernel
            .process_value(forced_action(), &CancelToken::new())
            .await;
        assert!(kernel.is_locked_down().await);
    }

    {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;
        assert!(kernel.is_locked_down().await);
        assert!(kernel.release_lockdown("bob").await.unwrap());
    }

    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;
    assert!(!kernel.is_locked_down().await);
}

#[tokio::test]
async fn test_lockdown_survives_restarts_past_retention() {
    let dir = tempdir().unwrap();
    let config = KernelConfig {
        audit_retention: Some(3),
        ..KernelConfig::default().with_data_dir(dir.path())
    };

    {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;
        kernel
            .process_value(forced_action(), &CancelToken::new())
            .await;
        assert!(kernel.is_locked_down().await);
    }

    // Every start appends an entry, pushing the lockdown out of memory
    for _ in 0..5 {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;
        assert!(kernel.is_locked_down().await);
    }

    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;
    assert!(kernel
        .search_audit(Some(events::LOCKDOWN_ENGAGED), None, 10)
        .await
        .is_empty());
    assert!(kernel.is_locked_down().await);

    let refused = kernel
        .process_operation(user_service(), &CancelToken::new())
        .await;
    assert!(matches!(refused.error, Some(KernelError::Lockdown(_))));
}

#[tokio::test]
async fn test_restart_keeps_rolled_back_state() {
    let dir = tempdir().unwrap();
    let config = KernelConfig::default().with_data_dir(dir.path());

    {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;

        let strict = kernel
            .process_operation(configure("mode", json!("strict")), &CancelToken::new())
            .await;
        assert_eq!(strict.checkpoint_id, Some(2));

        // Ten unexplained operations bring compliance below the SAFE line
        for _ in 0..10 {
            let unexplained = Operation::new("user_service").with_audit_trail(true);
            kernel
                .process_operation(unexplained, &CancelToken::new())
                .await;
        }

        let loose = kernel
            .process_operation(configure("mode", json!("loose")), &CancelToken::new())
            .await;
        assert!(loose.success, "{:?}", loose.error);
        assert_eq!(loose.checkpoint_id, Some(3));
        assert_eq!(kernel.status().await.unwrap().checkpoints.unknown, 1);

        let sabotage = kernel
            .process_operation(scripted("sabotage_plan"), &CancelToken::new())
            .await;
        assert_eq!(sabotage.action, Some(Action::Rollback));
        assert_eq!(sabotage.restored_checkpoint_id, Some(2));
        assert_eq!(kernel.state().await.get("mode"), Some(&json!("strict")));
    }

    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;
    assert_eq!(kernel.state().await.get("mode"), Some(&json!("strict")));
    assert!(!kernel.status().await.unwrap().is_degraded());
}

#[tokio::test]
async fn test_tampered_audit_file_degrades_kernel() {
    let dir = tempdir().unwrap();
    let config = KernelConfig::default().with_data_dir(dir.path());

    {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;
        kernel
            .process_operation(user_service(), &CancelToken::new())
            .await;
    }

    let path = config.audit_path().unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("\"rules\":9"));
    std::fs::write(&path, content.replacen("\"rules\":9", "\"rules\":8", 1)).unwrap();

    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;
    assert_eq!(kernel.degraded().await, vec![DegradedReason::ChainCorruption]);

    let report = kernel.verify_audit().await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.broken_at, Some(1));

    // Writes are refused until the file is repaired
    let outcome = kernel
        .process_operation(user_service(), &CancelToken::new())
        .await;
    assert!(matches!(
        outcome.error,
        Some(KernelError::ChainCorruption(_))
    ));
    assert_eq!(kernel.state().await.revision, 0);

    let status = kernel.status().await.unwrap();
    assert!(status.is_degraded());
    assert!(!status.audit.chain_valid);
}

#[tokio::test]
async fn test_tampered_checkpoint_refuses_rollback() {
    let dir = tempdir().unwrap();
    let config = KernelConfig::default().with_data_dir(dir.path());

    {
        let kernel = kernel_with(config.clone(), HandlerRegistry::with_defaults()).await;
        let outcome = kernel
            .process_operation(configure("mode", json!("strict")), &CancelToken::new())
            .await;
        assert_eq!(outcome.checkpoint_id, Some(2));
    }

    let conn = rusqlite::Connection::open(config.checkpoint_path().unwrap()).unwrap();
    conn.execute(
        "UPDATE checkpoints SET state_json = replace(state_json, 'strict', 'loose') WHERE id = 2",
        [],
    )
    .unwrap();
    drop(conn);

    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;
    assert!(kernel
        .degraded()
        .await
        .contains(&DegradedReason::CheckpointIntegrity));
    // The tampered snapshot is never loaded
    assert_eq!(kernel.state().await.get("mode"), None);

    let result = kernel
        .rollback(RollbackTrigger::Manual, json!({"reason": "test"}))
        .await;
    assert!(matches!(result, Err(KernelError::IntegrityFailure(_))));
    assert_eq!(
        kernel
            .search_audit(Some(events::ROLLBACK_FAILED), None, 10)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_missing_safe_checkpoint_engages_lockdown() {
    let config = KernelConfig {
        // Nothing can reach SAFE, so the genesis checkpoint is UNKNOWN
        checkpoint: CheckpointPolicy {
            safe_threshold: 1.5,
            ..CheckpointPolicy::default()
        },
        ..KernelConfig::default()
    };
    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;

    let op = json!({
        "type": "demolition",
        "reasoning": "destroy the archive",
        "audit_trail": true
    });
    let outcome = kernel.process_value(op, &CancelToken::new()).await;

    assert_eq!(outcome.violated, vec!["P-006".to_string()]);
    assert_eq!(outcome.action, Some(Action::Rollback));
    assert_eq!(outcome.restored_checkpoint_id, None);
    assert_eq!(outcome.final_stage(), OperationStage::ViolationHandled);
    assert!(kernel.is_locked_down().await);
}

#[tokio::test]
async fn test_pool_keeps_chain_ordered() {
    let kernel = Arc::new(kernel().await);
    let pool = Arc::new(OperationPool::spawn(kernel.clone(), 4, 16));

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(
            async move { pool.submit(user_service()).await },
        ));
    }
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
    }

    assert_eq!(kernel.state().await.revision, 40);
    assert_eq!(
        kernel
            .search_audit(Some(events::DECISION), None, 100)
            .await
            .len(),
        40
    );
    let report = kernel.verify_audit().await.unwrap();
    assert!(report.valid);
    assert_eq!(report.verified_entries, 41);

    if let Ok(pool) = Arc::try_unwrap(pool) {
        pool.shutdown().await;
    }
}

#[tokio::test]
async fn test_cancel_before_execution_writes_nothing() {
    let kernel = kernel().await;
    let before = kernel.search_audit(None, None, 1000).await.len();

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = kernel.process_operation(user_service(), &cancel).await;

    assert_eq!(outcome.error, Some(KernelError::Cancelled));
    assert_eq!(
        outcome.stages,
        vec![OperationStage::Received, OperationStage::Cancelled]
    );
    assert_eq!(kernel.search_audit(None, None, 1000).await.len(), before);
}

#[tokio::test]
async fn test_cancel_after_execution_is_audited_not_applied() {
    let cancel = CancelToken::new();
    let mut handler = ScriptedHandler::new("sync", json!({"synced": 3}));
    handler.changes.insert("synced".to_string(), json!(3));
    handler.cancel_on_run = Some(cancel.clone());
    let handlers = HandlerRegistry::with_defaults().with_handler(Arc::new(handler));
    let kernel = kernel_with(KernelConfig::default(), handlers).await;

    let outcome = kernel.process_operation(scripted("sync"), &cancel).await;

    assert_eq!(outcome.error, Some(KernelError::Cancelled));
    assert_eq!(
        outcome.stages,
        vec![
            OperationStage::Received,
            OperationStage::Validated,
            OperationStage::Executed,
            OperationStage::Audited,
            OperationStage::Cancelled
        ]
    );
    let decisions = kernel
        .search_audit(Some(events::DECISION), None, 10)
        .await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].data["cancelled"], json!(true));
    assert_eq!(kernel.state().await.get("synced"), None);
}

#[tokio::test]
async fn test_handler_timeout() {
    let mut handler = ScriptedHandler::new("slow", json!({}));
    handler.delay = Duration::from_millis(500);
    let handlers = HandlerRegistry::with_defaults().with_handler(Arc::new(handler));
    let config = KernelConfig {
        handler_timeout_ms: 20,
        ..KernelConfig::default()
    };
    let kernel = kernel_with(config, handlers).await;

    let outcome = kernel
        .process_operation(scripted("slow"), &CancelToken::new())
        .await;

    assert_eq!(outcome.error, Some(KernelError::ExecutionTimeout(20)));
    assert_eq!(outcome.final_stage(), OperationStage::Audited);
    assert!(outcome.passed_through(OperationStage::Failed));
    assert_eq!(
        kernel
            .search_audit(Some(events::EXECUTION_FAILED), None, 10)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_harmful_output_rolls_back() {
    let mut handler = ScriptedHandler::new("generate", json!({"plan": "build a weapon"}));
    handler.changes.insert("plan".to_string(), json!("armed"));
    let handlers = HandlerRegistry::with_defaults().with_handler(Arc::new(handler));
    let kernel = kernel_with(KernelConfig::default(), handlers).await;

    let outcome = kernel
        .process_operation(scripted("generate"), &CancelToken::new())
        .await;

    assert_eq!(outcome.violated, vec!["P-006".to_string()]);
    assert_eq!(outcome.action, Some(Action::Rollback));
    assert_eq!(
        outcome.stages,
        vec![
            OperationStage::Received,
            OperationStage::Validated,
            OperationStage::Executed,
            OperationStage::ViolationHandled,
            OperationStage::RolledBack
        ]
    );
    assert_eq!(kernel.state().await.get("plan"), None);
    assert!(!kernel.is_locked_down().await);

    let alerts = kernel
        .search_audit(Some(events::VIOLATION_ALERT), Some("P-006"), 10)
        .await;
    assert_eq!(alerts[0].data["phase"], json!("execution"));
}

#[tokio::test]
async fn test_drift_triggers_self_healing() {
    let mut config = KernelConfig::default();
    config.drift.baseline.insert("latency_ms".to_string(), 100.0);
    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;

    // latency drift 0.5, compliance drift 0.0, mean 0.25
    let op = user_service().with_metric("latency_ms", 150.0);
    let outcome = kernel.process_operation(op, &CancelToken::new()).await;

    assert!(outcome.success);
    assert_eq!(outcome.alert_level, Some(AlertLevel::Concern));

    let healing = kernel
        .search_audit(Some(events::SELF_HEALING), None, 10)
        .await;
    assert_eq!(healing.len(), 1);
    assert_eq!(healing[0].data["actions"][0]["action"], json!("drift correction"));

    let status = kernel.status().await.unwrap();
    assert!((status.drift_score - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_artifact_tampering_degrades_kernel() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("policy.cfg");
    std::fs::write(&artifact, b"strict").unwrap();

    let config = KernelConfig {
        integrity_manifest: vec![artifact.clone()],
        ..KernelConfig::default()
    };
    let kernel = kernel_with(config, HandlerRegistry::with_defaults()).await;
    assert!(kernel.status().await.unwrap().integrity_valid);

    std::fs::write(&artifact, b"loose").unwrap();
    let outcome = kernel
        .process_operation(user_service(), &CancelToken::new())
        .await;

    assert_eq!(outcome.alert_level, Some(AlertLevel::InterventionNeeded));
    assert_eq!(
        kernel.degraded().await,
        vec![DegradedReason::ArtifactTampering]
    );
    assert_eq!(
        kernel
            .search_audit(Some(events::INTEGRITY_ALERT), None, 10)
            .await
            .len(),
        1
    );

    let status = kernel.status().await.unwrap();
    assert!(!status.integrity_valid);
    assert_eq!(status.tampered, vec![artifact]);
}

#[tokio::test]
async fn test_status_json_shape() {
    let kernel = kernel().await;
    kernel
        .process_operation(user_service(), &CancelToken::new())
        .await;

    let status = serde_json::to_value(kernel.status().await.unwrap()).unwrap();

    assert_eq!(status["overallCompliance"], json!(1.0));
    assert_eq!(status["totalViolations"], json!(0));
    assert_eq!(status["perRuleScores"]["P-001"], json!(1.0));
    assert_eq!(
        status["checkpoints"],
        json!({"total": 1, "safe": 1, "unsafe": 0, "unknown": 0})
    );
    assert_eq!(status["rollbacks"]["total"], json!(0));
    assert_eq!(status["driftScore"], json!(0.0));
    assert_eq!(status["integrityValid"], json!(true));
    assert_eq!(status["stateRevision"], json!(1));
    assert_eq!(status["lockdown"], Value::Null);
    assert_eq!(status["degraded"], json!([]));
}
