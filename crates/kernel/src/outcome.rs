//! Result of processing one operation

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use warden_monitor::AlertLevel;
use warden_rules::Action;

use crate::error::KernelError;
use crate::stage::{OperationStage, StageTracker};

/// Always produced, whether the operation was applied or refused
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub operation_id: Uuid,
    pub operation_type: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<KernelError>,
    pub violated: Vec<String>,
    pub action: Option<Action>,
    pub stages: Vec<OperationStage>,
    pub audit_ids: Vec<u64>,
    pub checkpoint_id: Option<u64>,
    pub restored_checkpoint_id: Option<u64>,
    pub alert_level: Option<AlertLevel>,
}

impl ProcessOutcome {
    pub fn final_stage(&self) -> OperationStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(OperationStage::Received)
    }

    pub fn passed_through(&self, stage: OperationStage) -> bool {
        self.stages.contains(&stage)
    }
}

/// In-flight bookkeeping for one operation
pub(crate) struct Attempt {
    pub operation_id: Uuid,
    pub operation_type: String,
    pub stages: StageTracker,
    pub audit_ids: Vec<u64>,
    pub violated: Vec<String>,
    pub action: Option<Action>,
    pub checkpoint_id: Option<u64>,
    pub restored_checkpoint_id: Option<u64>,
    pub alert_level: Option<AlertLevel>,
}

impl Attempt {
    pub fn new(operation_type: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            operation_type: operation_type.into(),
            stages: StageTracker::new(),
            audit_ids: Vec::new(),
            violated: Vec::new(),
            action: None,
            checkpoint_id: None,
            restored_checkpoint_id: None,
            alert_level: None,
        }
    }

    pub fn advance(&mut self, stage: OperationStage) {
        self.stages.advance(stage);
    }

    pub fn succeed(self, result: Value) -> ProcessOutcome {
        self.finish(Some(result), None)
    }

    pub fn fail(self, error: KernelError) -> ProcessOutcome {
        self.finish(None, Some(error))
    }

    fn finish(self, result: Option<Value>, error: Option<KernelError>) -> ProcessOutcome {
        ProcessOutcome {
            operation_id: self.operation_id,
            operation_type: self.operation_type,
            success: error.is_none(),
            result,
            error,
            violated: self.violated,
            action: self.action,
            stages: self.stages.into_path(),
            audit_ids: self.audit_ids,
            checkpoint_id: self.checkpoint_id,
            restored_checkpoint_id: self.restored_checkpoint_id,
            alert_level: self.alert_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_outcome_keeps_path() {
        let mut attempt = Attempt::new("forced_action");
        attempt.advance(OperationStage::Rejected);
        attempt.advance(OperationStage::ViolationHandled);
        let outcome = attempt.fail(KernelError::Cancelled);

        assert!(!outcome.success);
        assert_eq!(outcome.final_stage(), OperationStage::ViolationHandled);
        assert!(outcome.passed_through(OperationStage::Rejected));
        assert_eq!(
            outcome.stages,
            vec![
                OperationStage::Received,
                OperationStage::Rejected,
                OperationStage::ViolationHandled
            ]
        );
    }

    #[test]
    fn test_outcome_json_is_camel_case() {
        let outcome = Attempt::new("user_service").succeed(json!({"ok": true}));
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value["operationType"], json!("user_service"));
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["stages"], json!(["received"]));
    }
}
