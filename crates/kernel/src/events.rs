//! Audit event types written by the kernel

pub use warden_recovery::rollback::{
    EVENT_ROLLBACK as ROLLBACK, EVENT_ROLLBACK_FAILED as ROLLBACK_FAILED,
};

pub const SYSTEM_START: &str = "system_start";
pub const VIOLATION_ALERT: &str = "violation_alert";
pub const DECISION: &str = "decision";
pub const EXECUTION_FAILED: &str = "execution_failed";
pub const SELF_HEALING: &str = "self_healing";
pub const LOCKDOWN_ENGAGED: &str = "lockdown_engaged";
pub const LOCKDOWN_RELEASED: &str = "lockdown_released";
pub const COMPLIANCE_REPORT: &str = "compliance_report";
pub const INTEGRITY_ALERT: &str = "integrity_alert";
