//! CLI commands

use std::io::Read;
use std::path::Path;

use serde_json::{json, Value};
use warden_recovery::RollbackTrigger;
use warden_rules::RuleRegistry;

use crate::cancel::CancelToken;
use crate::orchestrator::Orchestrator;

/// Read operations from a file (or stdin for "-") and process them in order
///
/// Returns whether every operation succeeded.
pub async fn process(orchestrator: &Orchestrator, input: &Path) -> Result<bool, anyhow::Error> {
    let raw = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input)?
    };

    let operations = match serde_json::from_str::<Value>(&raw)? {
        Value::Array(items) => items,
        single => vec![single],
    };

    let mut all_ok = true;
    for value in operations {
        let outcome = orchestrator.process_value(value, &CancelToken::new()).await;
        all_ok &= outcome.success;

        if outcome.success {
            println!("✅ {} ({})", outcome.operation_type, outcome.operation_id);
        } else {
            println!("❌ {} ({})", outcome.operation_type, outcome.operation_id);
        }
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    Ok(all_ok)
}

pub async fn status(orchestrator: &Orchestrator) -> Result<(), anyhow::Error> {
    let report = orchestrator.generate_report().await?;
    println!("{}", report);
    Ok(())
}

/// Verify the audit hash chain
pub async fn verify(orchestrator: &Orchestrator) -> Result<bool, anyhow::Error> {
    let report = orchestrator.verify_audit().await?;

    if report.valid {
        println!(
            "✅ Audit chain verified ({} entries)",
            report.verified_entries
        );
    } else {
        println!(
            "❌ Audit chain broken at entry {}: {}",
            report
                .broken_at
                .map_or_else(|| "?".to_string(), |id| id.to_string()),
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(report.valid)
}

pub async fn search(
    orchestrator: &Orchestrator,
    event_type: Option<&str>,
    principle: Option<&str>,
    limit: usize,
) -> Result<(), anyhow::Error> {
    let entries = orchestrator.search_audit(event_type, principle, limit).await;

    if entries.is_empty() {
        println!("No matching audit entries");
        return Ok(());
    }

    println!("📋 {} entries (most recent first):", entries.len());
    for entry in &entries {
        println!(
            "  #{} {} {} {}",
            entry.id,
            entry.timestamp.to_rfc3339(),
            entry.event_type,
            if entry.principles.is_empty() {
                String::new()
            } else {
                format!("[{}]", entry.principles.join(", "))
            }
        );
    }
    Ok(())
}

/// Manually restore the last SAFE checkpoint
pub async fn rollback(orchestrator: &Orchestrator, reason: &str) -> Result<(), anyhow::Error> {
    let event = orchestrator
        .rollback(RollbackTrigger::Manual, json!({ "reason": reason }))
        .await?;

    println!(
        "✅ Rolled back to checkpoint {}",
        event.restored_checkpoint_id
    );
    Ok(())
}

/// Print the rule catalog
pub fn rules() -> Result<(), anyhow::Error> {
    let registry = RuleRegistry::load()?;

    println!(
        "📜 {} rules (registry hash {})",
        registry.len(),
        registry.registry_hash()
    );
    for rule in registry.rules() {
        println!(
            "  {} {:<24} threshold {:.2}  action {}",
            rule.code, rule.name, rule.threshold, rule.action
        );
    }
    Ok(())
}

pub async fn release_lockdown(
    orchestrator: &Orchestrator,
    operator: &str,
) -> Result<(), anyhow::Error> {
    if orchestrator.release_lockdown(operator).await? {
        println!("✅ Lockdown released by {}", operator);
    } else {
        println!("No lockdown engaged");
    }
    Ok(())
}
