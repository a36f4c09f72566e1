//! The standard principle catalog
//!
//! Detection is keyword matching plus a few field-presence checks. It is not
//! a judgment of intent.

use crate::action::Action;
use crate::rule::{Heuristic, Rule};

pub const NON_COERCION: &str = "P-001";
pub const TRANSPARENCY: &str = "P-002";
pub const EXPLAINABILITY: &str = "P-003";
pub const STAKEHOLDER_INCLUSION: &str = "P-004";
pub const PRIVACY: &str = "P-005";
pub const HARM_PREVENTION: &str = "P-006";
pub const AUTONOMY: &str = "P-007";
pub const FAIRNESS: &str = "P-008";
pub const ETERNAL_WITNESS: &str = "P-009";

/// Build the fixed rule set
pub fn standard_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            NON_COERCION,
            "Non-Coercion",
            "Operations must not force, threaten or manipulate participants",
            0.3,
            Action::Lockdown,
        )
        .with_patterns(&["coerc", "forced", "threaten", "blackmail", "manipulat"]),
        Rule::new(
            TRANSPARENCY,
            "Transparency",
            "Operations must be open to inspection and carry an audit trail flag",
            0.6,
            Action::Alert,
        )
        .with_patterns(&["hidden", "conceal", "covert", "obfuscat"])
        .with_heuristic(Heuristic::RequiresKey {
            key: "audit_trail".to_string(),
            penalty: 0.4,
        }),
        Rule::new(
            EXPLAINABILITY,
            "Explainability",
            "Every operation must state its reasoning",
            0.5,
            Action::Alert,
        )
        .with_patterns(&["black_box", "unexplained", "no_reason"])
        .with_heuristic(Heuristic::RequiresReasoning { penalty: 0.5 }),
        Rule::new(
            STAKEHOLDER_INCLUSION,
            "Stakeholder Inclusion",
            "Governance decisions require stakeholder consultation",
            0.5,
            Action::Suspend,
        )
        .with_patterns(&["unilateral", "bypass_consent", "exclude_stakeholders"])
        .with_heuristic(Heuristic::RequiresConsultation {
            op_type: "governance_decision".to_string(),
            penalty: 0.5,
        }),
        Rule::new(
            PRIVACY,
            "Privacy",
            "Operations must not surveil or harvest personal data",
            0.6,
            Action::Suspend,
        )
        .with_patterns(&["surveil", "track_user", "harvest_data", "personal_data", "doxx"]),
        Rule::new(
            HARM_PREVENTION,
            "Harm Prevention",
            "Operations must not cause or enable harm",
            0.3,
            Action::Rollback,
        )
        .with_patterns(&["harm", "weapon", "destroy", "exploit", "sabotage"]),
        Rule::new(
            AUTONOMY,
            "Autonomy Preservation",
            "Operations must not override or deceive the people they serve",
            0.6,
            Action::Alert,
        )
        .with_patterns(&["override_user", "deceive", "dark_pattern", "addictive"]),
        Rule::new(
            FAIRNESS,
            "Fairness",
            "Operations must not discriminate",
            0.6,
            Action::Alert,
        )
        .with_patterns(&["discriminat", "segregat", "biased"]),
        Rule::new(
            ETERNAL_WITNESS,
            "Eternal Witness",
            "The audit record is append-only and must never be erased or rewritten",
            0.3,
            Action::Lockdown,
        )
        .with_patterns(&[
            "delete_audit",
            "erase_log",
            "tamper",
            "rewrite_history",
            "purge_records",
        ]),
    ]
}
