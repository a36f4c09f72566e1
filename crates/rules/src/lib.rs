//! Warden Rules - policy principles and violation detection
//!
//! ## Key Components
//!
//! - [`rule::Rule`] - a named principle with detection patterns and a response
//! - [`action::Action`] - response lattice, `LogOnly < Alert < Suspend < Rollback < Lockdown`
//! - [`catalog::standard_rules`] - the fixed principle set loaded at startup
//! - [`registry::RuleRegistry`] - immutable, hash-verified catalog
//! - [`detector::ViolationDetector`] - scores operations against every rule

pub mod action;
pub mod catalog;
pub mod detector;
pub mod error;
pub mod registry;
pub mod rule;

pub use action::Action;
pub use catalog::standard_rules;
pub use detector::{ComplianceReport, Verdict, ViolationDetector, ViolationReport};
pub use error::RuleError;
pub use registry::RuleRegistry;
pub use rule::{Heuristic, Rule};
