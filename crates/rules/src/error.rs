//! Rule registry errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule set is empty")]
    EmptyRegistry,

    #[error("Rule code cannot be empty")]
    EmptyCode,

    #[error("Duplicate rule code: {0}")]
    DuplicateCode(String),

    #[error("Rule {code} has threshold {threshold} outside (0, 1]")]
    InvalidThreshold { code: String, threshold: f64 },

    #[error("Rule {0} has an empty detection pattern")]
    EmptyPattern(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
