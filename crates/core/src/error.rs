//! Operation boundary errors

use thiserror::Error;

/// Errors raised while turning raw input into an [`Operation`](crate::Operation)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Operation must be a JSON object")]
    NotAnObject,

    #[error("Operation is missing required field 'type'")]
    MissingType,

    #[error("Operation field 'type' must be a non-empty string")]
    InvalidType,

    #[error("Invalid operation field: {0}")]
    InvalidField(String),
}
