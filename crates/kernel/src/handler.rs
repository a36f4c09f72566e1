//! Operation handlers - the pluggable domain logic, keyed by operation type
//!
//! Handlers see a read-only snapshot of `SystemState` and describe the
//! changes they want; the recorder applies them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use warden_core::{Operation, SystemState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub result: Value,
    /// Applied to `SystemState` after the result passes the output check
    #[serde(default)]
    pub state_changes: BTreeMap<String, Value>,
}

impl HandlerOutput {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            state_changes: BTreeMap::new(),
        }
    }

    pub fn with_change(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state_changes.insert(key.into(), value);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Operation type this handler serves
    fn operation_type(&self) -> &str;

    async fn execute(
        &self,
        op: &Operation,
        state: &SystemState,
    ) -> Result<HandlerOutput, HandlerError>;
}

/// Fallback for operation types with no registered handler
pub struct AcknowledgeHandler;

#[async_trait]
impl OperationHandler for AcknowledgeHandler {
    fn operation_type(&self) -> &str {
        "*"
    }

    async fn execute(
        &self,
        op: &Operation,
        state: &SystemState,
    ) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::new(json!({
            "acknowledged": op.op_type,
            "revision": state.revision,
        })))
    }
}

/// Writes the `changes` object of the payload into `SystemState`
pub struct ConfigureHandler;

#[async_trait]
impl OperationHandler for ConfigureHandler {
    fn operation_type(&self) -> &str {
        "configure"
    }

    async fn execute(
        &self,
        op: &Operation,
        _state: &SystemState,
    ) -> Result<HandlerOutput, HandlerError> {
        let changes = match op.payload.get("changes") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(HandlerError::InvalidPayload(
                    "changes must be an object".to_string(),
                ))
            }
            None => return Err(HandlerError::InvalidPayload("missing changes".to_string())),
        };

        let keys: Vec<&String> = changes.keys().collect();
        let result = json!({ "configured": keys });
        Ok(HandlerOutput {
            result,
            state_changes: changes.into_iter().collect(),
        })
    }
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
    fallback: Arc<dyn OperationHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Registry that acknowledges every operation
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(AcknowledgeHandler),
        }
    }

    /// Registry with the built-in `configure` handler
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ConfigureHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn OperationHandler>) {
        let op_type = handler.operation_type().to_string();
        if self.handlers.insert(op_type.clone(), handler).is_some() {
            tracing::warn!(op_type = %op_type, "Operation handler replaced");
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn OperationHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn set_fallback(&mut self, handler: Arc<dyn OperationHandler>) {
        self.fallback = handler;
    }

    pub fn resolve(&self, op_type: &str) -> Arc<dyn OperationHandler> {
        self.handlers
            .get(op_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn operation_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
