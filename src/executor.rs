//! Boundary to the external durable execution engine. The manager only ever
//! requests a start or forwards a notification; step logic runs entirely on
//! the other side of this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{OrchestrationDescription, OrchestrationInstance, OrchestrationInstanceId};

/// Failure reported by the execution engine, tagged with the operation that
/// hit it. The manager propagates these verbatim; retry policy belongs to
/// callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation}: {message}")]
pub struct ExecutorError {
    pub operation: &'static str,
    pub message: String,
}

impl ExecutorError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait OrchestrationExecutor: Send + Sync {
    /// Request the engine to begin executing an instance. Returns `false`
    /// when an execution with this instance id is already registered there,
    /// which makes the call idempotent from the manager's point of view.
    async fn start_new_orchestration_instance(
        &self,
        description: &OrchestrationDescription,
        instance: &OrchestrationInstance,
    ) -> Result<bool, ExecutorError>;

    /// Best-effort signal to a running execution. Delivery and ordering are
    /// the engine's concern, not this crate's.
    async fn notify_orchestration_instance(
        &self,
        id: OrchestrationInstanceId,
        event_name: &str,
        data: &Value,
    ) -> Result<(), ExecutorError>;
}
