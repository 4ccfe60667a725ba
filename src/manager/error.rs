use crate::domain::{
    CreateInstanceError, LifecycleError, OrchestrationDescriptionId,
    OrchestrationDescriptionUniqueName, OrchestrationInstanceId,
};
use crate::executor::ExecutorError;
use crate::store::StoreError;

/// Failure taxonomy of the command layer. Every command fails synchronously
/// with one of these; nothing is logged-and-swallowed except the documented
/// silent-mode path in notify.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The unique name resolves to no registered, enabled description.
    #[error("no enabled orchestration description registered as {unique_name}")]
    UnknownOrDisabledDescription {
        unique_name: OrchestrationDescriptionUniqueName,
    },
    #[error("orchestration description {unique_name} cannot be scheduled")]
    NotSchedulable {
        unique_name: OrchestrationDescriptionUniqueName,
    },
    #[error("orchestration description {unique_name} is disabled")]
    DisabledDescription {
        unique_name: OrchestrationDescriptionUniqueName,
    },
    #[error("input parameter does not match the parameter definition of {unique_name}")]
    InvalidParameter {
        unique_name: OrchestrationDescriptionUniqueName,
    },
    #[error("step {sequence} does not exist or cannot be skipped")]
    InvalidSkipStep { sequence: u32 },
    #[error("orchestration instance {id} was not found")]
    InstanceNotFound { id: OrchestrationInstanceId },
    #[error("orchestration description {id} was not found")]
    DescriptionNotFound { id: OrchestrationDescriptionId },
    /// The instance is not pending for a scheduled start, so the scheduler
    /// sweep invoked this command out of order.
    #[error("orchestration instance {id} is not startable")]
    NotStartable { id: OrchestrationInstanceId },
    #[error("orchestration instance {id} is not cancelable")]
    NotCancelable { id: OrchestrationInstanceId },
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl From<CreateInstanceError> for CommandError {
    fn from(err: CreateInstanceError) -> Self {
        match err {
            CreateInstanceError::DescriptionDisabled { unique_name } => {
                Self::UnknownOrDisabledDescription { unique_name }
            }
            CreateInstanceError::InvalidSkipStep { sequence } => {
                Self::InvalidSkipStep { sequence }
            }
        }
    }
}
