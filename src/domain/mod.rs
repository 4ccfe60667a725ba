//! Pure domain model: descriptions, instances, step instances, and their
//! lifecycle state machines. No I/O lives here; every timestamp comes in
//! through [`crate::clock::Clock`] and every mutation goes through a
//! transition method that checks its precondition.

mod description;
mod identity;
mod instance;
mod parameter;
mod step;

pub use description::{
    DescriptionError, OrchestrationDescription, OrchestrationDescriptionBuilder,
    OrchestrationDescriptionId, OrchestrationDescriptionUniqueName, StepDescription,
};
pub use identity::{ActorId, OperatingIdentity, UserId};
pub use instance::{
    CreateInstanceError, IdempotencyKey, InstanceLifecycleState, InstanceTerminationState,
    MessageCorrelation, OrchestrationInstance, OrchestrationInstanceId,
    OrchestrationInstanceLifecycle,
};
pub use parameter::{ParameterDefinition, ParameterError, ParameterValue};
pub use step::{StepInstance, StepInstanceLifecycle, StepLifecycleState, StepTerminationState};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque optimistic-concurrency token carried by every aggregate.
///
/// Captured at load time and checked by the store at commit; the store
/// assigns a fresh token on every committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyToken(Uuid);

impl ConcurrencyToken {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Failure raised by a lifecycle transition whose precondition does not hold.
///
/// Transitions are never silent no-ops: a caller invoking one out of order
/// gets this error back and the state machine is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {attempted} while lifecycle state is {actual}")]
    InvalidState {
        attempted: &'static str,
        actual: &'static str,
    },
}
