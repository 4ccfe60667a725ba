use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LifecycleError, StepDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepLifecycleState {
    Pending,
    Running,
    Terminated,
}

impl StepLifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Terminated => "Terminated",
        }
    }
}

impl std::fmt::Display for StepLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepTerminationState {
    Succeeded,
    Failed,
    Skipped,
}

/// State machine for one step instance: `Pending → Running → Terminated`.
///
/// Skip-at-creation is the one shortcut: a skippable step requested for skip
/// goes straight to `Terminated/Skipped` with both timestamps pinned to the
/// owning instance's creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInstanceLifecycle {
    state: StepLifecycleState,
    termination_state: Option<StepTerminationState>,
    started_at: Option<DateTime<Utc>>,
    terminated_at: Option<DateTime<Utc>>,
}

impl StepInstanceLifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: StepLifecycleState::Pending,
            termination_state: None,
            started_at: None,
            terminated_at: None,
        }
    }

    pub fn state(&self) -> StepLifecycleState {
        self.state
    }

    pub fn termination_state(&self) -> Option<StepTerminationState> {
        self.termination_state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn terminated_at(&self) -> Option<DateTime<Utc>> {
        self.terminated_at
    }

    pub fn transition_to_running(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if self.state != StepLifecycleState::Pending {
            return Err(LifecycleError::InvalidState {
                attempted: "start step",
                actual: self.state.as_str(),
            });
        }
        self.state = StepLifecycleState::Running;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn transition_to_terminated(
        &mut self,
        now: DateTime<Utc>,
        result: StepTerminationState,
    ) -> Result<(), LifecycleError> {
        if self.state != StepLifecycleState::Running {
            return Err(LifecycleError::InvalidState {
                attempted: "terminate step",
                actual: self.state.as_str(),
            });
        }
        self.state = StepLifecycleState::Terminated;
        self.termination_state = Some(result);
        self.terminated_at = Some(now);
        Ok(())
    }

    /// Skip directly from `Pending`, with no running phase. Only reachable
    /// during instance creation, after the skip request has been validated
    /// against the step description.
    pub(crate) fn skip_at_creation(&mut self, created_at: DateTime<Utc>) {
        self.state = StepLifecycleState::Terminated;
        self.termination_state = Some(StepTerminationState::Skipped);
        self.started_at = Some(created_at);
        self.terminated_at = Some(created_at);
    }
}

/// Snapshot copy of a [`StepDescription`] owned by one instance, with its own
/// lifecycle. Composition is frozen at creation; only the lifecycle and the
/// custom state mutate afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInstance {
    sequence: u32,
    description: String,
    can_be_skipped: bool,
    custom_state: String,
    lifecycle: StepInstanceLifecycle,
}

impl StepInstance {
    pub(crate) fn from_description(step: &StepDescription) -> Self {
        Self {
            sequence: step.sequence(),
            description: step.description().to_string(),
            can_be_skipped: step.can_be_skipped(),
            custom_state: String::new(),
            lifecycle: StepInstanceLifecycle::new(),
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn can_be_skipped(&self) -> bool {
        self.can_be_skipped
    }

    pub fn custom_state(&self) -> &str {
        &self.custom_state
    }

    pub fn set_custom_state(&mut self, state: impl Into<String>) {
        self.custom_state = state.into();
    }

    pub fn lifecycle(&self) -> &StepInstanceLifecycle {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut StepInstanceLifecycle {
        &mut self.lifecycle
    }
}
