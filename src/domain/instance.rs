use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

use super::{
    ConcurrencyToken, LifecycleError, OperatingIdentity, OrchestrationDescription,
    OrchestrationDescriptionId, OrchestrationDescriptionUniqueName, ParameterValue, StepInstance,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrchestrationInstanceId(pub Uuid);

impl OrchestrationInstanceId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for OrchestrationInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller-supplied token that makes instance creation idempotent under
/// redelivered commands. Globally unique across instances; the store enforces
/// the constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracing fields carried by message-triggered starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCorrelation {
    pub actor_message_id: Option<String>,
    pub transaction_id: Option<String>,
    pub metering_point_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceLifecycleState {
    Pending,
    Queued,
    Running,
    Terminated,
}

impl InstanceLifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Terminated => "Terminated",
        }
    }
}

impl std::fmt::Display for InstanceLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceTerminationState {
    Succeeded,
    Failed,
    UserCanceled,
}

/// State machine for one orchestration instance:
/// `Pending → Queued → Running → Terminated`.
///
/// Each transition checks its precondition against the current state and
/// otherwise only records the clock's timestamp; callers are expected to have
/// just checked the precondition themselves, so a failure here means a
/// command was invoked out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationInstanceLifecycle {
    state: InstanceLifecycleState,
    termination_state: Option<InstanceTerminationState>,
    created_at: DateTime<Utc>,
    created_by: OperatingIdentity,
    scheduled_to_run_at: Option<DateTime<Utc>>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    terminated_at: Option<DateTime<Utc>>,
    canceled_by: Option<OperatingIdentity>,
}

impl OrchestrationInstanceLifecycle {
    fn new(
        created_by: OperatingIdentity,
        created_at: DateTime<Utc>,
        scheduled_to_run_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            state: InstanceLifecycleState::Pending,
            termination_state: None,
            created_at,
            created_by,
            scheduled_to_run_at,
            queued_at: None,
            started_at: None,
            terminated_at: None,
            canceled_by: None,
        }
    }

    pub fn state(&self) -> InstanceLifecycleState {
        self.state
    }

    pub fn termination_state(&self) -> Option<InstanceTerminationState> {
        self.termination_state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> &OperatingIdentity {
        &self.created_by
    }

    pub fn scheduled_to_run_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_to_run_at
    }

    pub fn queued_at(&self) -> Option<DateTime<Utc>> {
        self.queued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn terminated_at(&self) -> Option<DateTime<Utc>> {
        self.terminated_at
    }

    pub fn canceled_by(&self) -> Option<&OperatingIdentity> {
        self.canceled_by.as_ref()
    }

    /// True for instances waiting on the scheduler sweep: still pending and
    /// carrying a scheduled start time. Gates the start-scheduled and
    /// cancel-scheduled commands.
    pub fn is_pending_for_scheduled_start(&self) -> bool {
        self.state == InstanceLifecycleState::Pending && self.scheduled_to_run_at.is_some()
    }

    pub fn transition_to_queued(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if self.state != InstanceLifecycleState::Pending {
            return Err(LifecycleError::InvalidState {
                attempted: "queue",
                actual: self.state.as_str(),
            });
        }
        self.state = InstanceLifecycleState::Queued;
        self.queued_at = Some(now);
        Ok(())
    }

    pub fn transition_to_running(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if self.state != InstanceLifecycleState::Queued {
            return Err(LifecycleError::InvalidState {
                attempted: "start",
                actual: self.state.as_str(),
            });
        }
        self.state = InstanceLifecycleState::Running;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn transition_to_succeeded(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.terminate(now, InstanceTerminationState::Succeeded, "complete")
    }

    pub fn transition_to_failed(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.terminate(now, InstanceTerminationState::Failed, "fail")
    }

    fn terminate(
        &mut self,
        now: DateTime<Utc>,
        termination_state: InstanceTerminationState,
        attempted: &'static str,
    ) -> Result<(), LifecycleError> {
        if self.state != InstanceLifecycleState::Running {
            return Err(LifecycleError::InvalidState {
                attempted,
                actual: self.state.as_str(),
            });
        }
        self.state = InstanceLifecycleState::Terminated;
        self.termination_state = Some(termination_state);
        self.terminated_at = Some(now);
        Ok(())
    }

    /// Cancel an instance that has not left its scheduled-pending window.
    /// Anything already queued belongs to the executor and cannot be revoked
    /// through this core.
    pub fn transition_to_user_canceled(
        &mut self,
        now: DateTime<Utc>,
        canceled_by: OperatingIdentity,
    ) -> Result<(), LifecycleError> {
        if !self.is_pending_for_scheduled_start() {
            return Err(LifecycleError::InvalidState {
                attempted: "cancel",
                actual: self.state.as_str(),
            });
        }
        self.state = InstanceLifecycleState::Terminated;
        self.termination_state = Some(InstanceTerminationState::UserCanceled);
        self.terminated_at = Some(now);
        self.canceled_by = Some(canceled_by);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateInstanceError {
    #[error("orchestration description {unique_name} is disabled")]
    DescriptionDisabled {
        unique_name: OrchestrationDescriptionUniqueName,
    },
    #[error("step {sequence} does not exist or cannot be skipped")]
    InvalidSkipStep { sequence: u32 },
}

/// Aggregate root for one execution of an orchestration description.
///
/// Steps are a snapshot copy of the description's steps taken at creation
/// time; their composition never changes afterwards, only each step's own
/// lifecycle. All lifecycle mutation goes through the embedded state
/// machines, and the instance is never deleted by this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationInstance {
    id: OrchestrationInstanceId,
    description_id: OrchestrationDescriptionId,
    lifecycle: OrchestrationInstanceLifecycle,
    parameter_value: ParameterValue,
    custom_state: String,
    steps: Vec<StepInstance>,
    idempotency_key: Option<IdempotencyKey>,
    actor_message_id: Option<String>,
    transaction_id: Option<String>,
    metering_point_id: Option<String>,
    concurrency_token: ConcurrencyToken,
}

impl OrchestrationInstance {
    /// Create a pending instance from an enabled description, optionally
    /// scheduled for `run_at`. Steps named in `skip_steps_by_sequence` are
    /// terminated as `Skipped` immediately, timestamped with the instance's
    /// creation time.
    pub fn new_from_description(
        identity: OperatingIdentity,
        description: &OrchestrationDescription,
        parameter: ParameterValue,
        skip_steps_by_sequence: &[u32],
        clock: &dyn Clock,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<Self, CreateInstanceError> {
        Self::create(
            identity,
            description,
            parameter,
            skip_steps_by_sequence,
            clock,
            run_at,
            None,
            MessageCorrelation::default(),
        )
    }

    /// Create a pending instance for a message-triggered start: carries the
    /// caller's idempotency key and correlation fields, and is never
    /// scheduled.
    pub fn new_from_message(
        identity: OperatingIdentity,
        description: &OrchestrationDescription,
        parameter: ParameterValue,
        skip_steps_by_sequence: &[u32],
        clock: &dyn Clock,
        idempotency_key: IdempotencyKey,
        correlation: MessageCorrelation,
    ) -> Result<Self, CreateInstanceError> {
        Self::create(
            identity,
            description,
            parameter,
            skip_steps_by_sequence,
            clock,
            None,
            Some(idempotency_key),
            correlation,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        identity: OperatingIdentity,
        description: &OrchestrationDescription,
        parameter: ParameterValue,
        skip_steps_by_sequence: &[u32],
        clock: &dyn Clock,
        run_at: Option<DateTime<Utc>>,
        idempotency_key: Option<IdempotencyKey>,
        correlation: MessageCorrelation,
    ) -> Result<Self, CreateInstanceError> {
        if !description.is_enabled() {
            return Err(CreateInstanceError::DescriptionDisabled {
                unique_name: description.unique_name().clone(),
            });
        }
        for sequence in skip_steps_by_sequence {
            match description.step(*sequence) {
                Some(step) if step.can_be_skipped() => {}
                _ => {
                    return Err(CreateInstanceError::InvalidSkipStep {
                        sequence: *sequence,
                    })
                }
            }
        }

        let created_at = clock.now();
        let steps = description
            .steps()
            .iter()
            .map(|step_description| {
                let mut step = StepInstance::from_description(step_description);
                if skip_steps_by_sequence.contains(&step_description.sequence()) {
                    step.lifecycle_mut().skip_at_creation(created_at);
                }
                step
            })
            .collect();

        Ok(Self {
            id: OrchestrationInstanceId::new(),
            description_id: description.id(),
            lifecycle: OrchestrationInstanceLifecycle::new(identity, created_at, run_at),
            parameter_value: parameter,
            custom_state: String::new(),
            steps,
            idempotency_key,
            actor_message_id: correlation.actor_message_id,
            transaction_id: correlation.transaction_id,
            metering_point_id: correlation.metering_point_id,
            concurrency_token: ConcurrencyToken::new(),
        })
    }

    pub fn id(&self) -> OrchestrationInstanceId {
        self.id
    }

    pub fn description_id(&self) -> OrchestrationDescriptionId {
        self.description_id
    }

    pub fn lifecycle(&self) -> &OrchestrationInstanceLifecycle {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut OrchestrationInstanceLifecycle {
        &mut self.lifecycle
    }

    pub fn parameter_value(&self) -> &ParameterValue {
        &self.parameter_value
    }

    /// Opaque workflow-specific progress note.
    pub fn custom_state(&self) -> &str {
        &self.custom_state
    }

    pub fn set_custom_state(&mut self, state: impl Into<String>) {
        self.custom_state = state.into();
    }

    pub fn steps(&self) -> &[StepInstance] {
        &self.steps
    }

    pub fn step(&self, sequence: u32) -> Option<&StepInstance> {
        self.steps.iter().find(|s| s.sequence() == sequence)
    }

    pub fn step_mut(&mut self, sequence: u32) -> Option<&mut StepInstance> {
        self.steps.iter_mut().find(|s| s.sequence() == sequence)
    }

    pub fn idempotency_key(&self) -> Option<&IdempotencyKey> {
        self.idempotency_key.as_ref()
    }

    pub fn actor_message_id(&self) -> Option<&str> {
        self.actor_message_id.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn metering_point_id(&self) -> Option<&str> {
        self.metering_point_id.as_deref()
    }

    pub fn concurrency_token(&self) -> ConcurrencyToken {
        self.concurrency_token
    }

    /// Store-side use only: assign the token recorded by a committed write.
    pub fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.concurrency_token = token;
    }
}
