use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConcurrencyToken, ParameterDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrchestrationDescriptionId(pub Uuid);

impl OrchestrationDescriptionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for OrchestrationDescriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identity of a workflow definition: name plus integer version.
/// Immutable once instances reference it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrchestrationDescriptionUniqueName {
    pub name: String,
    pub version: u32,
}

impl OrchestrationDescriptionUniqueName {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl std::fmt::Display for OrchestrationDescriptionUniqueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

/// One ordered unit of work within a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescription {
    sequence: u32,
    description: String,
    can_be_skipped: bool,
    skip_reason: Option<String>,
}

impl StepDescription {
    pub fn new(sequence: u32, description: impl Into<String>) -> Self {
        Self {
            sequence,
            description: description.into(),
            can_be_skipped: false,
            skip_reason: None,
        }
    }

    pub fn skippable(
        sequence: u32,
        description: impl Into<String>,
        skip_reason: impl Into<String>,
    ) -> Self {
        Self {
            sequence,
            description: description.into(),
            can_be_skipped: true,
            skip_reason: Some(skip_reason.into()),
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

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptionError {
    #[error("step sequences must be contiguous from 1: expected {expected}, found {found}")]
    InvalidStepSequence { expected: u32, found: u32 },
}

/// Catalog entry for a workflow definition.
///
/// Created once at registration time and read-mostly afterwards; the command
/// layer never mutates it. Disabled descriptions reject new instance
/// creation, and only descriptions with `can_be_scheduled` accept the
/// schedule command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationDescription {
    id: OrchestrationDescriptionId,
    unique_name: OrchestrationDescriptionUniqueName,
    is_enabled: bool,
    can_be_scheduled: bool,
    is_durable_function_backed: bool,
    parameter_definition: ParameterDefinition,
    steps: Vec<StepDescription>,
    recurring_cron_expression: Option<String>,
    concurrency_token: ConcurrencyToken,
}

impl OrchestrationDescription {
    /// Construct a description, enforcing that step sequences are unique and
    /// contiguous from 1.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        unique_name: OrchestrationDescriptionUniqueName,
        is_enabled: bool,
        can_be_scheduled: bool,
        is_durable_function_backed: bool,
        parameter_definition: ParameterDefinition,
        steps: Vec<StepDescription>,
        recurring_cron_expression: Option<String>,
    ) -> Result<Self, DescriptionError> {
        for (idx, step) in steps.iter().enumerate() {
            let expected = idx as u32 + 1;
            if step.sequence != expected {
                return Err(DescriptionError::InvalidStepSequence {
                    expected,
                    found: step.sequence,
                });
            }
        }
        Ok(Self {
            id: OrchestrationDescriptionId::new(),
            unique_name,
            is_enabled,
            can_be_scheduled,
            is_durable_function_backed,
            parameter_definition,
            steps,
            recurring_cron_expression,
            concurrency_token: ConcurrencyToken::new(),
        })
    }

    pub fn builder(unique_name: OrchestrationDescriptionUniqueName) -> OrchestrationDescriptionBuilder {
        OrchestrationDescriptionBuilder::new(unique_name)
    }

    pub fn id(&self) -> OrchestrationDescriptionId {
        self.id
    }

    pub fn unique_name(&self) -> &OrchestrationDescriptionUniqueName {
        &self.unique_name
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Administrative update hook: enable or disable new instance creation.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    pub fn can_be_scheduled(&self) -> bool {
        self.can_be_scheduled
    }

    /// When false the manager never calls the executor for instances of this
    /// description; they stay self-contained shells.
    pub fn is_durable_function_backed(&self) -> bool {
        self.is_durable_function_backed
    }

    pub fn parameter_definition(&self) -> &ParameterDefinition {
        &self.parameter_definition
    }

    pub fn steps(&self) -> &[StepDescription] {
        &self.steps
    }

    pub fn step(&self, sequence: u32) -> Option<&StepDescription> {
        self.steps.iter().find(|s| s.sequence == sequence)
    }

    pub fn recurring_cron_expression(&self) -> Option<&str> {
        self.recurring_cron_expression.as_deref()
    }

    pub fn concurrency_token(&self) -> ConcurrencyToken {
        self.concurrency_token
    }
}

/// Builder that assigns step sequences in registration order, so the
/// contiguity invariant holds by construction.
pub struct OrchestrationDescriptionBuilder {
    unique_name: OrchestrationDescriptionUniqueName,
    is_enabled: bool,
    can_be_scheduled: bool,
    is_durable_function_backed: bool,
    parameter_definition: ParameterDefinition,
    steps: Vec<StepDescription>,
    recurring_cron_expression: Option<String>,
}

impl OrchestrationDescriptionBuilder {
    fn new(unique_name: OrchestrationDescriptionUniqueName) -> Self {
        Self {
            unique_name,
            is_enabled: true,
            can_be_scheduled: false,
            is_durable_function_backed: true,
            parameter_definition: ParameterDefinition::none(),
            steps: Vec::new(),
            recurring_cron_expression: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }

    pub fn schedulable(mut self, schedulable: bool) -> Self {
        self.can_be_scheduled = schedulable;
        self
    }

    pub fn durable_function_backed(mut self, backed: bool) -> Self {
        self.is_durable_function_backed = backed;
        self
    }

    pub fn parameter_definition(mut self, definition: ParameterDefinition) -> Self {
        self.parameter_definition = definition;
        self
    }

    pub fn step(mut self, description: impl Into<String>) -> Self {
        let sequence = self.steps.len() as u32 + 1;
        self.steps.push(StepDescription::new(sequence, description));
        self
    }

    pub fn skippable_step(
        mut self,
        description: impl Into<String>,
        skip_reason: impl Into<String>,
    ) -> Self {
        let sequence = self.steps.len() as u32 + 1;
        self.steps
            .push(StepDescription::skippable(sequence, description, skip_reason));
        self
    }

    pub fn recurring(mut self, cron_expression: impl Into<String>) -> Self {
        self.recurring_cron_expression = Some(cron_expression.into());
        self
    }

    pub fn build(self) -> OrchestrationDescription {
        // Sequences are assigned contiguously above, so `new` cannot fail.
        OrchestrationDescription::new(
            self.unique_name,
            self.is_enabled,
            self.can_be_scheduled,
            self.is_durable_function_backed,
            self.parameter_definition,
            self.steps,
            self.recurring_cron_expression,
        )
        .expect("builder assigns contiguous step sequences")
    }
}
