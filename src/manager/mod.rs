//! Command orchestration over the instance aggregate: start, schedule,
//! start-scheduled, cancel, and notify, plus the read-side queries a thin
//! transport adapter needs.
//!
//! The manager is stateless and safe for concurrent invocation; all
//! coordination is delegated to the store (concurrency tokens checked at
//! commit, idempotency keys under a unique constraint). Within one command
//! the order is strict: validate, mutate, commit, conditionally call the
//! executor, mutate again, commit. Conflicts propagate to the caller; this
//! layer never retries them.

mod error;

pub use error::CommandError;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::clock::Clock;
use crate::domain::{
    IdempotencyKey, InstanceLifecycleState, MessageCorrelation, OperatingIdentity,
    OrchestrationDescription, OrchestrationDescriptionUniqueName, OrchestrationInstance,
    OrchestrationInstanceId, ParameterValue,
};
use crate::executor::OrchestrationExecutor;
use crate::features::{FeatureFlag, FeatureFlagManager};
use crate::registry::DescriptionRegistry;
use crate::store::{
    OrchestrationInstanceQueries, OrchestrationInstanceRepository, SearchFilter, StoreError,
    UnitOfWork,
};

const TARGET: &str = "orchestrion::manager";

/// The command orchestrator. One instance serves every caller; commands may
/// be invoked concurrently without extra synchronization.
pub struct OrchestrationInstanceManager {
    registry: Arc<DescriptionRegistry>,
    repository: Arc<dyn OrchestrationInstanceRepository>,
    queries: Arc<dyn OrchestrationInstanceQueries>,
    executor: Arc<dyn OrchestrationExecutor>,
    feature_flags: Arc<dyn FeatureFlagManager>,
    clock: Arc<dyn Clock>,
}

impl OrchestrationInstanceManager {
    pub fn new(
        registry: Arc<DescriptionRegistry>,
        repository: Arc<dyn OrchestrationInstanceRepository>,
        queries: Arc<dyn OrchestrationInstanceQueries>,
        executor: Arc<dyn OrchestrationExecutor>,
        feature_flags: Arc<dyn FeatureFlagManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            repository,
            queries,
            executor,
            feature_flags,
            clock,
        }
    }

    /// Create and start a new instance of an enabled description.
    ///
    /// The instance is committed as `Pending` first; for durable-function
    /// backed descriptions the executor is then asked to begin and the
    /// instance is committed again as `Queued`. Descriptions that are not
    /// durable-function backed never reach the executor and stay `Pending`.
    pub async fn start_new_orchestration_instance(
        &self,
        identity: OperatingIdentity,
        unique_name: &OrchestrationDescriptionUniqueName,
        input: Option<Value>,
        skip_steps_by_sequence: &[u32],
    ) -> Result<OrchestrationInstanceId, CommandError> {
        let description = self.resolve_enabled(unique_name)?;
        let parameter = self.validate_input(&description, input)?;

        let instance = OrchestrationInstance::new_from_description(
            identity,
            &description,
            parameter,
            skip_steps_by_sequence,
            self.clock.as_ref(),
            None,
        )?;
        let id = instance.id();

        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.add(instance);
        self.repository.commit(unit_of_work).await?;
        tracing::info!(
            target: TARGET,
            instance_id = %id,
            unique_name = %unique_name,
            actor_id = %identity.actor_id(),
            "orchestration instance created"
        );

        let instance = self.repository.get(id).await?;
        self.queue_for_execution(&description, instance).await?;
        Ok(id)
    }

    /// Message-triggered start: idempotent under at-least-once delivery.
    ///
    /// A redelivered command finds the earlier instance by idempotency key,
    /// skips creation, and still drives that instance to `Queued` — so a
    /// delivery that previously failed between creation and queuing is
    /// completed by the retry. If the check-then-insert race is lost and the
    /// store's unique constraint fires, the command retries as a lookup and
    /// proceeds with the winner's instance.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_new_orchestration_instance_from_message(
        &self,
        identity: OperatingIdentity,
        unique_name: &OrchestrationDescriptionUniqueName,
        input: Option<Value>,
        skip_steps_by_sequence: &[u32],
        idempotency_key: IdempotencyKey,
        correlation: MessageCorrelation,
    ) -> Result<OrchestrationInstanceId, CommandError> {
        let description = self.resolve_enabled(unique_name)?;

        let existing = self
            .repository
            .get_by_idempotency_key(&idempotency_key)
            .await?;
        let instance = match existing {
            Some(instance) => {
                tracing::debug!(
                    target: TARGET,
                    instance_id = %instance.id(),
                    idempotency_key = %idempotency_key,
                    "redelivered start command; reusing existing instance"
                );
                instance
            }
            None => {
                let parameter = self.validate_input(&description, input)?;
                let instance = OrchestrationInstance::new_from_message(
                    identity,
                    &description,
                    parameter,
                    skip_steps_by_sequence,
                    self.clock.as_ref(),
                    idempotency_key.clone(),
                    correlation,
                )?;
                let id = instance.id();

                let mut unit_of_work = UnitOfWork::new();
                unit_of_work.add(instance);
                match self.repository.commit(unit_of_work).await {
                    Ok(()) => {
                        tracing::info!(
                            target: TARGET,
                            instance_id = %id,
                            unique_name = %unique_name,
                            idempotency_key = %idempotency_key,
                            "orchestration instance created from message"
                        );
                        self.repository.get(id).await?
                    }
                    Err(StoreError::DuplicateIdempotencyKey { key }) => {
                        // Lost the check-then-insert race; the winner's row
                        // is authoritative.
                        tracing::debug!(
                            target: TARGET,
                            idempotency_key = %key,
                            "idempotency key landed concurrently; reloading winner"
                        );
                        self.repository
                            .get_by_idempotency_key(&key)
                            .await?
                            .ok_or(StoreError::DuplicateIdempotencyKey { key })?
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let id = instance.id();
        self.queue_for_execution(&description, instance).await?;
        Ok(id)
    }

    /// Create an instance to be started later by the scheduler sweep. The
    /// instance stays `Pending` with `scheduled_to_run_at` set; this command
    /// never queues it.
    pub async fn schedule_new_orchestration_instance(
        &self,
        user_identity: OperatingIdentity,
        unique_name: &OrchestrationDescriptionUniqueName,
        input: Option<Value>,
        run_at: DateTime<Utc>,
        skip_steps_by_sequence: &[u32],
    ) -> Result<OrchestrationInstanceId, CommandError> {
        let description = self.resolve_enabled(unique_name)?;
        if !description.can_be_scheduled() {
            return Err(CommandError::NotSchedulable {
                unique_name: unique_name.clone(),
            });
        }
        let parameter = self.validate_input(&description, input)?;

        let instance = OrchestrationInstance::new_from_description(
            user_identity,
            &description,
            parameter,
            skip_steps_by_sequence,
            self.clock.as_ref(),
            Some(run_at),
        )?;
        let id = instance.id();

        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.add(instance);
        self.repository.commit(unit_of_work).await?;
        tracing::info!(
            target: TARGET,
            instance_id = %id,
            unique_name = %unique_name,
            run_at = %run_at,
            "orchestration instance scheduled"
        );
        Ok(id)
    }

    /// Start an instance whose scheduled time has come. Invoked by an
    /// external periodic sweep.
    pub async fn start_scheduled_orchestration_instance(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<(), CommandError> {
        let instance = self.repository.get(id).await?;
        if !instance.lifecycle().is_pending_for_scheduled_start() {
            return Err(CommandError::NotStartable { id });
        }

        let description = self
            .registry
            .get(instance.description_id())
            .map_err(|_| CommandError::DescriptionNotFound {
                id: instance.description_id(),
            })?;
        if !description.is_enabled() {
            return Err(CommandError::DisabledDescription {
                unique_name: description.unique_name().clone(),
            });
        }

        self.queue_for_execution(&description, instance).await
    }

    /// Cancel an instance that is still pending for its scheduled start.
    pub async fn cancel_scheduled_orchestration_instance(
        &self,
        user_identity: OperatingIdentity,
        id: OrchestrationInstanceId,
    ) -> Result<(), CommandError> {
        let mut instance = self.repository.get(id).await?;
        if !instance.lifecycle().is_pending_for_scheduled_start() {
            return Err(CommandError::NotCancelable { id });
        }

        instance
            .lifecycle_mut()
            .transition_to_user_canceled(self.clock.now(), user_identity)?;

        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.track(instance);
        self.repository.commit(unit_of_work).await?;
        tracing::info!(
            target: TARGET,
            instance_id = %id,
            actor_id = %user_identity.actor_id(),
            "scheduled orchestration instance canceled"
        );
        Ok(())
    }

    /// Forward an event to a running execution.
    ///
    /// A missing instance or description is a hard error unless the
    /// `SilentMode` flag is enabled, in which case the event is logged and
    /// dropped — notifications may legitimately race instance completion and
    /// cleanup. Descriptions that are not durable-function backed do not
    /// receive mid-flight signals; the call is a no-op for them.
    pub async fn notify_orchestration_instance(
        &self,
        id: OrchestrationInstanceId,
        event_name: &str,
        data: &Value,
    ) -> Result<(), CommandError> {
        let Some(instance) = self.repository.get_or_default(id).await? else {
            if self.silent_mode().await {
                tracing::warn!(
                    target: TARGET,
                    instance_id = %id,
                    event_name,
                    flag = FeatureFlag::SilentMode.as_str(),
                    "notify target instance not found; dropping event"
                );
                return Ok(());
            }
            return Err(CommandError::InstanceNotFound { id });
        };

        let description = match self.registry.get(instance.description_id()) {
            Ok(description) => description,
            Err(_) => {
                if self.silent_mode().await {
                    tracing::warn!(
                        target: TARGET,
                        instance_id = %id,
                        description_id = %instance.description_id(),
                        event_name,
                        flag = FeatureFlag::SilentMode.as_str(),
                        "notify target description not found; dropping event"
                    );
                    return Ok(());
                }
                return Err(CommandError::DescriptionNotFound {
                    id: instance.description_id(),
                });
            }
        };

        if !description.is_durable_function_backed() {
            return Ok(());
        }

        self.executor
            .notify_orchestration_instance(id, event_name, data)
            .await?;
        Ok(())
    }

    /// Read-side lookup for transport adapters.
    pub async fn get(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, CommandError> {
        self.queries.get(id).await.map_err(|err| match err {
            StoreError::NotFound { id } => CommandError::InstanceNotFound { id },
            other => other.into(),
        })
    }

    /// Read-side search for transport adapters.
    pub async fn search(
        &self,
        filter: &SearchFilter,
    ) -> Result<Vec<OrchestrationInstance>, CommandError> {
        Ok(self.queries.search(filter).await?)
    }

    fn resolve_enabled(
        &self,
        unique_name: &OrchestrationDescriptionUniqueName,
    ) -> Result<Arc<OrchestrationDescription>, CommandError> {
        self.registry.get_or_default(unique_name, true).ok_or_else(|| {
            CommandError::UnknownOrDisabledDescription {
                unique_name: unique_name.clone(),
            }
        })
    }

    fn validate_input(
        &self,
        description: &OrchestrationDescription,
        input: Option<Value>,
    ) -> Result<ParameterValue, CommandError> {
        ParameterValue::new(description.parameter_definition(), input).map_err(|_| {
            CommandError::InvalidParameter {
                unique_name: description.unique_name().clone(),
            }
        })
    }

    /// Ask the executor to begin and record the instance as `Queued`.
    ///
    /// No-op for descriptions that are not durable-function backed and for
    /// instances that have already left `Pending` (a redelivered command).
    /// An executor returning `false` means the execution was already
    /// registered; the instance is still moved to `Queued`.
    async fn queue_for_execution(
        &self,
        description: &OrchestrationDescription,
        mut instance: OrchestrationInstance,
    ) -> Result<(), CommandError> {
        if !description.is_durable_function_backed() {
            return Ok(());
        }
        if instance.lifecycle().state() != InstanceLifecycleState::Pending {
            return Ok(());
        }

        let accepted = self
            .executor
            .start_new_orchestration_instance(description, &instance)
            .await?;
        if !accepted {
            tracing::debug!(
                target: TARGET,
                instance_id = %instance.id(),
                "execution already registered with the engine"
            );
        }

        instance
            .lifecycle_mut()
            .transition_to_queued(self.clock.now())?;
        let id = instance.id();

        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.track(instance);
        self.repository.commit(unit_of_work).await?;
        tracing::info!(target: TARGET, instance_id = %id, "orchestration instance queued");
        Ok(())
    }

    async fn silent_mode(&self) -> bool {
        self.feature_flags.is_enabled(FeatureFlag::SilentMode).await
    }
}
