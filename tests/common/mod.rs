#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use orchestrion::{
    ActorId, DescriptionRegistry, ExecutorError, FixedClock, InMemoryStore, OperatingIdentity,
    OrchestrationDescription, OrchestrationDescriptionUniqueName, OrchestrationExecutor,
    OrchestrationInstance, OrchestrationInstanceId, OrchestrationInstanceManager,
    StaticFeatureFlags, UserId,
};

/// Executor fake that records every call and can be told to report an
/// already-registered execution or to fail the next start request.
#[derive(Default)]
pub struct RecordingExecutor {
    starts: Mutex<Vec<OrchestrationInstanceId>>,
    notifications: Mutex<Vec<(OrchestrationInstanceId, String, Value)>>,
    already_registered: AtomicBool,
    fail_next_start: Mutex<Option<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<OrchestrationInstanceId> {
        self.starts.lock().unwrap().clone()
    }

    pub fn notified(&self) -> Vec<(OrchestrationInstanceId, String, Value)> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn report_already_registered(&self, value: bool) {
        self.already_registered.store(value, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self, message: impl Into<String>) {
        *self.fail_next_start.lock().unwrap() = Some(message.into());
    }
}

#[async_trait]
impl OrchestrationExecutor for RecordingExecutor {
    async fn start_new_orchestration_instance(
        &self,
        _description: &OrchestrationDescription,
        instance: &OrchestrationInstance,
    ) -> Result<bool, ExecutorError> {
        if let Some(message) = self.fail_next_start.lock().unwrap().take() {
            return Err(ExecutorError::new("start_new_orchestration_instance", message));
        }
        self.starts.lock().unwrap().push(instance.id());
        Ok(!self.already_registered.load(Ordering::SeqCst))
    }

    async fn notify_orchestration_instance(
        &self,
        id: OrchestrationInstanceId,
        event_name: &str,
        data: &Value,
    ) -> Result<(), ExecutorError> {
        self.notifications
            .lock()
            .unwrap()
            .push((id, event_name.to_string(), data.clone()));
        Ok(())
    }
}

/// Everything a command test needs, wired the way production wiring would do
/// it: one registry, one store serving both repository and query traits, a
/// fake executor, and a pinned clock.
pub struct Harness {
    pub registry: Arc<DescriptionRegistry>,
    pub store: Arc<InMemoryStore>,
    pub executor: Arc<RecordingExecutor>,
    pub clock: Arc<FixedClock>,
    pub manager: OrchestrationInstanceManager,
}

pub fn harness(descriptions: Vec<OrchestrationDescription>) -> Harness {
    harness_with_flags(descriptions, StaticFeatureFlags::new())
}

pub fn harness_with_flags(
    descriptions: Vec<OrchestrationDescription>,
    flags: StaticFeatureFlags,
) -> Harness {
    let mut builder = DescriptionRegistry::builder();
    for description in descriptions {
        builder = builder.register(description);
    }
    let registry = Arc::new(builder.build().expect("test registry must build"));
    harness_with_parts(registry, flags)
}

pub fn harness_with_parts(registry: Arc<DescriptionRegistry>, flags: StaticFeatureFlags) -> Harness {
    let store = Arc::new(InMemoryStore::new(Arc::clone(&registry)));
    let executor = Arc::new(RecordingExecutor::new());
    let clock = Arc::new(FixedClock::at(Utc::now()));
    let manager = OrchestrationInstanceManager::new(
        Arc::clone(&registry),
        store.clone(),
        store.clone(),
        executor.clone(),
        Arc::new(flags),
        clock.clone(),
    );
    Harness {
        registry,
        store,
        executor,
        clock,
        manager,
    }
}

pub fn user_identity() -> OperatingIdentity {
    OperatingIdentity::user(UserId::new(), ActorId::new())
}

pub fn actor_identity() -> OperatingIdentity {
    OperatingIdentity::actor(ActorId::new())
}

pub fn brs_unique_name() -> OrchestrationDescriptionUniqueName {
    OrchestrationDescriptionUniqueName::new("Brs-1", 1)
}

/// The two-step description used across scenarios: step 1 mandatory,
/// step 2 skippable.
pub fn brs_description() -> OrchestrationDescription {
    OrchestrationDescription::builder(brs_unique_name())
        .schedulable(true)
        .step("Validate")
        .skippable_step("Run", "skipped on request")
        .build()
}
