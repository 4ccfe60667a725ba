use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ConcurrencyToken, IdempotencyKey, OrchestrationInstance, OrchestrationInstanceId,
};
use crate::registry::DescriptionRegistry;

use super::{
    OrchestrationInstanceProgressRepository, OrchestrationInstanceQueries,
    OrchestrationInstanceRepository, SearchFilter, StoreError, UnitOfWork,
};

/// In-memory store for tests and local development.
///
/// Implements the full contract the production store must honor: atomic
/// commit of a unit of work, the concurrency-token check on updates, the
/// idempotency-key uniqueness constraint on inserts, and the search filters.
/// Name/version filters resolve through the description registry, since
/// instances only carry their description id.
pub struct InMemoryStore {
    registry: Arc<DescriptionRegistry>,
    instances: Mutex<HashMap<OrchestrationInstanceId, OrchestrationInstance>>,
}

impl InMemoryStore {
    pub fn new(registry: Arc<DescriptionRegistry>) -> Self {
        Self {
            registry,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.lock().await.len()
    }

    async fn get_inner(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, StoreError> {
        self.instances
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn commit_inner(&self, unit_of_work: UnitOfWork) -> Result<(), StoreError> {
        if unit_of_work.is_empty() {
            return Ok(());
        }
        let UnitOfWork { inserts, updates } = unit_of_work;
        let mut stored = self.instances.lock().await;

        // Validate everything before touching the map: a failed commit must
        // leave the store unchanged.
        for (idx, insert) in inserts.iter().enumerate() {
            if let Some(key) = insert.idempotency_key() {
                let in_store = stored
                    .values()
                    .any(|existing| existing.idempotency_key() == Some(key));
                let in_batch = inserts[..idx]
                    .iter()
                    .any(|earlier| earlier.idempotency_key() == Some(key));
                if in_store || in_batch {
                    return Err(StoreError::DuplicateIdempotencyKey { key: key.clone() });
                }
            }
            if stored.contains_key(&insert.id()) {
                // Another writer created this aggregate first.
                return Err(StoreError::ConcurrencyConflict { id: insert.id() });
            }
        }
        for update in &updates {
            match stored.get(&update.id()) {
                None => return Err(StoreError::NotFound { id: update.id() }),
                Some(existing) if existing.concurrency_token() != update.concurrency_token() => {
                    return Err(StoreError::ConcurrencyConflict { id: update.id() });
                }
                Some(_) => {}
            }
        }

        for instance in inserts.into_iter().chain(updates) {
            let mut written = instance;
            written.set_concurrency_token(ConcurrencyToken::new());
            tracing::debug!(
                target: "orchestrion::store::in_memory",
                instance_id = %written.id(),
                state = %written.lifecycle().state(),
                "commit"
            );
            stored.insert(written.id(), written);
        }
        Ok(())
    }

    fn matches(&self, instance: &OrchestrationInstance, filter: &SearchFilter) -> bool {
        let Ok(description) = self.registry.get(instance.description_id()) else {
            return false;
        };
        if description.unique_name().name != filter.name {
            return false;
        }
        if let Some(version) = filter.version {
            if description.unique_name().version != version {
                return false;
            }
        }
        let lifecycle = instance.lifecycle();
        if let Some(states) = &filter.lifecycle_states {
            if !states.contains(&lifecycle.state()) {
                return false;
            }
        }
        if let Some(termination_state) = filter.termination_state {
            if lifecycle.termination_state() != Some(termination_state) {
                return false;
            }
        }
        if let Some(at) = filter.started_at_or_later {
            if !lifecycle.started_at().is_some_and(|t| t >= at) {
                return false;
            }
        }
        if let Some(at) = filter.terminated_at_or_earlier {
            if !lifecycle.terminated_at().is_some_and(|t| t <= at) {
                return false;
            }
        }
        if let Some(at) = filter.scheduled_at_or_later {
            if !lifecycle.scheduled_to_run_at().is_some_and(|t| t >= at) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl OrchestrationInstanceRepository for InMemoryStore {
    async fn get(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, StoreError> {
        self.get_inner(id).await
    }

    async fn get_or_default(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<Option<OrchestrationInstance>, StoreError> {
        Ok(self.instances.lock().await.get(&id).cloned())
    }

    async fn get_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<OrchestrationInstance>, StoreError> {
        Ok(self
            .instances
            .lock()
            .await
            .values()
            .find(|instance| instance.idempotency_key() == Some(key))
            .cloned())
    }

    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<(), StoreError> {
        self.commit_inner(unit_of_work).await
    }
}

#[async_trait]
impl OrchestrationInstanceProgressRepository for InMemoryStore {
    async fn get(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, StoreError> {
        self.get_inner(id).await
    }

    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<(), StoreError> {
        self.commit_inner(unit_of_work).await
    }
}

#[async_trait]
impl OrchestrationInstanceQueries for InMemoryStore {
    async fn get(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, StoreError> {
        self.get_inner(id).await
    }

    async fn search(
        &self,
        filter: &SearchFilter,
    ) -> Result<Vec<OrchestrationInstance>, StoreError> {
        let stored = self.instances.lock().await;
        let mut found: Vec<OrchestrationInstance> = stored
            .values()
            .filter(|instance| self.matches(instance, filter))
            .cloned()
            .collect();
        found.sort_by_key(|instance| instance.lifecycle().created_at());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::{
        ActorId, OperatingIdentity, OrchestrationDescription,
        OrchestrationDescriptionUniqueName, ParameterDefinition, ParameterValue,
    };
    use chrono::Utc;

    fn fixture() -> (Arc<DescriptionRegistry>, OrchestrationDescription) {
        let description =
            OrchestrationDescription::builder(OrchestrationDescriptionUniqueName::new("Brs-1", 1))
                .step("Run")
                .build();
        let registry = Arc::new(
            DescriptionRegistry::builder()
                .register(description.clone())
                .build()
                .unwrap(),
        );
        (registry, description)
    }

    fn instance(
        description: &OrchestrationDescription,
        idempotency_key: Option<&str>,
    ) -> OrchestrationInstance {
        let clock = FixedClock::at(Utc::now());
        let parameter = ParameterValue::new(&ParameterDefinition::none(), None).unwrap();
        let identity = OperatingIdentity::actor(ActorId::new());
        match idempotency_key {
            Some(key) => OrchestrationInstance::new_from_message(
                identity,
                description,
                parameter,
                &[],
                &clock,
                IdempotencyKey::new(key),
                Default::default(),
            )
            .unwrap(),
            None => OrchestrationInstance::new_from_description(
                identity,
                description,
                parameter,
                &[],
                &clock,
                None,
            )
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn stale_token_commit_conflicts_and_changes_nothing() {
        let (registry, description) = fixture();
        let store = InMemoryStore::new(registry);

        let created = instance(&description, None);
        let id = created.id();
        let mut uow = UnitOfWork::new();
        uow.add(created);
        OrchestrationInstanceRepository::commit(&store, uow).await.unwrap();

        let mut first = OrchestrationInstanceRepository::get(&store, id).await.unwrap();
        let mut second = OrchestrationInstanceRepository::get(&store, id).await.unwrap();

        first.set_custom_state("first writer");
        let mut uow = UnitOfWork::new();
        uow.track(first);
        OrchestrationInstanceRepository::commit(&store, uow).await.unwrap();

        second.set_custom_state("second writer");
        let mut uow = UnitOfWork::new();
        uow.track(second);
        let err = OrchestrationInstanceRepository::commit(&store, uow)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::ConcurrencyConflict { id });

        let stored = OrchestrationInstanceRepository::get(&store, id).await.unwrap();
        assert_eq!(stored.custom_state(), "first writer");
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let (registry, description) = fixture();
        let store = InMemoryStore::new(registry);

        let mut uow = UnitOfWork::new();
        uow.add(instance(&description, Some("message-1")));
        OrchestrationInstanceRepository::commit(&store, uow).await.unwrap();

        let mut uow = UnitOfWork::new();
        uow.add(instance(&description, Some("message-1")));
        let err = OrchestrationInstanceRepository::commit(&store, uow)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateIdempotencyKey {
                key: IdempotencyKey::new("message-1")
            }
        );
        assert_eq!(store.instance_count().await, 1);
    }

    #[tokio::test]
    async fn failed_commit_applies_no_staged_mutation() {
        let (registry, description) = fixture();
        let store = InMemoryStore::new(registry);

        let mut uow = UnitOfWork::new();
        uow.add(instance(&description, Some("message-1")));
        OrchestrationInstanceRepository::commit(&store, uow).await.unwrap();

        // One valid insert and one duplicate key staged together: atomicity
        // requires that neither lands.
        let mut uow = UnitOfWork::new();
        uow.add(instance(&description, Some("message-2")));
        uow.add(instance(&description, Some("message-1")));
        assert!(OrchestrationInstanceRepository::commit(&store, uow)
            .await
            .is_err());
        assert_eq!(store.instance_count().await, 1);
        assert!(OrchestrationInstanceRepository::get_by_idempotency_key(
            &store,
            &IdempotencyKey::new("message-2")
        )
        .await
        .unwrap()
        .is_none());
    }
}
