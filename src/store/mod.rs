//! Persistence contracts: write-side repositories with a unit-of-work commit,
//! and the read-side query surface. The store of record sits behind these
//! traits; this crate ships an in-memory implementation for tests and local
//! development, the way the production SQL store lives in an adapter crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    IdempotencyKey, InstanceLifecycleState, InstanceTerminationState, OrchestrationInstance,
    OrchestrationInstanceId,
};

mod in_memory;

pub use in_memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("orchestration instance {id} was not found")]
    NotFound { id: OrchestrationInstanceId },
    /// Another writer committed the aggregate after this copy was loaded.
    /// The caller decides whether to reload and retry; this core never does.
    #[error("concurrency conflict on orchestration instance {id}")]
    ConcurrencyConflict { id: OrchestrationInstanceId },
    #[error("idempotency key {key} already exists")]
    DuplicateIdempotencyKey { key: IdempotencyKey },
}

/// Staged aggregate mutations, committed atomically.
///
/// `add` stages a brand-new aggregate (subject to the idempotency-key
/// uniqueness constraint); `track` stages an update of a loaded aggregate
/// (subject to the concurrency-token check). A failed commit applies nothing.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    pub(crate) inserts: Vec<OrchestrationInstance>,
    pub(crate) updates: Vec<OrchestrationInstance>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instance: OrchestrationInstance) {
        self.inserts.push(instance);
    }

    pub fn track(&mut self, instance: OrchestrationInstance) {
        self.updates.push(instance);
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// Write-side repository for the instance aggregate.
#[async_trait]
pub trait OrchestrationInstanceRepository: Send + Sync {
    /// Load an aggregate, capturing its concurrency token.
    async fn get(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, StoreError>;

    /// Non-throwing lookup for idempotent command handling.
    async fn get_or_default(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<Option<OrchestrationInstance>, StoreError>;

    /// Non-throwing lookup by idempotency key.
    async fn get_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<OrchestrationInstance>, StoreError>;

    /// Commit every staged mutation atomically, or nothing at all.
    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<(), StoreError>;
}

/// Write-side path for progress reported by the executing engine: step and
/// instance lifecycle transitions and custom-state updates. Shares the
/// unit-of-work semantics of the instance repository.
#[async_trait]
pub trait OrchestrationInstanceProgressRepository: Send + Sync {
    async fn get(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, StoreError>;

    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<(), StoreError>;
}

/// Optional, AND-combined read filters over instances of one orchestration
/// name. An absent filter leaves that dimension unconstrained.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub name: String,
    pub version: Option<u32>,
    pub lifecycle_states: Option<Vec<InstanceLifecycleState>>,
    pub termination_state: Option<InstanceTerminationState>,
    pub started_at_or_later: Option<DateTime<Utc>>,
    pub terminated_at_or_earlier: Option<DateTime<Utc>>,
    pub scheduled_at_or_later: Option<DateTime<Utc>>,
}

impl SearchFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_lifecycle_states(mut self, states: Vec<InstanceLifecycleState>) -> Self {
        self.lifecycle_states = Some(states);
        self
    }

    pub fn with_termination_state(mut self, state: InstanceTerminationState) -> Self {
        self.termination_state = Some(state);
        self
    }

    pub fn with_started_at_or_later(mut self, at: DateTime<Utc>) -> Self {
        self.started_at_or_later = Some(at);
        self
    }

    pub fn with_terminated_at_or_earlier(mut self, at: DateTime<Utc>) -> Self {
        self.terminated_at_or_earlier = Some(at);
        self
    }

    pub fn with_scheduled_at_or_later(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at_or_later = Some(at);
        self
    }
}

/// Read-side search over instances, independent of the write repositories.
#[async_trait]
pub trait OrchestrationInstanceQueries: Send + Sync {
    async fn get(
        &self,
        id: OrchestrationInstanceId,
    ) -> Result<OrchestrationInstance, StoreError>;

    async fn search(
        &self,
        filter: &SearchFilter,
    ) -> Result<Vec<OrchestrationInstance>, StoreError>;
}
