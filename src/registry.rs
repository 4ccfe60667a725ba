//! Immutable catalog of registered orchestration descriptions.
//!
//! Built once at startup through a builder that rejects duplicate
//! `name@version` registrations; the command layer only ever reads it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::{
    OrchestrationDescription, OrchestrationDescriptionId, OrchestrationDescriptionUniqueName,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("description registration failed: {0}")]
    Registration(String),
    #[error("unknown orchestration description id: {0}")]
    UnknownId(OrchestrationDescriptionId),
}

/// Catalog of descriptions keyed by unique name and by id.
#[derive(Debug)]
pub struct DescriptionRegistry {
    by_name: HashMap<String, BTreeMap<u32, Arc<OrchestrationDescription>>>,
    by_id: HashMap<OrchestrationDescriptionId, Arc<OrchestrationDescription>>,
}

impl DescriptionRegistry {
    pub fn builder() -> DescriptionRegistryBuilder {
        DescriptionRegistryBuilder {
            descriptions: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Look up by unique name. With `enabled_only`, a registered but disabled
    /// description resolves to `None`, which callers surface as
    /// unknown-or-disabled.
    pub fn get_or_default(
        &self,
        unique_name: &OrchestrationDescriptionUniqueName,
        enabled_only: bool,
    ) -> Option<Arc<OrchestrationDescription>> {
        let found = self
            .by_name
            .get(&unique_name.name)
            .and_then(|versions| versions.get(&unique_name.version))
            .filter(|d| !enabled_only || d.is_enabled())
            .cloned();
        if found.is_none() {
            self.log_miss(unique_name);
        }
        found
    }

    pub fn get(
        &self,
        id: OrchestrationDescriptionId,
    ) -> Result<Arc<OrchestrationDescription>, RegistryError> {
        self.by_id
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownId(id))
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn versions(&self, name: &str) -> Vec<u32> {
        self.by_name
            .get(name)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.by_id.len()
    }

    fn log_miss(&self, requested: &OrchestrationDescriptionUniqueName) {
        tracing::debug!(
            target: "orchestrion::registry",
            requested_name = %requested,
            available_versions = ?self.versions(&requested.name),
            registered_names = ?self.names(),
            "description lookup miss"
        );
    }
}

/// Collects registrations and reports every duplicate at build time.
pub struct DescriptionRegistryBuilder {
    descriptions: Vec<OrchestrationDescription>,
    errors: Vec<String>,
}

impl DescriptionRegistryBuilder {
    pub fn register(mut self, description: OrchestrationDescription) -> Self {
        if self
            .descriptions
            .iter()
            .any(|d| d.unique_name() == description.unique_name())
        {
            self.errors.push(format!(
                "duplicate description registration: {}",
                description.unique_name()
            ));
            return self;
        }
        self.descriptions.push(description);
        self
    }

    pub fn build(self) -> Result<DescriptionRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::Registration(self.errors.join("; ")));
        }
        let mut by_name: HashMap<String, BTreeMap<u32, Arc<OrchestrationDescription>>> =
            HashMap::new();
        let mut by_id = HashMap::new();
        for description in self.descriptions {
            let description = Arc::new(description);
            by_name
                .entry(description.unique_name().name.clone())
                .or_default()
                .insert(description.unique_name().version, Arc::clone(&description));
            by_id.insert(description.id(), description);
        }
        Ok(DescriptionRegistry { by_name, by_id })
    }
}
