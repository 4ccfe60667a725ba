//! Feature flags consulted by the command layer.

use std::collections::HashSet;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    /// Downgrades "notify target not found" from a hard error to a logged
    /// no-op. Notifications may legitimately race instance completion.
    SilentMode,
}

impl FeatureFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SilentMode => "SilentMode",
        }
    }
}

impl std::fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait FeatureFlagManager: Send + Sync {
    async fn is_enabled(&self, flag: FeatureFlag) -> bool;
}

/// Flag set fixed at construction time; the default has everything disabled.
#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
    enabled: HashSet<FeatureFlag>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, flag: FeatureFlag) -> Self {
        self.enabled.insert(flag);
        self
    }
}

#[async_trait]
impl FeatureFlagManager for StaticFeatureFlags {
    async fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.enabled.contains(&flag)
    }
}
