use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a human user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a system or market-participant actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The caller attributed to an instance-affecting command, recorded for audit.
///
/// A `User` is a human acting on behalf of an actor; an `Actor` is a system
/// or market participant acting on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperatingIdentity {
    User { user_id: UserId, actor_id: ActorId },
    Actor { actor_id: ActorId },
}

impl OperatingIdentity {
    pub fn user(user_id: UserId, actor_id: ActorId) -> Self {
        Self::User { user_id, actor_id }
    }

    pub fn actor(actor_id: ActorId) -> Self {
        Self::Actor { actor_id }
    }

    /// The actor this command is attributed to, regardless of variant.
    pub fn actor_id(&self) -> ActorId {
        match self {
            Self::User { actor_id, .. } | Self::Actor { actor_id } => *actor_id,
        }
    }
}
