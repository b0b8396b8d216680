//! Physics actions attached to entities
//!
//! The set of action kinds is closed: `Action` is an enum over the concrete
//! kinds and dispatches the shared capabilities (update, serialize,
//! deserialize, arguments) by match.

pub mod arguments;
pub mod base;
pub mod hold;
pub mod record;
pub mod resolver;
pub mod spring;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::arguments::ArgumentMap;
use crate::action::hold::HoldAction;
use crate::action::record::RecordError;
use crate::action::spring::SpringAction;
use crate::avatar::registry::AvatarRegistry;
use crate::util::clock::ServerClock;
use crate::world::{EntityArena, EntityHandle};

/// Wire tag of an action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Spring,
    Hold,
}

/// Collaborators an action needs during a tick
pub struct ActionContext<'a> {
    pub registry: &'a AvatarRegistry,
    pub clock: &'a ServerClock,
    /// Local time in microseconds
    pub now: u64,
}

/// Result of one action update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// No live holder or target; prior target left untouched
    NoUpdate,
    /// Spring attraction applied
    Spring,
    /// Transform written directly
    Kinematic,
}

/// Action errors. None of these are fatal: callers keep the previous state
/// and try again next tick.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("Action state is locked")]
    LockContention,
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
}

impl From<RecordError> for ActionError {
    fn from(e: RecordError) -> Self {
        ActionError::MalformedRecord(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Spring(Arc<SpringAction>),
    Hold(Arc<HoldAction>),
}

impl Action {
    pub fn id(&self) -> Uuid {
        match self {
            Action::Spring(a) => a.id(),
            Action::Hold(a) => a.id(),
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Action::Spring(_) => ActionType::Spring,
            Action::Hold(_) => ActionType::Hold,
        }
    }

    pub fn owner(&self) -> EntityHandle {
        match self {
            Action::Spring(a) => a.owner(),
            Action::Hold(a) => a.owner(),
        }
    }

    pub fn as_hold(&self) -> Option<&Arc<HoldAction>> {
        match self {
            Action::Hold(a) => Some(a),
            _ => None,
        }
    }

    pub fn update(
        &self,
        arena: &mut EntityArena,
        ctx: &ActionContext<'_>,
        dt: f32,
    ) -> Result<ActionOutcome, ActionError> {
        match self {
            Action::Spring(a) => a.update(arena, dt),
            Action::Hold(a) => a.update(arena, ctx, dt),
        }
    }

    pub fn serialize(&self, clock: &ServerClock) -> Result<Vec<u8>, ActionError> {
        match self {
            Action::Spring(a) => a.serialize(clock),
            Action::Hold(a) => a.serialize(clock),
        }
    }

    /// Apply a serialized record and wake the owner's body on success
    pub fn deserialize(
        &self,
        arena: &mut EntityArena,
        bytes: &[u8],
        clock: &ServerClock,
    ) -> Result<(), ActionError> {
        match self {
            Action::Spring(a) => a.deserialize(bytes, clock)?,
            Action::Hold(a) => a.deserialize(bytes, clock)?,
        }
        self.wake_owner(arena, false);
        Ok(())
    }

    pub fn arguments(&self, now: u64) -> ArgumentMap {
        match self {
            Action::Spring(a) => a.arguments(now),
            Action::Hold(a) => a.arguments(now),
        }
    }

    /// Apply an arguments map; returns whether anything changed
    ///
    /// A change flags the owner's action data for local refresh and for
    /// transmission to the entity server.
    pub fn update_arguments(
        &self,
        arena: &mut EntityArena,
        args: &ArgumentMap,
        ctx: &ActionContext<'_>,
    ) -> bool {
        let changed = match self {
            Action::Spring(a) => a.update_arguments(args, ctx.now),
            Action::Hold(a) => a.update_arguments(args, ctx.registry.my_session_id(), ctx.now),
        };
        if changed {
            self.wake_owner(arena, true);
        }
        changed
    }

    fn wake_owner(&self, arena: &mut EntityArena, mark_dirty: bool) {
        if let Some(owner) = arena.get_mut(self.owner()) {
            if mark_dirty {
                owner.action_data_dirty = true;
                owner.action_data_needs_transmit = true;
            }
            if let Some(body) = owner.body.as_mut() {
                body.activate();
                body.force_non_static();
            }
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        match self {
            Action::Spring(a) => a.is_expired(now),
            Action::Hold(a) => a.is_expired(now),
        }
    }

    pub fn release(&self) {
        match self {
            Action::Spring(a) => a.release(),
            Action::Hold(a) => a.release(),
        }
    }
}
