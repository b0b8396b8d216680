//! Entities, their physics bodies and attached actions
//!
//! Entities live in a generational arena. Actions store an `EntityHandle`
//! back to their owner instead of an owning pointer; a handle whose slot was
//! freed or reused simply resolves to `None`.

use glam::{Quat, Vec3};
use smallvec::SmallVec;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::action::{Action, ActionContext, ActionError, ActionOutcome, ActionType};

/// Stable reference to an entity slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

/// The slice of a physics rigid body that actions read and write
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Awake in the physics simulation
    pub active: bool,
    pub is_static: bool,
    /// Transform was written directly and must be pushed to the engine
    pub kinematic_dirty: bool,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            active: false,
            is_static: false,
            kinematic_dirty: false,
        }
    }
}

impl RigidBody {
    pub fn at(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn force_non_static(&mut self) {
        self.is_static = false;
    }

    pub fn set_world_transform(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
        self.kinematic_dirty = true;
    }
}

#[derive(Debug)]
pub struct Entity {
    pub id: Uuid,
    /// Missing when the entity has no physics binding
    pub body: Option<RigidBody>,
    actions: SmallVec<[Action; 2]>,
    pub action_data_dirty: bool,
    pub action_data_needs_transmit: bool,
}

impl Entity {
    pub fn new(id: Uuid, body: Option<RigidBody>) -> Self {
        Self {
            id,
            body,
            actions: SmallVec::new(),
            action_data_dirty: false,
            action_data_needs_transmit: false,
        }
    }

    pub fn with_body(id: Uuid, body: RigidBody) -> Self {
        Self::new(id, Some(body))
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
        self.action_data_dirty = true;
    }

    pub fn remove_action(&mut self, action_id: Uuid) -> Option<Action> {
        let idx = self.actions.iter().position(|a| a.id() == action_id)?;
        let action = self.actions.remove(idx);
        action.release();
        self.action_data_dirty = true;
        Some(action)
    }

    pub fn action(&self, action_id: Uuid) -> Option<&Action> {
        self.actions.iter().find(|a| a.id() == action_id)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn actions_of_type(&self, action_type: ActionType) -> Vec<Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type() == action_type)
            .cloned()
            .collect()
    }

    fn remove_expired(&mut self, now: u64) -> usize {
        let before = self.actions.len();
        self.actions.retain(|action| {
            if action.is_expired(now) {
                action.release();
                false
            } else {
                true
            }
        });
        let removed = before - self.actions.len();
        if removed > 0 {
            self.action_data_dirty = true;
        }
        removed
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Per-tick tally of action updates
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActionTickReport {
    pub spring: usize,
    pub kinematic: usize,
    pub no_update: usize,
    pub skipped_contention: usize,
    pub missing_collaborator: usize,
    pub expired: usize,
}

#[derive(Debug, Default)]
pub struct EntityArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl EntityArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) -> EntityHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            EntityHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entity: Some(entity),
            });
            EntityHandle {
                index,
                generation: 0,
            }
        }
    }

    /// Remove an entity; its actions are released
    pub fn remove(&mut self, handle: EntityHandle) -> Option<Entity> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        for action in entity.actions() {
            action.release();
        }
        Some(entity)
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entity.as_ref()
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entity.as_mut()
    }

    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entity.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_handles(&self) -> Vec<EntityHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entity.is_some())
            .map(|(i, s)| EntityHandle {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    /// Run every action once; failures are logged and retried next tick
    pub fn update_actions(&mut self, ctx: &ActionContext<'_>, dt: f32) -> ActionTickReport {
        let mut report = ActionTickReport::default();
        let mut pending = Vec::new();

        for handle in self.live_handles() {
            if let Some(entity) = self.get_mut(handle) {
                report.expired += entity.remove_expired(ctx.now);
                pending.extend(entity.actions().iter().cloned());
            }
        }

        for action in pending {
            match action.update(self, ctx, dt) {
                Ok(ActionOutcome::Spring) => report.spring += 1,
                Ok(ActionOutcome::Kinematic) => report.kinematic += 1,
                Ok(ActionOutcome::NoUpdate) => report.no_update += 1,
                Err(ActionError::LockContention) => {
                    trace!("Action {} skipped: lock contention", action.id());
                    report.skipped_contention += 1;
                }
                Err(e) => {
                    debug!("Action {} update skipped: {}", action.id(), e);
                    report.missing_collaborator += 1;
                }
            }
        }

        report
    }
}
