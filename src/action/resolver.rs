//! Combining several holds on one entity
//!
//! When more than one participant holds the same entity every hold pulls
//! toward the mean of all holders' target positions. Rotation is not
//! averaged: each instance keeps the rotation its own holder wants.

use std::sync::Arc;

use glam::{Quat, Vec3};
use uuid::Uuid;

use crate::action::hold::HoldAction;
use crate::action::ActionType;
use crate::avatar::registry::AvatarRegistry;
use crate::world::{EntityArena, EntityHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTarget {
    pub position: Vec3,
    /// Rotation wanted by the instance that asked
    pub rotation: Quat,
    pub holder_count: usize,
}

/// Resolve the shared target for `evaluating_id` among `holds`
///
/// Holds whose holder is not in the registry are skipped. Returns `None`
/// when nobody is holding or when the evaluating hold itself has no holder.
pub fn resolve_targets(
    holds: &[Arc<HoldAction>],
    evaluating_id: Uuid,
    registry: &AvatarRegistry,
) -> Option<ResolvedTarget> {
    let mut sum = Vec3::ZERO;
    let mut holder_count = 0usize;
    let mut own_rotation = None;

    for hold in holds {
        let Some((position, rotation)) = hold.target(registry) else {
            continue;
        };
        sum += position;
        holder_count += 1;
        if hold.id() == evaluating_id {
            own_rotation = Some(rotation);
        }
    }

    if holder_count == 0 {
        return None;
    }
    Some(ResolvedTarget {
        position: sum / holder_count as f32,
        rotation: own_rotation?,
        holder_count,
    })
}

/// Resolve for one hold by gathering every hold on its owner
pub fn resolve_for_owner(
    arena: &EntityArena,
    owner: EntityHandle,
    evaluating_id: Uuid,
    registry: &AvatarRegistry,
) -> Option<ResolvedTarget> {
    let holds: Vec<Arc<HoldAction>> = arena
        .get(owner)?
        .actions_of_type(ActionType::Hold)
        .iter()
        .filter_map(|a| a.as_hold().cloned())
        .collect();
    resolve_targets(&holds, evaluating_id, registry)
}
