//! Physics contacts involving the local avatar

use glam::Vec3;
use uuid::Uuid;

use crate::avatar::constants::collision::{
    COLLISION_ENERGY_AT_FULL_VOLUME, MIN_AVATAR_COLLISION_ACCELERATION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Start,
    Continue,
    End,
}

/// One contact reported by the physics engine
///
/// The local avatar has a nil id; remote avatars carry ids no entity
/// matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub id_a: Uuid,
    pub id_b: Uuid,
    pub kind: ContactKind,
    pub velocity_change: Vec3,
}

impl CollisionEvent {
    pub fn involves_my_avatar(&self) -> bool {
        self.id_a.is_nil() || self.id_b.is_nil()
    }

    /// Volume for this contact, or `None` when it should stay silent
    ///
    /// Only the first moment of contact is audible, and only above the
    /// acceleration gate. The mass part of the kinetic energy is taken as
    /// already accounted for, so energy is the squared velocity change.
    pub fn sound_volume(&self) -> Option<f32> {
        let velocity_change = self.velocity_change.length();
        if self.kind != ContactKind::Start || velocity_change <= MIN_AVATAR_COLLISION_ACCELERATION {
            return None;
        }
        let energy = velocity_change * velocity_change;
        Some((energy / COLLISION_ENERGY_AT_FULL_VOLUME).min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(kind: ContactKind, velocity_change: Vec3) -> CollisionEvent {
        CollisionEvent {
            id_a: Uuid::nil(),
            id_b: Uuid::new_v4(),
            kind,
            velocity_change,
        }
    }

    #[test]
    fn test_volume_scales_with_energy() {
        let soft = contact(ContactKind::Start, Vec3::new(0.5, 0.0, 0.0));
        assert!((soft.sound_volume().unwrap() - 0.5).abs() < 1e-6);

        let hard = contact(ContactKind::Start, Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(hard.sound_volume(), Some(1.0));
    }

    #[test]
    fn test_gate_and_contact_kind() {
        assert_eq!(contact(ContactKind::Start, Vec3::new(0.005, 0.0, 0.0)).sound_volume(), None);
        assert_eq!(contact(ContactKind::Continue, Vec3::ONE).sound_volume(), None);
        assert_eq!(contact(ContactKind::End, Vec3::ONE).sound_volume(), None);
    }

    #[test]
    fn test_involves_my_avatar() {
        let mut event = contact(ContactKind::Start, Vec3::ONE);
        assert!(event.involves_my_avatar());
        event.id_a = Uuid::new_v4();
        assert!(!event.involves_my_avatar());
        event.id_b = Uuid::nil();
        assert!(event.involves_my_avatar());
    }
}
