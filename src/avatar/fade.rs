//! Shrink-and-remove animation for avatars that left the session

use tracing::trace;

use crate::avatar::constants::fade::SHRINK_RATE;
use crate::avatar::constants::world::MIN_AVATAR_SCALE;
use crate::avatar::entry::SharedAvatar;
use crate::scene::PendingChanges;

pub struct FadeOutManager {
    fades: Vec<SharedAvatar>,
    shrink_rate: f32,
    min_scale: f32,
}

impl FadeOutManager {
    pub fn new() -> Self {
        Self::with_limits(SHRINK_RATE, MIN_AVATAR_SCALE)
    }

    /// Custom shrink factor per tick and eviction scale
    pub fn with_limits(shrink_rate: f32, min_scale: f32) -> Self {
        Self {
            fades: Vec::new(),
            shrink_rate,
            min_scale,
        }
    }

    /// Start fading an avatar that has already left the registry
    pub fn push(&mut self, avatar: SharedAvatar) {
        self.fades.push(avatar);
    }

    pub fn len(&self) -> usize {
        self.fades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fades.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedAvatar> {
        self.fades.iter()
    }

    /// Shrink every fading avatar once, in insertion order
    ///
    /// Entries at or below the minimum scale are evicted and their render
    /// items queued for removal; the rest keep simulating at the new scale.
    /// Returns the number evicted.
    pub fn simulate(&mut self, dt: f32, changes: &mut PendingChanges) -> usize {
        let shrink_rate = self.shrink_rate;
        let min_scale = self.min_scale;
        let before = self.fades.len();

        self.fades.retain(|shared| {
            let mut avatar = shared.write();
            avatar.start_update();
            avatar.target_scale = avatar.scale * shrink_rate;
            let keep = if avatar.target_scale <= min_scale {
                if avatar.in_scene {
                    changes.remove_avatar(&avatar);
                    avatar.in_scene = false;
                }
                trace!("Fade finished for {}", avatar.session_id);
                false
            } else {
                avatar.simulate(dt);
                true
            };
            avatar.end_update();
            keep
        });

        before - self.fades.len()
    }
}

impl Default for FadeOutManager {
    fn default() -> Self {
        Self::new()
    }
}
