//! Per-frame avatar bookkeeping
//!
//! `AvatarManager` owns the render-distance governor and the fade set and
//! drives the registry once per frame: apply mixer events, drop avatars the
//! network flagged, simulate every initialized remote avatar, then advance
//! fades and hand the batched scene edits to the renderer.

use std::sync::Arc;

use glam::Vec3;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::action::ActionContext;
use crate::audio::{SoundPlayer, SoundRequest};
use crate::avatar::collision::CollisionEvent;
use crate::avatar::constants::collision::AVATAR_STRETCH_FACTOR;
use crate::avatar::constants::send::MIN_TIME_BETWEEN_MY_AVATAR_DATA_SENDS_US;
use crate::avatar::entry::{Avatar, MotionStateId, SessionId, MY_AVATAR_KEY};
use crate::avatar::fade::FadeOutManager;
use crate::avatar::registry::{AvatarRegistry, Removal};
use crate::avatar::render_distance::{GovernorTuning, RenderDistanceGovernor};
use crate::net::mixer::{MixerEvent, MixerInbox};
use crate::scene::{PendingChanges, Scene};
use crate::util::clock::ServerClock;

/// What one `update_other_avatars` call did
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AvatarTickSummary {
    pub simulated: usize,
    pub rendered: usize,
    pub removed: usize,
    pub fading: usize,
    pub evicted: usize,
    pub render_distance: f32,
}

/// A light that only affects avatar rendering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalLight {
    pub color: Vec3,
    pub direction: Vec3,
}

pub struct AvatarManager {
    registry: Arc<AvatarRegistry>,
    clock: Arc<ServerClock>,
    scene: Arc<dyn Scene>,
    sounds: Option<Arc<dyn SoundPlayer>>,
    governor: RenderDistanceGovernor,
    fades: FadeOutManager,
    should_render_avatars: bool,
    rendered_count: usize,
    last_send_avatar_data: u64,
    next_motion_state: MotionStateId,
    motion_states_to_add: Vec<MotionStateId>,
    motion_states_to_delete: Vec<MotionStateId>,
    motion_states_to_change: HashSet<MotionStateId>,
    local_lights: Vec<LocalLight>,
}

impl AvatarManager {
    pub fn new(
        registry: Arc<AvatarRegistry>,
        clock: Arc<ServerClock>,
        scene: Arc<dyn Scene>,
        tuning: GovernorTuning,
    ) -> Self {
        Self {
            registry,
            clock,
            scene,
            sounds: None,
            governor: RenderDistanceGovernor::new(tuning),
            fades: FadeOutManager::new(),
            should_render_avatars: true,
            rendered_count: 0,
            last_send_avatar_data: 0,
            next_motion_state: 1,
            motion_states_to_add: Vec::new(),
            motion_states_to_delete: Vec::new(),
            motion_states_to_change: HashSet::new(),
            local_lights: Vec::new(),
        }
    }

    /// Route collision sounds of the local avatar to `player`
    pub fn set_sound_player(&mut self, player: Arc<dyn SoundPlayer>) {
        self.sounds = Some(player);
    }

    /// Create the local avatar and give it a render item
    pub fn init(&mut self) {
        self.registry.init();

        if self.should_render_avatars {
            let mut changes = PendingChanges::default();
            let my_avatar = self.registry.my_avatar();
            let mut avatar = my_avatar.write();
            changes.add_avatar(&avatar);
            avatar.in_scene = true;
            drop(avatar);
            self.scene.enqueue_pending_changes(changes);
        }
    }

    pub fn registry(&self) -> &Arc<AvatarRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<ServerClock> {
        &self.clock
    }

    /// Collaborators for this frame's action updates
    pub fn action_context(&self, now: u64) -> ActionContext<'_> {
        ActionContext {
            registry: &self.registry,
            clock: &self.clock,
            now,
        }
    }

    /// Simulate the local avatar; returns whether its data is due to be sent
    pub fn update_my_avatar(&mut self, now: u64, dt: f32) -> bool {
        self.registry.my_avatar().write().simulate(dt);

        if now.saturating_sub(self.last_send_avatar_data) > MIN_TIME_BETWEEN_MY_AVATAR_DATA_SENDS_US {
            self.last_send_avatar_data = now;
            true
        } else {
            false
        }
    }

    /// Apply one mixer event
    ///
    /// Data for an unknown participant creates and initializes its avatar;
    /// data about our own session is dropped.
    pub fn process_mixer_event(&mut self, event: MixerEvent) {
        match event {
            MixerEvent::AvatarData {
                session_id,
                position,
                hands,
            } => {
                if session_id == MY_AVATAR_KEY || session_id == self.registry.my_session_id() {
                    trace!("Ignoring mixer data for our own avatar");
                    return;
                }
                let shared = self.registry.add(session_id);
                let mut avatar = shared.write();
                avatar.position = position;
                avatar.hands = hands;
                if !avatar.initialized {
                    avatar.init();
                    debug!("Avatar {} initialized", session_id);
                }
            }
            MixerEvent::KillAvatar { session_id } => {
                self.remove_avatar(&session_id);
            }
        }
    }

    /// Apply every pending mixer event; returns how many were applied
    pub fn drain_inbox(&mut self, inbox: &MixerInbox) -> usize {
        let events = inbox.drain();
        let count = events.len();
        for event in events {
            self.process_mixer_event(event);
        }
        count
    }

    /// Take an avatar out of the registry, fading it if it was ever shown
    ///
    /// Returns false for our own avatar and for unknown ids.
    pub fn remove_avatar(&mut self, session_id: &SessionId) -> bool {
        let removal = self.registry.remove(session_id);
        self.handle_removal(session_id, removal)
    }

    /// Fade every initialized remote avatar, e.g. on leaving a domain
    pub fn clear_other_avatars(&mut self) -> usize {
        let removed = self.registry.clear_other_avatars();
        let count = removed.len();
        for avatar in removed {
            let id = avatar.read().session_id;
            self.handle_removal(&id, Removal::Fade(avatar));
        }
        count
    }

    fn handle_removal(&mut self, session_id: &SessionId, removal: Removal) -> bool {
        match removal {
            Removal::Fade(avatar) => {
                if let Some(motion_state) = avatar.write().motion_state.take() {
                    self.motion_states_to_change.remove(&motion_state);
                    self.motion_states_to_delete.push(motion_state);
                }
                self.fades.push(avatar);
                true
            }
            Removal::Dropped => true,
            Removal::Protected => {
                debug!("Refusing to remove our own avatar");
                false
            }
            Removal::Absent => {
                trace!("No avatar {} to remove", session_id);
                false
            }
        }
    }

    /// Advance every remote avatar and the fade set by one frame
    ///
    /// When `throttled` the governor holds its controller state and pulls the
    /// horizon to its farthest setting.
    pub fn update_other_avatars(
        &mut self,
        measured_frame_rate: f32,
        throttled: bool,
        dt: f32,
    ) -> AvatarTickSummary {
        let render_distance = if throttled {
            self.governor.update_throttled()
        } else {
            self.governor.update(measured_frame_rate, dt)
        };

        let mut summary = AvatarTickSummary {
            render_distance,
            ..Default::default()
        };

        for (id, removal) in self.registry.take_removable() {
            if self.handle_removal(&id, removal) {
                summary.removed += 1;
            }
        }

        let viewer = self.registry.my_avatar().read().position;
        let mut changes = PendingChanges::default();

        for (id, shared) in self.registry.hash_copy().iter() {
            if *id == MY_AVATAR_KEY {
                continue;
            }
            let mut avatar = shared.write();
            if !avatar.initialized {
                continue;
            }

            avatar.start_update();
            avatar.simulate(dt);
            if avatar.update_render_eligibility(viewer, render_distance) {
                summary.rendered += 1;
            }

            if self.should_render_avatars && !avatar.in_scene {
                changes.add_avatar(&avatar);
                avatar.in_scene = true;
            }
            if avatar.motion_state.is_none() {
                self.create_motion_state(&mut avatar);
            }
            avatar.end_update();
            summary.simulated += 1;
        }

        summary.evicted = self.fades.simulate(dt, &mut changes);
        summary.fading = self.fades.len();
        self.rendered_count = summary.rendered;

        if !changes.is_empty() {
            self.scene.enqueue_pending_changes(changes);
        }
        summary
    }

    /// Show or hide every avatar's render item
    pub fn update_avatar_render_status(&mut self, should_render: bool) {
        if should_render == self.should_render_avatars {
            return;
        }
        self.should_render_avatars = should_render;

        let mut changes = PendingChanges::default();
        for shared in self.registry.hash_copy().values() {
            let mut avatar = shared.write();
            if should_render && avatar.initialized && !avatar.in_scene {
                changes.add_avatar(&avatar);
                avatar.in_scene = true;
            } else if !should_render && avatar.in_scene {
                changes.remove_avatar(&avatar);
                avatar.in_scene = false;
            }
        }
        self.scene.enqueue_pending_changes(changes);
    }

    pub fn should_render_avatars(&self) -> bool {
        self.should_render_avatars
    }

    fn create_motion_state(&mut self, avatar: &mut Avatar) -> MotionStateId {
        let motion_state = self.next_motion_state;
        self.next_motion_state += 1;
        avatar.motion_state = Some(motion_state);
        self.motion_states_to_add.push(motion_state);
        motion_state
    }

    /// The avatar's collision shape changed
    ///
    /// An existing motion state is flagged for the physics engine to rebuild;
    /// an avatar without one gets a new motion state queued for addition.
    /// Returns false when no such avatar is registered.
    pub fn update_avatar_physics_shape(&mut self, session_id: &SessionId) -> bool {
        let Some(shared) = self.registry.get(session_id) else {
            trace!("No avatar {} to reshape", session_id);
            return false;
        };
        let mut avatar = shared.write();
        let existing = avatar.motion_state;
        match existing {
            Some(motion_state) => {
                self.motion_states_to_change.insert(motion_state);
            }
            None => {
                self.create_motion_state(&mut avatar);
            }
        }
        true
    }

    /// Motion states created and retired since the last call
    pub fn take_motion_state_changes(&mut self) -> (Vec<MotionStateId>, Vec<MotionStateId>) {
        (
            std::mem::take(&mut self.motion_states_to_add),
            std::mem::take(&mut self.motion_states_to_delete),
        )
    }

    /// Live motion states whose shape must be rebuilt, in ascending order
    pub fn take_objects_to_change(&mut self) -> Vec<MotionStateId> {
        let mut dirty: Vec<_> = self.motion_states_to_change.drain().collect();
        dirty.sort_unstable();
        dirty
    }

    /// Play the local avatar's collision sound for the first audible contact
    ///
    /// Only contacts involving the local avatar count. The first such contact
    /// that is too soft ends the scan, since there is only one local avatar
    /// to sound. Returns the volume played, if any.
    pub fn handle_collision_events(&self, events: &[CollisionEvent]) -> Option<f32> {
        let my_avatar = self.registry.my_avatar();
        let avatar = my_avatar.read();
        if avatar.collision_sound_url.is_empty() {
            return None;
        }

        let event = events.iter().find(|e| e.involves_my_avatar())?;
        let volume = event.sound_volume()?;
        if let Some(player) = &self.sounds {
            player.play_sound(SoundRequest {
                url: avatar.collision_sound_url.clone(),
                volume,
                stretch_factor: AVATAR_STRETCH_FACTOR,
                position: avatar.position,
            });
        }
        trace!("Collision sound at volume {:.3}", volume);
        Some(volume)
    }

    /// Replace the lights used for avatar rendering
    pub fn set_local_lights(&mut self, lights: Vec<LocalLight>) {
        self.local_lights = lights;
    }

    pub fn local_lights(&self) -> &[LocalLight] {
        &self.local_lights
    }

    /// Avatars inside the horizon on the last frame
    pub fn rendered_count(&self) -> usize {
        self.rendered_count
    }

    /// Departed avatars still shrinking
    pub fn fading_count(&self) -> usize {
        self.fades.len()
    }

    /// Smoothed horizon in meters
    pub fn render_distance(&self) -> f32 {
        self.governor.distance()
    }

    pub fn governor(&self) -> &RenderDistanceGovernor {
        &self.governor
    }

    pub fn governor_mut(&mut self) -> &mut RenderDistanceGovernor {
        &mut self.governor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::QueuedSounds;
    use crate::avatar::collision::ContactKind;
    use crate::avatar::entry::HandPoses;
    use crate::scene::ItemScene;
    use uuid::Uuid;

    fn manager() -> (AvatarManager, Arc<ItemScene>) {
        let scene = Arc::new(ItemScene::new());
        let mut manager = AvatarManager::new(
            Arc::new(AvatarRegistry::new()),
            Arc::new(ServerClock::default()),
            scene.clone(),
            GovernorTuning::default(),
        );
        manager.init();
        (manager, scene)
    }

    fn announce(manager: &mut AvatarManager, id: SessionId, position: Vec3) {
        manager.process_mixer_event(MixerEvent::AvatarData {
            session_id: id,
            position,
            hands: HandPoses::default(),
        });
    }

    #[test]
    fn test_init_adds_self_to_scene() {
        let (manager, scene) = manager();
        assert!(scene.contains(&MY_AVATAR_KEY));
        assert_eq!(manager.registry().len(), 1);
    }

    #[test]
    fn test_mixer_data_initializes_and_renders() {
        let (mut manager, scene) = manager();
        let id = Uuid::new_v4();
        announce(&mut manager, id, Vec3::new(3.0, 0.0, 0.0));

        let summary = manager.update_other_avatars(60.0, false, 1.0 / 60.0);
        assert_eq!(summary.simulated, 1);
        assert_eq!(summary.rendered, 1);
        assert!(scene.contains(&id));

        let (added, deleted) = manager.take_motion_state_changes();
        assert_eq!(added.len(), 1);
        assert!(deleted.is_empty());
    }

    #[test]
    fn test_own_session_data_is_ignored() {
        let (mut manager, _) = manager();
        let me = Uuid::new_v4();
        manager.registry().set_my_session_id(me);
        announce(&mut manager, me, Vec3::ONE);
        assert_eq!(manager.registry().len(), 1);
        assert_eq!(manager.registry().my_avatar().read().position, Vec3::ZERO);
    }

    #[test]
    fn test_kill_fades_then_removes_render_item() {
        let (mut manager, scene) = manager();
        let id = Uuid::new_v4();
        announce(&mut manager, id, Vec3::ZERO);
        manager.update_other_avatars(60.0, false, 1.0 / 60.0);
        manager.take_motion_state_changes();

        manager.process_mixer_event(MixerEvent::KillAvatar { session_id: id });
        assert_eq!(manager.fading_count(), 1);
        assert!(manager.registry().get(&id).is_none());
        let (_, deleted) = manager.take_motion_state_changes();
        assert_eq!(deleted.len(), 1);

        // 1.0 * 0.9^n <= 0.005 first holds at n = 51
        let mut ticks = 0;
        while manager.fading_count() > 0 {
            manager.update_other_avatars(60.0, false, 1.0 / 60.0);
            ticks += 1;
            assert!(ticks <= 100);
        }
        assert_eq!(ticks, 51);
        assert!(!scene.contains(&id));
    }

    #[test]
    fn test_reannounced_avatar_keeps_render_item_after_old_fade() {
        let (mut manager, scene) = manager();
        let id = Uuid::new_v4();
        announce(&mut manager, id, Vec3::ZERO);
        manager.update_other_avatars(60.0, false, 1.0 / 60.0);

        // Disconnect and come straight back while the old avatar fades
        manager.process_mixer_event(MixerEvent::KillAvatar { session_id: id });
        announce(&mut manager, id, Vec3::ZERO);
        for _ in 0..60 {
            manager.update_other_avatars(60.0, false, 1.0 / 60.0);
        }
        assert_eq!(manager.fading_count(), 0);

        let live = manager.registry().get(&id).unwrap();
        let live = live.read();
        assert!(live.in_scene);
        assert!(scene.contains_item(live.render_item()));
        assert!(scene.contains(&id));
    }

    #[test]
    fn test_physics_shape_change_marks_existing_motion_state() {
        let (mut manager, _) = manager();
        let id = Uuid::new_v4();
        announce(&mut manager, id, Vec3::ZERO);
        manager.update_other_avatars(60.0, false, 1.0 / 60.0);
        let (added, _) = manager.take_motion_state_changes();

        assert!(manager.update_avatar_physics_shape(&id));
        assert!(manager.update_avatar_physics_shape(&id));
        assert_eq!(manager.take_objects_to_change(), added);
        assert!(manager.take_objects_to_change().is_empty());
        let (added_again, _) = manager.take_motion_state_changes();
        assert!(added_again.is_empty());
    }

    #[test]
    fn test_physics_shape_creates_missing_motion_state() {
        let (mut manager, _) = manager();
        let id = Uuid::new_v4();
        manager.registry().add(id);

        assert!(manager.update_avatar_physics_shape(&id));
        let (added, _) = manager.take_motion_state_changes();
        assert_eq!(added.len(), 1);
        assert_eq!(manager.registry().get(&id).unwrap().read().motion_state, Some(added[0]));
        assert!(manager.take_objects_to_change().is_empty());

        assert!(!manager.update_avatar_physics_shape(&Uuid::new_v4()));
    }

    #[test]
    fn test_removed_avatar_leaves_change_queue() {
        let (mut manager, _) = manager();
        let id = Uuid::new_v4();
        announce(&mut manager, id, Vec3::ZERO);
        manager.update_other_avatars(60.0, false, 1.0 / 60.0);
        manager.update_avatar_physics_shape(&id);

        manager.remove_avatar(&id);
        assert!(manager.take_objects_to_change().is_empty());
        let (_, deleted) = manager.take_motion_state_changes();
        assert_eq!(deleted.len(), 1);
    }

    fn contact(kind: ContactKind, velocity_change: Vec3, with_me: bool) -> CollisionEvent {
        CollisionEvent {
            id_a: if with_me { Uuid::nil() } else { Uuid::new_v4() },
            id_b: Uuid::new_v4(),
            kind,
            velocity_change,
        }
    }

    #[test]
    fn test_collision_sound_for_local_avatar() {
        let (mut manager, _) = manager();
        let sounds = Arc::new(QueuedSounds::new());
        manager.set_sound_player(sounds.clone());
        {
            let me = manager.registry().my_avatar();
            let mut me = me.write();
            me.collision_sound_url = "sounds/bump.wav".into();
            me.position = Vec3::new(1.0, 2.0, 3.0);
        }

        let events = [
            contact(ContactKind::Start, Vec3::splat(5.0), false),
            contact(ContactKind::Start, Vec3::new(0.5, 0.0, 0.0), true),
        ];
        let volume = manager.handle_collision_events(&events).unwrap();
        assert!((volume - 0.5).abs() < 1e-6);

        let played = sounds.take();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].url, "sounds/bump.wav");
        assert_eq!(played[0].stretch_factor, 1.0);
        assert_eq!(played[0].position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_soft_or_silent_collisions_play_nothing() {
        let (mut manager, _) = manager();
        let sounds = Arc::new(QueuedSounds::new());
        manager.set_sound_player(sounds.clone());

        // No sound configured
        let loud = [contact(ContactKind::Start, Vec3::ONE, true)];
        assert_eq!(manager.handle_collision_events(&loud), None);

        manager.registry().my_avatar().write().collision_sound_url = "bump".into();
        // A soft first contact ends the scan before the loud one
        let events = [
            contact(ContactKind::Start, Vec3::new(0.001, 0.0, 0.0), true),
            contact(ContactKind::Start, Vec3::ONE, true),
        ];
        assert_eq!(manager.handle_collision_events(&events), None);
        let ongoing = [contact(ContactKind::Continue, Vec3::ONE, true)];
        assert_eq!(manager.handle_collision_events(&ongoing), None);
        assert!(sounds.is_empty());
    }

    #[test]
    fn test_local_lights() {
        let (mut manager, _) = manager();
        assert!(manager.local_lights().is_empty());
        let lights = vec![
            LocalLight {
                color: Vec3::ONE,
                direction: Vec3::NEG_Y,
            },
            LocalLight {
                color: Vec3::new(1.0, 0.5, 0.0),
                direction: Vec3::X,
            },
        ];
        manager.set_local_lights(lights.clone());
        assert_eq!(manager.local_lights(), lights.as_slice());
        manager.set_local_lights(Vec::new());
        assert!(manager.local_lights().is_empty());
    }

    #[test]
    fn test_uninitialized_removal_does_not_fade() {
        let (mut manager, _) = manager();
        let id = Uuid::new_v4();
        manager.registry().add(id);
        assert!(manager.remove_avatar(&id));
        assert_eq!(manager.fading_count(), 0);
    }

    #[test]
    fn test_self_removal_refused() {
        let (mut manager, scene) = manager();
        assert!(!manager.remove_avatar(&MY_AVATAR_KEY));
        assert!(scene.contains(&MY_AVATAR_KEY));
    }

    #[test]
    fn test_flagged_avatars_removed_on_tick() {
        let (mut manager, _) = manager();
        let id = Uuid::new_v4();
        announce(&mut manager, id, Vec3::ZERO);
        manager.registry().get(&id).unwrap().write().should_die = true;

        let summary = manager.update_other_avatars(60.0, false, 1.0 / 60.0);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.simulated, 0);
        assert_eq!(summary.fading, 1);
    }

    #[test]
    fn test_clear_other_avatars() {
        let (mut manager, _) = manager();
        for _ in 0..3 {
            announce(&mut manager, Uuid::new_v4(), Vec3::ZERO);
        }
        manager.registry().add(Uuid::new_v4());
        assert_eq!(manager.clear_other_avatars(), 3);
        assert_eq!(manager.fading_count(), 3);
        assert_eq!(manager.registry().len(), 2);
    }

    #[test]
    fn test_render_distance_bounds_rendering() {
        let (mut manager, _) = manager();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        announce(&mut manager, near, Vec3::new(2.0, 0.0, 0.0));
        announce(&mut manager, far, Vec3::new(1_000.0, 0.0, 0.0));

        // A frame rate far below target pulls the horizon in
        let mut summary = AvatarTickSummary::default();
        for _ in 0..600 {
            summary = manager.update_other_avatars(5.0, false, 1.0 / 60.0);
        }
        let governor = manager.governor();
        assert!(summary.render_distance >= governor.min_distance() - 1e-3);
        assert!(summary.render_distance < 1_000.0);
        assert_eq!(summary.rendered, 1);
        assert_eq!(manager.rendered_count(), 1);
    }

    #[test]
    fn test_render_status_toggle() {
        let (mut manager, scene) = manager();
        let id = Uuid::new_v4();
        announce(&mut manager, id, Vec3::ZERO);
        manager.update_other_avatars(60.0, false, 1.0 / 60.0);
        assert_eq!(scene.len(), 2);

        manager.update_avatar_render_status(false);
        assert!(scene.is_empty());

        manager.update_avatar_render_status(true);
        assert!(scene.contains(&id));
        assert!(scene.contains(&MY_AVATAR_KEY));
    }

    #[test]
    fn test_my_avatar_send_throttle() {
        let (mut manager, _) = manager();
        let start = 10_000_000;
        assert!(manager.update_my_avatar(start, 0.016));
        assert!(!manager.update_my_avatar(start + 1_000, 0.016));
        assert!(manager.update_my_avatar(start + MIN_TIME_BETWEEN_MY_AVATAR_DATA_SENDS_US + 1, 0.016));
    }
}
