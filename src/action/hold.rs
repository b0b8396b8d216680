//! Hold action: binds an entity to a participant's tracked hand
//!
//! Every tick the action resolves a target pose from all holders of its
//! owner entity, then either springs the owner's body toward it or, in
//! kinematic mode, writes the transform directly.
//!
//! The tick path only ever *tries* the write lock. If a script or network
//! update is holding it, the tick is skipped rather than stalling the
//! simulation thread.

use glam::{Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::action::arguments::{
    extract_bool, extract_f32, extract_quat, extract_string, extract_vec3, or_previous,
    quat_to_value, uuid_to_value, vec3_to_value, ArgumentMap,
};
use crate::action::base::ActionBase;
use crate::action::record::{decode_body, encode_record, open_record, RecordHeader};
use crate::action::resolver::resolve_for_owner;
use crate::action::spring::spring_step;
use crate::action::{ActionContext, ActionError, ActionOutcome, ActionType};
use crate::avatar::constants::hold::{DEFAULT_TIMESCALE, HOLD_VERSION, MIN_TIMESCALE};
use crate::avatar::entry::{Hand, SessionId};
use crate::avatar::registry::AvatarRegistry;
use crate::util::clock::ServerClock;
use crate::world::{EntityArena, EntityHandle, RigidBody};

/// Lifecycle of a hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPhase {
    /// Created, no valid arguments yet
    Inactive,
    /// Tracking, blended by spring
    Spring,
    /// Tracking, transform written directly
    Kinematic,
    /// Owner or action destroyed
    Released,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoldState {
    pub base: ActionBase,
    pub holder_id: SessionId,
    pub hand: Hand,
    pub relative_position: Vec3,
    pub relative_rotation: Quat,
    pub linear_time_scale: f32,
    /// Mirrors `linear_time_scale`
    pub angular_time_scale: f32,
    pub kinematic: bool,
    pub kinematic_set_velocity: bool,
    pub ignore_ik: bool,

    pub positional_target: Vec3,
    pub rotational_target: Quat,
    pub positional_target_set: bool,
    pub rotational_target_set: bool,

    pub previous_set: bool,
    pub previous_positional_target: Vec3,
    pub previous_rotational_target: Quat,
    pub previous_positional_delta: Vec3,
    pub previous_delta_time_step: f32,
}

impl Default for HoldState {
    fn default() -> Self {
        Self {
            base: ActionBase::default(),
            holder_id: Uuid::nil(),
            hand: Hand::Right,
            relative_position: Vec3::ZERO,
            relative_rotation: Quat::IDENTITY,
            linear_time_scale: DEFAULT_TIMESCALE,
            angular_time_scale: DEFAULT_TIMESCALE,
            kinematic: false,
            kinematic_set_velocity: false,
            ignore_ik: false,
            positional_target: Vec3::ZERO,
            rotational_target: Quat::IDENTITY,
            positional_target_set: false,
            rotational_target_set: false,
            previous_set: false,
            previous_positional_target: Vec3::ZERO,
            previous_rotational_target: Quat::IDENTITY,
            previous_positional_delta: Vec3::ZERO,
            previous_delta_time_step: 0.0,
        }
    }
}

/// Configurable fields compared to decide whether an update changed anything
#[derive(Debug, Clone, PartialEq)]
struct HoldConfig {
    relative_position: Vec3,
    relative_rotation: Quat,
    time_scale: f32,
    hand: Hand,
    holder_id: SessionId,
    kinematic: bool,
    kinematic_set_velocity: bool,
    ignore_ik: bool,
}

/// Body of a version-1 hold record, in wire order
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HoldRecordBody {
    holder_id: Uuid,
    relative_position: Vec3,
    relative_rotation: Quat,
    linear_time_scale: f32,
    hand: String,
    expires: u64,
    tag: String,
    kinematic: bool,
    kinematic_set_velocity: bool,
}

#[derive(Debug)]
pub struct HoldAction {
    id: Uuid,
    owner: EntityHandle,
    state: RwLock<HoldState>,
}

impl HoldAction {
    pub fn new(id: Uuid, owner: EntityHandle) -> Self {
        Self::from_state(id, owner, HoldState::default())
    }

    pub fn from_state(id: Uuid, owner: EntityHandle, state: HoldState) -> Self {
        Self {
            id,
            owner,
            state: RwLock::new(state),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> EntityHandle {
        self.owner
    }

    /// Snapshot of the current state
    pub fn state(&self) -> HoldState {
        self.state.read().clone()
    }

    pub fn phase(&self) -> HoldPhase {
        let state = self.state.read();
        if state.base.released {
            HoldPhase::Released
        } else if !state.base.active {
            HoldPhase::Inactive
        } else if state.kinematic {
            HoldPhase::Kinematic
        } else {
            HoldPhase::Spring
        }
    }

    /// While held, location edits from other sources are ignored
    pub fn should_suppress_location_edits(&self, arena: &EntityArena) -> bool {
        self.state.read().base.active && arena.is_alive(self.owner)
    }

    /// World pose this action wants for its owner, if its holder is present
    ///
    /// Returns `(position, rotation)`. A contended state lock counts as no
    /// holder for this tick.
    pub fn target(&self, registry: &AvatarRegistry) -> Option<(Vec3, Quat)> {
        let state = self.state.try_read()?;
        let holder = registry.get_by_session_id(&state.holder_id)?;
        let avatar = holder.read();

        // Raw tracking is only available for our own hands
        let bypass_ik = state.ignore_ik && avatar.is_my_avatar();
        let palm = avatar.palm_pose(state.hand, bypass_ik);

        let rotation = palm.rotation * state.relative_rotation;
        let position = palm.position + rotation * state.relative_position;
        Some((position, rotation))
    }

    pub fn update(
        &self,
        arena: &mut EntityArena,
        ctx: &ActionContext<'_>,
        dt: f32,
    ) -> Result<ActionOutcome, ActionError> {
        if !arena.is_alive(self.owner) {
            return Err(ActionError::MissingCollaborator("owner entity"));
        }
        let Some(resolved) = resolve_for_owner(arena, self.owner, self.id, ctx.registry) else {
            return Ok(ActionOutcome::NoUpdate);
        };

        let mut state = self.state.try_write().ok_or(ActionError::LockContention)?;
        state.positional_target = resolved.position;
        state.rotational_target = resolved.rotation;
        state.positional_target_set = true;
        state.rotational_target_set = true;
        state.base.active = true;

        let body = arena
            .get_mut(self.owner)
            .ok_or(ActionError::MissingCollaborator("owner entity"))?
            .body
            .as_mut()
            .ok_or(ActionError::MissingCollaborator("physics body"))?;

        if state.kinematic {
            Self::kinematic_update(&mut state, body, dt);
            body.activate();
            body.force_non_static();
            Ok(ActionOutcome::Kinematic)
        } else {
            body.activate();
            body.force_non_static();
            spring_step(
                body,
                state.positional_target,
                state.rotational_target,
                state.linear_time_scale,
                state.angular_time_scale,
            );
            Ok(ActionOutcome::Spring)
        }
    }

    fn kinematic_update(state: &mut HoldState, body: &mut RigidBody, dt: f32) {
        if state.kinematic_set_velocity && state.previous_set {
            // Smooth velocity over 2 frames
            let delta = state.positional_target - state.previous_positional_target;
            let elapsed = dt + state.previous_delta_time_step;
            if elapsed > 0.0 {
                body.linear_velocity = (delta + state.previous_positional_delta) / elapsed;
            }
            state.previous_positional_delta = delta;
            state.previous_delta_time_step = dt;
        }

        body.set_world_transform(state.positional_target, state.rotational_target);

        state.previous_positional_target = state.positional_target;
        state.previous_rotational_target = state.rotational_target;
        state.previous_set = true;
    }

    /// Apply an arguments map. The holder is always the local participant.
    ///
    /// Returns whether any field changed.
    pub fn update_arguments(&self, args: &ArgumentMap, local_session_id: SessionId, now: u64) -> bool {
        let (next, base) = {
            let state = self.state.read();
            let current = HoldConfig {
                relative_position: state.relative_position,
                relative_rotation: state.relative_rotation,
                time_scale: state.linear_time_scale,
                hand: state.hand,
                holder_id: state.holder_id,
                kinematic: state.kinematic,
                kinematic_set_velocity: state.kinematic_set_velocity,
                ignore_ik: state.ignore_ik,
            };

            let hand = match extract_string(args, "hand") {
                Ok(Some(label)) => Hand::parse(&label).unwrap_or_else(|| {
                    debug!("Hold {} ignoring hand '{}'", self.id, label);
                    current.hand
                }),
                Ok(None) => current.hand,
                Err(e) => {
                    debug!("{}; keeping previous hand", e);
                    current.hand
                }
            };

            let next = HoldConfig {
                relative_position: or_previous(extract_vec3(args, "relativePosition"), current.relative_position),
                relative_rotation: or_previous(extract_quat(args, "relativeRotation"), current.relative_rotation),
                time_scale: or_previous(extract_f32(args, "timeScale"), current.time_scale),
                hand,
                holder_id: local_session_id,
                kinematic: or_previous(extract_bool(args, "kinematic"), current.kinematic),
                kinematic_set_velocity: or_previous(
                    extract_bool(args, "kinematicSetVelocity"),
                    current.kinematic_set_velocity,
                ),
                ignore_ik: or_previous(extract_bool(args, "ignoreIK"), current.ignore_ik),
            };

            let mut base = state.base.clone();
            let base_changed = base.update_arguments(args, now);
            if !base_changed && next == current {
                return false;
            }
            (next, base)
        };

        let mut state = self.state.write();
        state.base.expires = base.expires;
        state.base.tag = base.tag;
        state.relative_position = next.relative_position;
        state.relative_rotation = next.relative_rotation;
        state.linear_time_scale = next.time_scale.max(MIN_TIMESCALE);
        state.angular_time_scale = state.linear_time_scale;
        state.hand = next.hand;
        state.holder_id = next.holder_id;
        state.kinematic = next.kinematic;
        state.kinematic_set_velocity = next.kinematic_set_velocity;
        state.ignore_ik = next.ignore_ik;
        state.base.active = true;
        true
    }

    pub fn arguments(&self, now: u64) -> ArgumentMap {
        let state = self.state.read();
        let mut args = ArgumentMap::new();
        state.base.write_arguments(&mut args, now);
        args.insert("holderID".into(), uuid_to_value(state.holder_id));
        args.insert("relativePosition".into(), vec3_to_value(state.relative_position));
        args.insert("relativeRotation".into(), quat_to_value(state.relative_rotation));
        args.insert("timeScale".into(), Value::from(state.linear_time_scale));
        args.insert("hand".into(), Value::String(state.hand.as_str().to_string()));
        args.insert("kinematic".into(), Value::Bool(state.kinematic));
        args.insert("kinematicSetVelocity".into(), Value::Bool(state.kinematic_set_velocity));
        args.insert("ignoreIK".into(), Value::Bool(state.ignore_ik));
        args
    }

    pub fn serialize(&self, clock: &ServerClock) -> Result<Vec<u8>, ActionError> {
        let state = self.state.read();
        let header = RecordHeader {
            action_type: ActionType::Hold,
            action_id: self.id,
            version: HOLD_VERSION,
        };
        let body = HoldRecordBody {
            holder_id: state.holder_id,
            relative_position: state.relative_position,
            relative_rotation: state.relative_rotation,
            linear_time_scale: state.linear_time_scale,
            hand: state.hand.as_str().to_string(),
            expires: clock.local_to_server(state.base.expires),
            tag: state.base.tag.clone(),
            kinematic: state.kinematic,
            kinematic_set_velocity: state.kinematic_set_velocity,
        };
        Ok(encode_record(&header, &body)?)
    }

    /// Apply a record; on any mismatch the current state is left untouched
    pub fn deserialize(&self, bytes: &[u8], clock: &ServerClock) -> Result<(), ActionError> {
        let body: HoldRecordBody = open_record(bytes, ActionType::Hold, self.id, HOLD_VERSION)
            .and_then(decode_body)
            .map_err(|e| {
                warn!("Hold action {} ignored record: {}", self.id, e);
                ActionError::from(e)
            })?;
        let hand = Hand::parse(&body.hand).ok_or_else(|| {
            warn!("Hold action {} ignored record: hand '{}'", self.id, body.hand);
            ActionError::MalformedRecord(format!("unknown hand '{}'", body.hand))
        })?;

        let mut state = self.state.write();
        state.holder_id = body.holder_id;
        state.relative_position = body.relative_position;
        state.relative_rotation = body.relative_rotation;
        state.linear_time_scale = body.linear_time_scale;
        state.angular_time_scale = body.linear_time_scale;
        state.hand = hand;
        state.base.expires = clock.server_to_local(body.expires);
        state.base.tag = body.tag;
        state.kinematic = body.kinematic;
        state.kinematic_set_velocity = body.kinematic_set_velocity;
        state.base.active = true;
        Ok(())
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.state.read().base.is_expired(now)
    }

    pub fn release(&self) {
        let mut state = self.state.write();
        state.base.active = false;
        state.base.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::action::Action;
    use crate::avatar::entry::PalmPose;
    use crate::world::Entity;
    use serde_json::json;

    struct Fixture {
        registry: AvatarRegistry,
        clock: ServerClock,
        arena: EntityArena,
        owner: EntityHandle,
        me: SessionId,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = AvatarRegistry::new();
            registry.init();
            let me = Uuid::new_v4();
            registry.set_my_session_id(me);
            registry.my_avatar().write().hands = crate::avatar::entry::HandPoses {
                tracked: [PalmPose::default(), PalmPose::new(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY)],
                resolved: [PalmPose::default(), PalmPose::new(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY)],
            };

            let mut arena = EntityArena::new();
            let owner = arena.insert(Entity::with_body(Uuid::new_v4(), RigidBody::default()));
            Self {
                registry,
                clock: ServerClock::default(),
                arena,
                owner,
                me,
            }
        }

        fn ctx(&self) -> ActionContext<'_> {
            ActionContext {
                registry: &self.registry,
                clock: &self.clock,
                now: 1_000,
            }
        }

        fn attach(&mut self, args: Value) -> Arc<HoldAction> {
            let hold = Arc::new(HoldAction::new(Uuid::new_v4(), self.owner));
            hold.update_arguments(args.as_object().unwrap(), self.me, 1_000);
            self.arena
                .get_mut(self.owner)
                .unwrap()
                .add_action(Action::Hold(hold.clone()));
            hold
        }

        fn body(&self) -> RigidBody {
            self.arena.get(self.owner).unwrap().body.clone().unwrap()
        }
    }

    #[test]
    fn test_new_hold_is_inactive() {
        let fx = Fixture::new();
        let hold = HoldAction::new(Uuid::new_v4(), fx.owner);
        assert_eq!(hold.phase(), HoldPhase::Inactive);
        assert!(!hold.should_suppress_location_edits(&fx.arena));
    }

    #[test]
    fn test_update_arguments_forces_local_holder() {
        let fx = Fixture::new();
        let hold = HoldAction::new(Uuid::new_v4(), fx.owner);
        let someone_else = Uuid::new_v4();
        let args = json!({ "holderID": someone_else.to_string(), "hand": "left" });
        assert!(hold.update_arguments(args.as_object().unwrap(), fx.me, 0));

        let state = hold.state();
        assert_eq!(state.holder_id, fx.me);
        assert_eq!(state.hand, Hand::Left);
        assert_eq!(hold.phase(), HoldPhase::Spring);
    }

    #[test]
    fn test_time_scale_floor_and_mirror() {
        let fx = Fixture::new();
        let hold = HoldAction::new(Uuid::new_v4(), fx.owner);
        let args = json!({ "timeScale": 0.01 });
        hold.update_arguments(args.as_object().unwrap(), fx.me, 0);
        let state = hold.state();
        assert_eq!(state.linear_time_scale, MIN_TIMESCALE);
        assert_eq!(state.angular_time_scale, MIN_TIMESCALE);
    }

    #[test]
    fn test_invalid_fields_keep_previous_values() {
        let fx = Fixture::new();
        let hold = HoldAction::new(Uuid::new_v4(), fx.owner);
        let args = json!({
            "relativePosition": { "x": 1.0, "y": 2.0, "z": 3.0 },
            "hand": "left",
            "kinematic": true
        });
        hold.update_arguments(args.as_object().unwrap(), fx.me, 0);

        let bad = json!({
            "relativePosition": "up",
            "hand": "middle",
            "kinematic": "yes",
            "timeScale": 0.5
        });
        assert!(hold.update_arguments(bad.as_object().unwrap(), fx.me, 0));

        let state = hold.state();
        assert_eq!(state.relative_position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(state.hand, Hand::Left);
        assert!(state.kinematic);
        assert_eq!(state.linear_time_scale, 0.5);
    }

    #[test]
    fn test_unchanged_arguments_report_no_change() {
        let fx = Fixture::new();
        let hold = HoldAction::new(Uuid::new_v4(), fx.owner);
        let args = json!({ "hand": "left", "timeScale": 0.3 });
        assert!(hold.update_arguments(args.as_object().unwrap(), fx.me, 0));
        assert!(!hold.update_arguments(args.as_object().unwrap(), fx.me, 0));
    }

    #[test]
    fn test_arguments_reflect_state() {
        let fx = Fixture::new();
        let hold = HoldAction::new(Uuid::new_v4(), fx.owner);
        let args = json!({ "hand": "left", "ignoreIK": true, "tag": "cup" });
        hold.update_arguments(args.as_object().unwrap(), fx.me, 0);
        let out = hold.arguments(0);
        assert_eq!(out["hand"], "left");
        assert_eq!(out["ignoreIK"], true);
        assert_eq!(out["tag"], "cup");
        assert_eq!(out["holderID"], fx.me.to_string());
    }

    #[test]
    fn test_spring_mode_sets_velocity_toward_target() {
        let mut fx = Fixture::new();
        let hold = fx.attach(json!({ "timeScale": 0.5 }));

        let mut arena = std::mem::take(&mut fx.arena);
        let outcome = hold.update(&mut arena, &fx.ctx(), 0.016).unwrap();
        fx.arena = arena;

        assert_eq!(outcome, ActionOutcome::Spring);
        let body = fx.body();
        assert!(body.active);
        // IK-resolved right palm at y = 2, velocity = offset / time scale
        assert!((body.linear_velocity - Vec3::new(0.0, 4.0, 0.0)).length() < 1e-4);
        assert_eq!(hold.state().positional_target, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_ignore_ik_uses_tracked_pose_for_local_holder() {
        let mut fx = Fixture::new();
        let hold = fx.attach(json!({ "ignoreIK": true, "kinematic": true }));

        let mut arena = std::mem::take(&mut fx.arena);
        hold.update(&mut arena, &fx.ctx(), 0.016).unwrap();
        fx.arena = arena;

        assert_eq!(fx.body().position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_kinematic_writes_transform_and_smooths_velocity() {
        let mut fx = Fixture::new();
        let hold = fx.attach(json!({ "kinematic": true, "kinematicSetVelocity": true }));
        let my_avatar = fx.registry.my_avatar();
        let mut arena = std::mem::take(&mut fx.arena);

        // Tick 1: no previous target, no velocity yet
        assert_eq!(hold.update(&mut arena, &fx.ctx(), 0.1).unwrap(), ActionOutcome::Kinematic);
        let body = arena.get(fx.owner).unwrap().body.clone().unwrap();
        assert_eq!(body.position, Vec3::new(0.0, 2.0, 0.0));
        assert!(body.kinematic_dirty);
        assert_eq!(body.linear_velocity, Vec3::ZERO);

        // Tick 2: hand moved +1 on x over 0.1 s
        my_avatar
            .write()
            .hands
            .set_resolved(Hand::Right, PalmPose::new(Vec3::new(1.0, 2.0, 0.0), Quat::IDENTITY));
        hold.update(&mut arena, &fx.ctx(), 0.1).unwrap();
        let body = arena.get(fx.owner).unwrap().body.clone().unwrap();
        // (delta + previous delta of zero) / (dt + previous dt of zero)
        assert!((body.linear_velocity - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-4);

        // Tick 3: moved +1 again over 0.3 s; smoothed over two frames
        my_avatar
            .write()
            .hands
            .set_resolved(Hand::Right, PalmPose::new(Vec3::new(2.0, 2.0, 0.0), Quat::IDENTITY));
        hold.update(&mut arena, &fx.ctx(), 0.3).unwrap();
        let body = arena.get(fx.owner).unwrap().body.clone().unwrap();
        assert!((body.linear_velocity - Vec3::new(2.0 / 0.4, 0.0, 0.0)).length() < 1e-3);
        assert_eq!(body.position, Vec3::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn test_toggling_kinematic_switches_update_mode() {
        let mut fx = Fixture::new();
        let hold = fx.attach(json!({ "kinematic": true, "kinematicSetVelocity": true, "timeScale": 0.5 }));
        let my_avatar = fx.registry.my_avatar();
        let mut arena = std::mem::take(&mut fx.arena);
        let move_palm = |x: f32| {
            my_avatar
                .write()
                .hands
                .set_resolved(Hand::Right, PalmPose::new(Vec3::new(x, 2.0, 0.0), Quat::IDENTITY));
        };

        assert_eq!(hold.phase(), HoldPhase::Kinematic);
        assert_eq!(hold.update(&mut arena, &fx.ctx(), 0.1).unwrap(), ActionOutcome::Kinematic);

        // Kinematic -> spring: the body is pulled, not placed
        assert!(hold.update_arguments(json!({ "kinematic": false }).as_object().unwrap(), fx.me, 1_000));
        assert_eq!(hold.phase(), HoldPhase::Spring);
        move_palm(1.0);
        assert_eq!(hold.update(&mut arena, &fx.ctx(), 0.1).unwrap(), ActionOutcome::Spring);
        let body = arena.get(fx.owner).unwrap().body.clone().unwrap();
        assert_eq!(body.position, Vec3::new(0.0, 2.0, 0.0));
        assert!((body.linear_velocity - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-4);

        // Spring ticks leave the kinematic bookkeeping alone
        let state = hold.state();
        assert!(state.previous_set);
        assert_eq!(state.previous_positional_target, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(state.previous_delta_time_step, 0.0);

        // Spring -> kinematic: velocity is measured from the last placed target
        assert!(hold.update_arguments(json!({ "kinematic": true }).as_object().unwrap(), fx.me, 1_000));
        assert_eq!(hold.phase(), HoldPhase::Kinematic);
        move_palm(2.0);
        assert_eq!(hold.update(&mut arena, &fx.ctx(), 0.1).unwrap(), ActionOutcome::Kinematic);
        let body = arena.get(fx.owner).unwrap().body.clone().unwrap();
        assert_eq!(body.position, Vec3::new(2.0, 2.0, 0.0));
        assert!((body.linear_velocity - Vec3::new(20.0, 0.0, 0.0)).length() < 1e-3);

        let state = hold.state();
        assert_eq!(state.previous_positional_target, Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(state.previous_delta_time_step, 0.1);
    }

    #[test]
    fn test_contended_write_lock_skips_tick() {
        let mut fx = Fixture::new();
        let hold = fx.attach(json!({ "kinematic": true }));
        let mut arena = std::mem::take(&mut fx.arena);

        let before = hold.state();
        let result = {
            // The holder lookup only needs a read; the tick needs the write lock
            let _reader = hold.state.read();
            hold.update(&mut arena, &fx.ctx(), 0.016)
        };
        assert!(matches!(result, Err(ActionError::LockContention)));
        assert_eq!(hold.state(), before);
        assert_eq!(arena.get(fx.owner).unwrap().body.clone().unwrap().position, Vec3::ZERO);

        // Next tick recovers
        assert_eq!(hold.update(&mut arena, &fx.ctx(), 0.016).unwrap(), ActionOutcome::Kinematic);
    }

    #[test]
    fn test_missing_holder_is_no_update() {
        let mut fx = Fixture::new();
        let hold = fx.attach(json!({ "kinematic": true }));
        // Local participant logged in under a new session; old holder is gone
        fx.registry.set_my_session_id(Uuid::new_v4());
        let mut arena = std::mem::take(&mut fx.arena);

        assert_eq!(hold.update(&mut arena, &fx.ctx(), 0.016).unwrap(), ActionOutcome::NoUpdate);
        assert!(!hold.state().positional_target_set);
    }

    #[test]
    fn test_missing_body_is_missing_collaborator() {
        let mut fx = Fixture::new();
        let bodiless = fx.arena.insert(Entity::new(Uuid::new_v4(), None));
        let hold = Arc::new(HoldAction::new(Uuid::new_v4(), bodiless));
        hold.update_arguments(&ArgumentMap::new(), fx.me, 0);
        fx.arena
            .get_mut(bodiless)
            .unwrap()
            .add_action(Action::Hold(hold.clone()));
        let mut arena = std::mem::take(&mut fx.arena);

        assert!(matches!(
            hold.update(&mut arena, &fx.ctx(), 0.016),
            Err(ActionError::MissingCollaborator("physics body"))
        ));
    }

    #[test]
    fn test_removed_owner_releases_hold() {
        let mut fx = Fixture::new();
        let hold = fx.attach(json!({}));
        fx.arena.remove(fx.owner);
        assert_eq!(hold.phase(), HoldPhase::Released);

        let mut arena = std::mem::take(&mut fx.arena);
        assert!(matches!(
            hold.update(&mut arena, &fx.ctx(), 0.016),
            Err(ActionError::MissingCollaborator("owner entity"))
        ));
        assert!(!hold.should_suppress_location_edits(&arena));
    }

    #[test]
    fn test_record_roundtrip() {
        let fx = Fixture::new();
        let id = Uuid::new_v4();
        let source = HoldAction::new(id, fx.owner);
        let args = json!({
            "relativePosition": { "x": 0.1, "y": -0.2, "z": 0.3 },
            "relativeRotation": { "x": 0.0, "y": 0.7071068, "z": 0.0, "w": 0.7071068 },
            "timeScale": 0.25,
            "hand": "left",
            "kinematic": true,
            "kinematicSetVelocity": true,
            "ttl": 30.0,
            "tag": "mug"
        });
        source.update_arguments(args.as_object().unwrap(), fx.me, 5_000);

        let clock = ServerClock::new(123_456);
        let bytes = source.serialize(&clock).unwrap();

        let dest = HoldAction::new(id, fx.owner);
        dest.deserialize(&bytes, &clock).unwrap();

        let (a, b) = (source.state(), dest.state());
        assert_eq!(b.holder_id, a.holder_id);
        assert_eq!(b.relative_position.to_array(), a.relative_position.to_array());
        assert_eq!(b.relative_rotation.to_array(), a.relative_rotation.to_array());
        assert_eq!(b.linear_time_scale.to_bits(), a.linear_time_scale.to_bits());
        assert_eq!(b.angular_time_scale.to_bits(), b.linear_time_scale.to_bits());
        assert_eq!(b.hand, a.hand);
        assert_eq!(b.base.expires, a.base.expires);
        assert_eq!(b.base.tag, a.base.tag);
        assert_eq!(b.kinematic, a.kinematic);
        assert_eq!(b.kinematic_set_velocity, a.kinematic_set_velocity);
        assert!(b.base.active);
    }

    #[test]
    fn test_newer_version_is_ignored() {
        let fx = Fixture::new();
        let id = Uuid::new_v4();
        let dest = HoldAction::new(id, fx.owner);
        let before = dest.state();

        let header = RecordHeader {
            action_type: ActionType::Hold,
            action_id: id,
            version: 2,
        };
        let body = HoldRecordBody {
            holder_id: Uuid::new_v4(),
            relative_position: Vec3::ONE,
            relative_rotation: Quat::IDENTITY,
            linear_time_scale: 9.0,
            hand: "left".into(),
            expires: 0,
            tag: "future".into(),
            kinematic: true,
            kinematic_set_velocity: true,
        };
        let bytes = encode_record(&header, &body).unwrap();

        assert!(matches!(
            dest.deserialize(&bytes, &fx.clock),
            Err(ActionError::MalformedRecord(_))
        ));
        assert_eq!(dest.state(), before);
    }

    #[test]
    fn test_identity_mismatch_is_ignored() {
        let fx = Fixture::new();
        let source = HoldAction::new(Uuid::new_v4(), fx.owner);
        source.update_arguments(&json!({ "hand": "left" }).as_object().cloned().unwrap(), fx.me, 0);
        let bytes = source.serialize(&fx.clock).unwrap();

        let other = HoldAction::new(Uuid::new_v4(), fx.owner);
        let before = other.state();
        assert!(other.deserialize(&bytes, &fx.clock).is_err());
        assert_eq!(other.state(), before);
    }

    #[test]
    fn test_unknown_hand_in_record_is_rejected() {
        let fx = Fixture::new();
        let id = Uuid::new_v4();
        let header = RecordHeader {
            action_type: ActionType::Hold,
            action_id: id,
            version: HOLD_VERSION,
        };
        let body = HoldRecordBody {
            holder_id: Uuid::new_v4(),
            relative_position: Vec3::ONE,
            relative_rotation: Quat::IDENTITY,
            linear_time_scale: 1.0,
            hand: "tail".into(),
            expires: 0,
            tag: String::new(),
            kinematic: false,
            kinematic_set_velocity: false,
        };
        let bytes = encode_record(&header, &body).unwrap();
        let dest = HoldAction::new(id, fx.owner);
        let before = dest.state();
        assert!(dest.deserialize(&bytes, &fx.clock).is_err());
        assert_eq!(dest.state(), before);
    }
}
