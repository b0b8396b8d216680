//! Spring attraction toward a target pose
//!
//! Velocities are set so the body would close its offset in one time scale.

use glam::{Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::action::arguments::{
    extract_f32, extract_quat, extract_vec3, or_previous, quat_to_value, vec3_to_value,
    ArgumentMap,
};
use crate::action::base::ActionBase;
use crate::action::record::{decode_body, encode_record, open_record, RecordHeader};
use crate::action::{ActionError, ActionOutcome, ActionType};
use crate::avatar::constants::hold::{
    DEFAULT_TIMESCALE, IGNORE_POSITION_DELTA, IGNORE_ROTATION_DELTA, MIN_TIMESCALE,
};
use crate::util::clock::ServerClock;
use crate::world::{EntityArena, EntityHandle, RigidBody};

const SPRING_VERSION: u16 = 1;

/// Drive `body` toward the target over the given time scales
pub fn spring_step(
    body: &mut RigidBody,
    target_position: Vec3,
    target_rotation: Quat,
    linear_time_scale: f32,
    angular_time_scale: f32,
) {
    let offset = target_position - body.position;
    body.linear_velocity = if offset.length() > IGNORE_POSITION_DELTA {
        offset / linear_time_scale
    } else {
        Vec3::ZERO
    };

    // Take the short way round
    let target = if target_rotation.dot(body.rotation) < 0.0 {
        -target_rotation
    } else {
        target_rotation
    };
    let (axis, angle) = (target * body.rotation.inverse()).normalize().to_axis_angle();
    body.angular_velocity = if angle > IGNORE_ROTATION_DELTA {
        axis * (angle / angular_time_scale)
    } else {
        Vec3::ZERO
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpringState {
    pub base: ActionBase,
    pub positional_target: Vec3,
    pub rotational_target: Quat,
    pub linear_time_scale: f32,
    pub angular_time_scale: f32,
}

impl Default for SpringState {
    fn default() -> Self {
        Self {
            base: ActionBase::default(),
            positional_target: Vec3::ZERO,
            rotational_target: Quat::IDENTITY,
            linear_time_scale: DEFAULT_TIMESCALE,
            angular_time_scale: DEFAULT_TIMESCALE,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SpringRecordBody {
    positional_target: Vec3,
    rotational_target: Quat,
    linear_time_scale: f32,
    angular_time_scale: f32,
    expires: u64,
    tag: String,
}

/// Spring toward a fixed, script-supplied pose
#[derive(Debug)]
pub struct SpringAction {
    id: Uuid,
    owner: EntityHandle,
    state: RwLock<SpringState>,
}

impl SpringAction {
    pub fn new(id: Uuid, owner: EntityHandle) -> Self {
        Self {
            id,
            owner,
            state: RwLock::new(SpringState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> EntityHandle {
        self.owner
    }

    pub fn state(&self) -> SpringState {
        self.state.read().clone()
    }

    pub fn update(&self, arena: &mut EntityArena, _dt: f32) -> Result<ActionOutcome, ActionError> {
        let state = self.state.try_read().ok_or(ActionError::LockContention)?;
        if !state.base.active {
            return Ok(ActionOutcome::NoUpdate);
        }
        let entity = arena
            .get_mut(self.owner)
            .ok_or(ActionError::MissingCollaborator("owner entity"))?;
        let body = entity
            .body
            .as_mut()
            .ok_or(ActionError::MissingCollaborator("physics body"))?;

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

    pub fn update_arguments(&self, args: &ArgumentMap, now: u64) -> bool {
        let mut state = self.state.write();
        let mut next = state.clone();

        next.positional_target = or_previous(extract_vec3(args, "targetPosition"), state.positional_target);
        next.rotational_target = or_previous(extract_quat(args, "targetRotation"), state.rotational_target);
        next.linear_time_scale =
            or_previous(extract_f32(args, "linearTimeScale"), state.linear_time_scale).max(MIN_TIMESCALE);
        next.angular_time_scale =
            or_previous(extract_f32(args, "angularTimeScale"), state.angular_time_scale).max(MIN_TIMESCALE);
        let base_changed = next.base.update_arguments(args, now);

        if !base_changed && next == *state {
            return false;
        }
        next.base.active = true;
        *state = next;
        true
    }

    pub fn arguments(&self, now: u64) -> ArgumentMap {
        let state = self.state.read();
        let mut args = ArgumentMap::new();
        state.base.write_arguments(&mut args, now);
        args.insert("targetPosition".into(), vec3_to_value(state.positional_target));
        args.insert("targetRotation".into(), quat_to_value(state.rotational_target));
        args.insert("linearTimeScale".into(), Value::from(state.linear_time_scale));
        args.insert("angularTimeScale".into(), Value::from(state.angular_time_scale));
        args
    }

    pub fn serialize(&self, clock: &ServerClock) -> Result<Vec<u8>, ActionError> {
        let state = self.state.read();
        let header = RecordHeader {
            action_type: ActionType::Spring,
            action_id: self.id,
            version: SPRING_VERSION,
        };
        let body = SpringRecordBody {
            positional_target: state.positional_target,
            rotational_target: state.rotational_target,
            linear_time_scale: state.linear_time_scale,
            angular_time_scale: state.angular_time_scale,
            expires: clock.local_to_server(state.base.expires),
            tag: state.base.tag.clone(),
        };
        Ok(encode_record(&header, &body)?)
    }

    pub fn deserialize(&self, bytes: &[u8], clock: &ServerClock) -> Result<(), ActionError> {
        let body: SpringRecordBody = open_record(bytes, ActionType::Spring, self.id, SPRING_VERSION)
            .and_then(decode_body)
            .map_err(|e| {
                warn!("Spring action {} ignored record: {}", self.id, e);
                ActionError::from(e)
            })?;

        let mut state = self.state.write();
        state.positional_target = body.positional_target;
        state.rotational_target = body.rotational_target;
        state.linear_time_scale = body.linear_time_scale;
        state.angular_time_scale = body.angular_time_scale;
        state.base.expires = clock.server_to_local(body.expires);
        state.base.tag = body.tag;
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
