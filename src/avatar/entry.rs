//! Avatar state definitions
//!
//! One `Avatar` per networked participant plus the local user's own avatar.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::avatar::constants::world::DEFAULT_AVATAR_SCALE;

/// Network session identifier of a participant
pub type SessionId = Uuid;

/// Registry key of the local user's avatar (the nil UUID)
pub const MY_AVATAR_KEY: SessionId = Uuid::nil();

/// Shared, independently lockable avatar handle
pub type SharedAvatar = Arc<RwLock<Avatar>>;

/// Identifier of an avatar's physics motion state
pub type MotionStateId = u64;

/// Identifier of an avatar's render item, unique per `Avatar` value
///
/// A participant who reconnects while their old avatar is still fading gets
/// a fresh item, so retiring the old one never touches the live avatar.
pub type RenderItemId = u64;

static NEXT_RENDER_ITEM: AtomicU64 = AtomicU64::new(1);

fn next_render_item() -> RenderItemId {
    NEXT_RENDER_ITEM.fetch_add(1, Ordering::Relaxed)
}

/// Which hand a hold is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn parse(label: &str) -> Option<Hand> {
        match label {
            "left" => Some(Hand::Left),
            "right" => Some(Hand::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }

    fn index(&self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }
}

/// World-space palm position and orientation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PalmPose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for PalmPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl PalmPose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

/// Palm poses for both hands
///
/// `tracked` is the raw controller pose; `resolved` is the pose after
/// full-body inverse kinematics. Remote avatars only ever have resolved poses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HandPoses {
    pub tracked: [PalmPose; 2],
    pub resolved: [PalmPose; 2],
}

impl HandPoses {
    /// Both views report the same pose
    pub fn uniform(left: PalmPose, right: PalmPose) -> Self {
        Self {
            tracked: [left, right],
            resolved: [left, right],
        }
    }

    pub fn tracked(&self, hand: Hand) -> PalmPose {
        self.tracked[hand.index()]
    }

    pub fn resolved(&self, hand: Hand) -> PalmPose {
        self.resolved[hand.index()]
    }

    pub fn set_tracked(&mut self, hand: Hand, pose: PalmPose) {
        self.tracked[hand.index()] = pose;
    }

    pub fn set_resolved(&mut self, hand: Hand, pose: PalmPose) {
        self.resolved[hand.index()] = pose;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarKind {
    /// The local user's avatar
    Local,
    /// An avatar announced by the avatar mixer
    Remote,
}

#[derive(Debug, Clone)]
pub struct Avatar {
    /// Network session id (may be nil for the local avatar before login)
    pub session_id: SessionId,
    pub kind: AvatarKind,
    pub position: Vec3,
    pub hands: HandPoses,
    /// Current rendered scale
    pub scale: f32,
    /// Scale the avatar eases to on the next simulate
    pub target_scale: f32,
    /// Set once the first full data packet has been applied
    pub initialized: bool,
    /// Within render distance on the last simulate
    pub should_render: bool,
    /// Flagged by the network layer when the mixer stops reporting it
    pub should_die: bool,
    pub motion_state: Option<MotionStateId>,
    /// Has a render item in the scene
    pub in_scene: bool,
    /// Sound played when this avatar bumps into something; empty is silent
    pub collision_sound_url: String,
    render_item: RenderItemId,
    updating: bool,
}

impl Avatar {
    pub fn new(session_id: SessionId, kind: AvatarKind) -> Self {
        Self {
            session_id,
            kind,
            position: Vec3::ZERO,
            hands: HandPoses::default(),
            scale: DEFAULT_AVATAR_SCALE,
            target_scale: DEFAULT_AVATAR_SCALE,
            initialized: false,
            should_render: false,
            should_die: false,
            motion_state: None,
            in_scene: false,
            collision_sound_url: String::new(),
            render_item: next_render_item(),
            updating: false,
        }
    }

    pub fn new_remote(session_id: SessionId) -> Self {
        Self::new(session_id, AvatarKind::Remote)
    }

    pub fn new_local() -> Self {
        Self::new(MY_AVATAR_KEY, AvatarKind::Local)
    }

    pub fn into_shared(self) -> SharedAvatar {
        Arc::new(RwLock::new(self))
    }

    /// Key of this avatar's item in the render scene
    pub fn render_item(&self) -> RenderItemId {
        self.render_item
    }

    pub fn is_my_avatar(&self) -> bool {
        self.kind == AvatarKind::Local
    }

    pub fn init(&mut self) {
        self.initialized = true;
    }

    pub fn start_update(&mut self) {
        self.updating = true;
    }

    pub fn end_update(&mut self) {
        self.updating = false;
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    /// Advance one tick: apply the pending target scale
    pub fn simulate(&mut self, _dt: f32) {
        if self.scale != self.target_scale {
            self.scale = self.target_scale;
        }
    }

    /// Decide render eligibility against the viewer and current horizon
    pub fn update_render_eligibility(&mut self, viewer: Vec3, render_distance: f32) -> bool {
        self.should_render = self.position.distance(viewer) <= render_distance;
        self.should_render
    }

    pub fn palm_pose(&self, hand: Hand, bypass_ik: bool) -> PalmPose {
        if bypass_ik {
            self.hands.tracked(hand)
        } else {
            self.hands.resolved(hand)
        }
    }
}
