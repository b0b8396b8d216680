//! Avatars: registry, render-distance governor, fades and the per-frame manager

pub mod collision;
pub mod constants;
pub mod entry;
pub mod fade;
pub mod manager;
pub mod registry;
pub mod render_distance;

pub use entry::{Avatar, Hand, SessionId, SharedAvatar, MY_AVATAR_KEY};
pub use manager::{AvatarManager, AvatarTickSummary, LocalLight};
pub use registry::{AvatarRegistry, Removal};
