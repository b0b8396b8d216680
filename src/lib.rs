//! Avatar presence library
//!
//! A headless slice of a virtual-world client: the avatar registry, an
//! adaptive render distance, fade-out of departed avatars and hold actions
//! that bind entities to tracked hands.

pub mod action;
pub mod audio;
pub mod avatar;
pub mod config;
pub mod control;
pub mod metrics;
pub mod net;
pub mod scene;
pub mod util;
pub mod world;
