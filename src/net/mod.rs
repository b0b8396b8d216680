//! Networking seams
//!
//! Only the inbound avatar-mixer path is modelled.

pub mod mixer;

pub use mixer::{MixerError, MixerEvent, MixerInbox, MixerSender};
