//! Inbound avatar-mixer events
//!
//! The network task pushes decoded mixer packets into a bounded
//! crossbeam channel; the simulation loop drains it at the start of every
//! tick. Sending never blocks: a full channel is reported back as
//! backpressure and the packet is dropped.
//!
//! A slow frame can leave several pose updates for the same participant in
//! the channel. Only the newest one matters, so draining keeps the latest
//! `AvatarData` per session in the slot of the first, unless a
//! `KillAvatar` for that session falls between them.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use glam::Vec3;
use hashbrown::HashMap;

use crate::avatar::entry::{HandPoses, SessionId};

/// Default channel capacity, a few ticks of traffic for a busy domain
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    /// Identity and pose update for a participant
    AvatarData {
        session_id: SessionId,
        position: Vec3,
        hands: HandPoses,
    },
    /// The mixer no longer reports this participant
    KillAvatar { session_id: SessionId },
}

impl MixerEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            MixerEvent::AvatarData { session_id, .. } => *session_id,
            MixerEvent::KillAvatar { session_id } => *session_id,
        }
    }
}

/// Receiving end, owned by the simulation loop
pub struct MixerInbox {
    sender: Sender<MixerEvent>,
    receiver: Receiver<MixerEvent>,
}

impl MixerInbox {
    /// Inbox holding at most `capacity` undrained events
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Handle for the network task
    pub fn sender(&self) -> MixerSender {
        MixerSender {
            sender: self.sender.clone(),
        }
    }

    /// Everything received since the last drain, superseded poses dropped
    ///
    /// Kills and first announcements keep their relative order, so a
    /// participant who leaves and rejoins within one drain is still
    /// removed before being re-added.
    pub fn drain(&self) -> Vec<MixerEvent> {
        let mut events: Vec<MixerEvent> = Vec::new();
        // Slot of the newest pose per session since its last kill
        let mut latest: HashMap<SessionId, usize> = HashMap::new();

        for event in self.receiver.try_iter() {
            match event {
                MixerEvent::AvatarData { session_id, .. } => match latest.get(&session_id) {
                    Some(&slot) => events[slot] = event,
                    None => {
                        latest.insert(session_id, events.len());
                        events.push(event);
                    }
                },
                MixerEvent::KillAvatar { session_id } => {
                    latest.remove(&session_id);
                    events.push(event);
                }
            }
        }
        events
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for MixerInbox {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

/// Sending end, cloned into each network task
#[derive(Clone)]
pub struct MixerSender {
    sender: Sender<MixerEvent>,
}

impl MixerSender {
    /// Queue an event without blocking
    ///
    /// `Full` means the simulation is behind and the event was dropped.
    #[inline]
    pub fn try_send(&self, event: MixerEvent) -> Result<(), MixerError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => MixerError::Full,
            TrySendError::Disconnected(_) => MixerError::Disconnected,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MixerError {
    #[error("Mixer inbox is full")]
    Full,
    #[error("Mixer inbox is closed")]
    Disconnected,
}
