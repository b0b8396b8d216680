//! Avatar registry keyed by session id
//!
//! Readers (simulation snapshots, identifier listing) share the lock; the
//! network path adding or removing avatars takes it exclusively. Iteration
//! always happens over a `hash_copy()` so a removal during the walk cannot
//! invalidate it.

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::avatar::entry::{Avatar, SessionId, SharedAvatar, MY_AVATAR_KEY};

pub type AvatarHash = HashMap<SessionId, SharedAvatar>;

/// What happened to an avatar on removal
#[derive(Debug, Clone)]
pub enum Removal {
    /// Was initialized: hand it to the fade-out manager
    Fade(SharedAvatar),
    /// Never initialized: dropped immediately
    Dropped,
    /// The self entry is never removed
    Protected,
    /// No such entry
    Absent,
}

impl Removal {
    pub fn into_fade(self) -> Option<SharedAvatar> {
        match self {
            Removal::Fade(avatar) => Some(avatar),
            _ => None,
        }
    }
}

pub struct AvatarRegistry {
    avatars: RwLock<AvatarHash>,
    my_avatar: SharedAvatar,
}

impl AvatarRegistry {
    pub fn new() -> Self {
        Self {
            avatars: RwLock::new(HashMap::new()),
            my_avatar: Avatar::new_local().into_shared(),
        }
    }

    /// Initialize the local avatar and insert it under the reserved key
    pub fn init(&self) {
        self.my_avatar.write().init();
        self.avatars
            .write()
            .insert(MY_AVATAR_KEY, self.my_avatar.clone());
    }

    pub fn my_avatar(&self) -> SharedAvatar {
        self.my_avatar.clone()
    }

    /// Session id the local user is known by on the network
    pub fn my_session_id(&self) -> SessionId {
        self.my_avatar.read().session_id
    }

    pub fn set_my_session_id(&self, session_id: SessionId) {
        self.my_avatar.write().session_id = session_id;
    }

    fn is_self(&self, id: &SessionId) -> bool {
        *id == MY_AVATAR_KEY || *id == self.my_session_id()
    }

    /// Get or create the entry for `id`
    ///
    /// The reserved self identifier (or the local session id) binds to the
    /// existing self entry instead of creating a second one.
    pub fn add(&self, id: SessionId) -> SharedAvatar {
        if self.is_self(&id) {
            return self.my_avatar.clone();
        }

        let mut avatars = self.avatars.write();
        avatars
            .entry(id)
            .or_insert_with(|| {
                debug!("Adding avatar {}", id);
                Avatar::new_remote(id).into_shared()
            })
            .clone()
    }

    /// Drop the entry for `id` and say what the caller should do with it
    ///
    /// Only initialized avatars were ever visible, so only they get faded.
    pub fn remove(&self, id: &SessionId) -> Removal {
        if self.is_self(id) {
            return Removal::Protected;
        }

        let mut avatars = self.avatars.write();
        match avatars.remove(id) {
            Some(avatar) => {
                let initialized = avatar.read().initialized;
                debug!("Removed avatar {} (initialized={})", id, initialized);
                if initialized {
                    Removal::Fade(avatar)
                } else {
                    Removal::Dropped
                }
            }
            None => Removal::Absent,
        }
    }

    /// Look up by registry key; the nil id answers the local avatar
    pub fn get(&self, id: &SessionId) -> Option<SharedAvatar> {
        self.avatars.read().get(id).cloned()
    }

    /// Look up by network session id; the local session id answers the self entry
    pub fn get_by_session_id(&self, session_id: &SessionId) -> Option<SharedAvatar> {
        if *session_id == self.my_session_id() {
            return Some(self.my_avatar.clone());
        }
        self.get(session_id)
    }

    /// Stable snapshot for iteration
    pub fn hash_copy(&self) -> AvatarHash {
        self.avatars.read().clone()
    }

    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&SessionId, &SharedAvatar),
    {
        for (id, avatar) in self.hash_copy().iter() {
            visit(id, avatar);
        }
    }

    /// All keys; the local avatar appears as the nil id
    pub fn identifiers(&self) -> Vec<SessionId> {
        self.avatars.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.avatars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.read().is_empty()
    }

    /// Remove every initialized remote avatar; returns those to fade
    pub fn clear_other_avatars(&self) -> Vec<SharedAvatar> {
        let mut avatars = self.avatars.write();
        let mut removed = Vec::new();
        avatars.retain(|id, avatar| {
            if *id == MY_AVATAR_KEY || !avatar.read().initialized {
                true
            } else {
                removed.push(avatar.clone());
                false
            }
        });
        removed
    }

    /// Remove every remote avatar the network layer flagged `should_die`
    pub fn take_removable(&self) -> Vec<(SessionId, Removal)> {
        let doomed: Vec<SessionId> = self
            .avatars
            .read()
            .iter()
            .filter(|(id, avatar)| **id != MY_AVATAR_KEY && avatar.read().should_die)
            .map(|(id, _)| *id)
            .collect();
        doomed.into_iter().map(|id| (id, self.remove(&id))).collect()
    }
}

impl Default for AvatarRegistry {
    fn default() -> Self {
        Self::new()
    }
}
