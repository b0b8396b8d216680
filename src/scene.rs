//! Render-scene seam
//!
//! The renderer itself is external: this crate only queues add/remove
//! requests for avatar render items and hands them over once per tick.

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::avatar::entry::{Avatar, RenderItemId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneOp {
    /// Give an avatar a render item
    Add {
        item: RenderItemId,
        session_id: SessionId,
    },
    /// Retire a render item
    Remove { item: RenderItemId },
}

/// Batched scene edits for one tick
#[derive(Debug, Default, Clone)]
pub struct PendingChanges {
    ops: Vec<SceneOp>,
}

impl PendingChanges {
    /// Queue an add for the avatar's own item
    pub fn add_avatar(&mut self, avatar: &Avatar) {
        self.ops.push(SceneOp::Add {
            item: avatar.render_item(),
            session_id: avatar.session_id,
        });
    }

    /// Queue a removal for the avatar's own item
    ///
    /// Other avatars sharing the session id keep theirs.
    pub fn remove_avatar(&mut self, avatar: &Avatar) {
        self.ops.push(SceneOp::Remove {
            item: avatar.render_item(),
        });
    }

    pub fn ops(&self) -> &[SceneOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The render collaborator
pub trait Scene: Send + Sync {
    fn enqueue_pending_changes(&self, changes: PendingChanges);
}

/// Scene that just tracks which items exist
#[derive(Debug, Default)]
pub struct ItemScene {
    items: Mutex<HashMap<RenderItemId, SessionId>>,
}

impl ItemScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_item(&self, item: RenderItemId) -> bool {
        self.items.lock().contains_key(&item)
    }

    /// Whether any item is drawn for this participant
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.items.lock().values().any(|id| id == session_id)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Scene for ItemScene {
    fn enqueue_pending_changes(&self, changes: PendingChanges) {
        let mut items = self.items.lock();
        for op in changes.ops {
            match op {
                SceneOp::Add { item, session_id } => {
                    items.insert(item, session_id);
                }
                SceneOp::Remove { item } => {
                    items.remove(&item);
                }
            }
        }
    }
}
