//! Audio seam
//!
//! Sound playback is external. The avatar manager only asks for one-shot
//! sounds at a world position.

use glam::Vec3;
use parking_lot::Mutex;

/// One-shot sound to inject into the world
#[derive(Debug, Clone, PartialEq)]
pub struct SoundRequest {
    pub url: String,
    /// 0..=1 fraction of full volume
    pub volume: f32,
    /// Pitch stretch, 1.0 plays as recorded
    pub stretch_factor: f32,
    pub position: Vec3,
}

/// The audio collaborator
pub trait SoundPlayer: Send + Sync {
    fn play_sound(&self, request: SoundRequest);
}

/// Player that keeps requests until they are taken
#[derive(Debug, Default)]
pub struct QueuedSounds {
    requests: Mutex<Vec<SoundRequest>>,
}

impl QueuedSounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything requested since the last take
    pub fn take(&self) -> Vec<SoundRequest> {
        std::mem::take(&mut *self.requests.lock())
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

impl SoundPlayer for QueuedSounds {
    fn play_sound(&self, request: SoundRequest) {
        self.requests.lock().push(request);
    }
}
