/// World and scale constants
pub mod world {
    /// Edge length of the world cube in meters (farthest meaningful distance)
    pub const TREE_SCALE: f32 = 16_384.0;
    /// Smallest scale an avatar may have; fades end at or below this
    pub const MIN_AVATAR_SCALE: f32 = 0.005;
    /// Default avatar scale
    pub const DEFAULT_AVATAR_SCALE: f32 = 1.0;
}

/// Render-distance governor tuning
pub mod render_distance {
    /// Closest horizon we will ever shrink to, in meters
    pub const SMALLEST_REASONABLE_HORIZON: f32 = 5.0;
    /// Default controlled-value high limit (inverse meters, closest radius)
    pub const DEFAULT_INVERSE_HIGH_LIMIT: f32 = 1.0 / SMALLEST_REASONABLE_HORIZON;
    /// Controlled-value low limit (inverse meters, farthest radius)
    pub const DEFAULT_INVERSE_LOW_LIMIT: f32 = 1.0 / super::world::TREE_SCALE;
    /// Usually about 0.6 of the largest kp that doesn't oscillate on its own
    pub const KP: f32 = 0.0008;
    /// Big enough to bring us to target with the above kp
    pub const KI: f32 = 0.0006;
    /// A touch of kd speeds convergence
    pub const KD: f32 = 0.000001;
    /// Samples in the distance moving average
    pub const AVERAGE_WINDOW: usize = 10;
    /// Default target frame rate in Hz
    pub const TARGET_FRAME_RATE: f32 = 60.0;
}

/// Fade-out animation
pub mod fade {
    /// Scale multiplier applied each tick while fading
    pub const SHRINK_RATE: f32 = 0.9;
}

/// Local avatar data sends
pub mod send {
    /// 70 times per second: target is 60 Hz, the margin absorbs loop jitter
    pub const MIN_TIME_BETWEEN_MY_AVATAR_DATA_SENDS_US: u64 = 1_000_000 / 70;
}

/// Hold action tuning
pub mod hold {
    /// Serialization version of the hold record
    pub const HOLD_VERSION: u16 = 1;
    /// Time scales below this make the spring unstable
    pub const MIN_TIMESCALE: f32 = 0.1;
    /// Default spring time scale in seconds
    pub const DEFAULT_TIMESCALE: f32 = f32::MAX;
    /// Position offsets below this are ignored by the spring
    pub const IGNORE_POSITION_DELTA: f32 = 0.0001;
    /// Rotation offsets (radians) below this are ignored by the spring
    pub const IGNORE_ROTATION_DELTA: f32 = 0.0001;
}

/// Collision sounds for the local avatar
pub mod collision {
    /// Velocity changes at or below this (m/s) are too soft to hear
    pub const MIN_AVATAR_COLLISION_ACCELERATION: f32 = 0.01;
    /// Squared velocity change that plays at full volume
    pub const COLLISION_ENERGY_AT_FULL_VOLUME: f32 = 0.5;
    /// Avatars are roughly the same size, so pitch is never stretched
    pub const AVATAR_STRETCH_FACTOR: f32 = 1.0;
}
