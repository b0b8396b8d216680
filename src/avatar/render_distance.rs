//! Adaptive avatar render distance
//!
//! The controller's controlled value is an *inverse* radius: when the frame
//! rate drops below target the value rises, the horizon pulls in, fewer
//! avatars render and the frame rate recovers.

use tracing::warn;

use crate::avatar::constants::render_distance::{
    AVERAGE_WINDOW, DEFAULT_INVERSE_HIGH_LIMIT, DEFAULT_INVERSE_LOW_LIMIT, KD, KI, KP,
    TARGET_FRAME_RATE,
};
use crate::avatar::constants::world::TREE_SCALE;
use crate::control::average::MovingAverage;
use crate::control::pid::PidController;

/// PID tuning and limits for the governor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernorTuning {
    pub target_frame_rate: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Inverse of the farthest radius
    pub inverse_low_limit: f32,
    /// Inverse of the closest radius
    pub inverse_high_limit: f32,
    pub average_window: usize,
}

impl Default for GovernorTuning {
    fn default() -> Self {
        Self {
            target_frame_rate: TARGET_FRAME_RATE,
            kp: KP,
            ki: KI,
            kd: KD,
            inverse_low_limit: DEFAULT_INVERSE_LOW_LIMIT,
            inverse_high_limit: DEFAULT_INVERSE_HIGH_LIMIT,
            average_window: AVERAGE_WINDOW,
        }
    }
}

pub struct RenderDistanceGovernor {
    controller: PidController,
    average: MovingAverage,
    distance: f32,
}

impl RenderDistanceGovernor {
    pub fn new(tuning: GovernorTuning) -> Self {
        let mut controller = PidController::new(
            tuning.target_frame_rate,
            tuning.inverse_low_limit,
            tuning.inverse_high_limit,
        );
        controller.set_kp(tuning.kp);
        controller.set_ki(tuning.ki);
        controller.set_kd(tuning.kd);

        Self {
            controller,
            average: MovingAverage::new(tuning.average_window),
            distance: TREE_SCALE,
        }
    }

    /// Feed the measured frame rate and return the smoothed horizon in meters
    pub fn update(&mut self, measured_frame_rate: f32, dt: f32) -> f32 {
        let inverse = self.controller.update(measured_frame_rate, dt);
        self.push(1.0 / inverse)
    }

    /// Rendering was skipped this tick: use the farthest horizon and leave
    /// the controller untouched
    pub fn update_throttled(&mut self) -> f32 {
        self.push(self.max_distance())
    }

    fn push(&mut self, distance: f32) -> f32 {
        self.distance = self.average.update(distance);
        self.distance
    }

    /// Last smoothed distance
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Target may change in flight
    pub fn set_target_frame_rate(&mut self, fps: f32) {
        self.controller.set_setpoint(fps);
    }

    /// Farthest horizon in meters, the inverse of the low limit
    pub fn max_distance(&self) -> f32 {
        1.0 / self.controller.controlled_low_limit()
    }

    /// Closest horizon in meters, the inverse of the high limit
    pub fn min_distance(&self) -> f32 {
        1.0 / self.controller.controlled_high_limit()
    }

    pub fn inverse_low_limit(&self) -> f32 {
        self.controller.controlled_low_limit()
    }

    pub fn inverse_high_limit(&self) -> f32 {
        self.controller.controlled_high_limit()
    }

    /// Set the inverse of the farthest radius
    ///
    /// Zero, negative and non-finite values would make the horizon infinite
    /// or negative and are refused. Returns whether the limit was applied.
    pub fn set_inverse_low_limit(&mut self, value: f32) -> bool {
        if !Self::valid_limit(value) {
            warn!("Ignoring render distance low limit {}", value);
            return false;
        }
        self.controller.set_controlled_low_limit(value);
        true
    }

    /// Set the inverse of the closest radius; refused like the low limit
    pub fn set_inverse_high_limit(&mut self, value: f32) -> bool {
        if !Self::valid_limit(value) {
            warn!("Ignoring render distance high limit {}", value);
            return false;
        }
        self.controller.set_controlled_high_limit(value);
        true
    }

    fn valid_limit(value: f32) -> bool {
        value.is_finite() && value > 0.0
    }

    /// Proportional gain, live-tunable
    pub fn set_kp(&mut self, value: f32) {
        self.controller.set_kp(value);
    }

    /// Integral gain, live-tunable
    pub fn set_ki(&mut self, value: f32) {
        self.controller.set_ki(value);
    }

    /// Derivative gain, live-tunable
    pub fn set_kd(&mut self, value: f32) {
        self.controller.set_kd(value);
    }

    /// Log the next `size` controller steps under `label`
    ///
    /// Used when tuning gains; the capture stops itself once full.
    pub fn set_history_size(&mut self, label: impl Into<String>, size: usize) {
        self.controller.set_history_size(label, size);
    }

    pub fn is_logging(&self) -> bool {
        self.controller.is_logging()
    }

    /// Underlying controller, for inspecting its state
    pub fn controller(&self) -> &PidController {
        &self.controller
    }
}

impl Default for RenderDistanceGovernor {
    fn default() -> Self {
        Self::new(GovernorTuning::default())
    }
}
