//! Proportional-integral-derivative controller
//!
//! Drives a *controlled* value so that a *measured* value approaches a
//! setpoint. Output is always clamped to the controlled-value limits, and the
//! integral term is bounded by an anti-windup window proportional to the
//! setpoint. A non-finite sample is skipped and never reaches the integrator.

use tracing::{debug, info};

/// Integral accumulation is bounded to +/- this many setpoints
const ANTI_WINDUP_FACTOR: f32 = 10.0;

/// Integrator/derivative memory carried between updates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    pub last_error: f32,
    pub last_accumulation: f32,
}

/// One logged controller step
#[derive(Debug, Clone, Copy)]
pub struct PidRow {
    pub measured: f32,
    pub dt: f32,
    pub error: f32,
    pub accumulated: f32,
    pub change_in_error: f32,
    pub computed: f32,
}

#[derive(Debug, Clone)]
pub struct PidController {
    setpoint: f32,
    kp: f32,
    ki: f32,
    kd: f32,
    controlled_low: f32,
    controlled_high: f32,
    state: PidState,
    last_output: f32,
    history: Vec<PidRow>,
    history_size: usize,
    label: String,
}

impl PidController {
    pub fn new(setpoint: f32, controlled_low: f32, controlled_high: f32) -> Self {
        Self {
            setpoint,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            controlled_low,
            controlled_high,
            state: PidState::default(),
            last_output: controlled_low,
            history: Vec::new(),
            history_size: 0,
            label: String::new(),
        }
    }

    /// Advance the controller one step and return the clamped controlled value.
    ///
    /// A positive error means the measured value should go up.
    pub fn update(&mut self, measured: f32, dt: f32) -> f32 {
        if !measured.is_finite() || !dt.is_finite() {
            debug!("{} skipping non-finite sample (measured {}, dt {})", self.label, measured, dt);
            return self.clamp_controlled(self.last_output);
        }

        let error = self.setpoint - measured;
        let p = self.kp * error;

        let windup = (ANTI_WINDUP_FACTOR * self.setpoint).abs();
        let accumulated = (error * dt + self.state.last_accumulation).clamp(-windup, windup);
        let i = self.ki * accumulated;

        let change_in_error = if dt > 0.0 {
            (error - self.state.last_error) / dt
        } else {
            0.0
        };
        let d = self.kd * change_in_error;

        let computed = self.clamp_controlled(p + i + d);

        if self.is_logging() {
            self.record(PidRow {
                measured,
                dt,
                error,
                accumulated,
                change_in_error,
                computed,
            });
        }

        self.state = PidState {
            last_error: error,
            last_accumulation: accumulated,
        };
        self.last_output = computed;
        computed
    }

    fn clamp_controlled(&self, value: f32) -> f32 {
        // Limits may be set in either order by callers tuning at runtime
        let (lo, hi) = if self.controlled_low <= self.controlled_high {
            (self.controlled_low, self.controlled_high)
        } else {
            (self.controlled_high, self.controlled_low)
        };
        if value.is_nan() {
            return lo;
        }
        value.clamp(lo, hi)
    }

    fn record(&mut self, row: PidRow) {
        self.history.push(row);
        if self.history.len() >= self.history_size {
            self.report_history();
            // One capture per request
            self.history_size = 0;
            self.history = Vec::new();
        }
    }

    fn report_history(&self) {
        info!(
            "{} (kp={}, ki={}, kd={}), setpoint {}, controlled [{}, {}]",
            self.label, self.kp, self.ki, self.kd, self.setpoint, self.controlled_low, self.controlled_high
        );
        for row in &self.history {
            info!(
                "{} measured {:.3} dt {:.5} error {:.4} acc {:.4} d/dt {:.4} -> {:.6}",
                self.label, row.measured, row.dt, row.error, row.accumulated, row.change_in_error, row.computed
            );
        }
    }

    /// Capture the next `size` steps and log them under `label`
    pub fn set_history_size(&mut self, label: impl Into<String>, size: usize) {
        self.label = label.into();
        self.history_size = size;
        self.history = Vec::with_capacity(size);
    }

    /// Whether a history capture is in progress
    pub fn is_logging(&self) -> bool {
        self.history_size > 0
    }

    /// Rows captured so far; emptied once the capture is logged
    pub fn history(&self) -> &[PidRow] {
        &self.history
    }

    pub fn state(&self) -> PidState {
        self.state
    }

    /// Forget the integrator and derivative memory
    ///
    /// Gains, limits and any pending history capture are kept.
    pub fn reset(&mut self) {
        self.state = PidState::default();
        self.last_output = self.controlled_low;
    }

    /// Controlled value returned by the last accepted sample
    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    /// Move the target; the integrator keeps its accumulation
    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    pub fn kp(&self) -> f32 {
        self.kp
    }

    pub fn ki(&self) -> f32 {
        self.ki
    }

    pub fn kd(&self) -> f32 {
        self.kd
    }

    /// Gains take effect on the next update
    pub fn set_kp(&mut self, kp: f32) {
        self.kp = kp;
    }

    pub fn set_ki(&mut self, ki: f32) {
        self.ki = ki;
    }

    pub fn set_kd(&mut self, kd: f32) {
        self.kd = kd;
    }

    /// Smallest value `update` will return
    pub fn controlled_low_limit(&self) -> f32 {
        self.controlled_low
    }

    /// Largest value `update` will return
    pub fn controlled_high_limit(&self) -> f32 {
        self.controlled_high
    }

    /// Limits may be given in either order; the output clamp sorts them
    pub fn set_controlled_low_limit(&mut self, low: f32) {
        self.controlled_low = low;
    }

    pub fn set_controlled_high_limit(&mut self, high: f32) {
        self.controlled_high = high;
    }
}
