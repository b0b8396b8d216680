use std::str::FromStr;

use crate::avatar::constants::render_distance::{
    AVERAGE_WINDOW, DEFAULT_INVERSE_HIGH_LIMIT, DEFAULT_INVERSE_LOW_LIMIT, KD, KI, KP,
    TARGET_FRAME_RATE,
};
use crate::avatar::render_distance::GovernorTuning;

/// Client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Frame rate the render-distance governor steers toward
    pub target_frame_rate: f32,
    /// Inverse of the closest render radius (1/m)
    pub render_distance_high_limit: f32,
    pub render_distance_kp: f32,
    pub render_distance_ki: f32,
    pub render_distance_kd: f32,
    /// Give avatars render items at all
    pub should_render_avatars: bool,
    /// Port for the metrics endpoint; 0 disables it
    pub metrics_port: u16,
    /// Remote avatars the demo mixer announces
    pub simulated_avatars: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target_frame_rate: TARGET_FRAME_RATE,
            render_distance_high_limit: DEFAULT_INVERSE_HIGH_LIMIT,
            render_distance_kp: KP,
            render_distance_ki: KI,
            render_distance_kd: KD,
            should_render_avatars: true,
            metrics_port: 9090,
            simulated_avatars: 16,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    accept: impl Fn(&T) -> bool,
    rule: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(parsed) if accept(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, rule);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ClientConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from(|name| std::env::var(name).ok())
    }

    /// Load config through an arbitrary variable lookup
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(fps) = parse_var(&lookup, "TARGET_FRAME_RATE", |v: &f32| *v > 0.0 && *v <= 1000.0, "in (0, 1000]") {
            config.target_frame_rate = fps;
        }
        if let Some(high) = parse_var(
            &lookup,
            "RENDER_DISTANCE_HIGH_LIMIT",
            |v: &f32| *v > DEFAULT_INVERSE_LOW_LIMIT && v.is_finite(),
            "above the farthest-radius limit",
        ) {
            config.render_distance_high_limit = high;
        }
        if let Some(kp) = parse_var(&lookup, "RENDER_DISTANCE_KP", |v: &f32| *v >= 0.0 && v.is_finite(), ">= 0") {
            config.render_distance_kp = kp;
        }
        if let Some(ki) = parse_var(&lookup, "RENDER_DISTANCE_KI", |v: &f32| *v >= 0.0 && v.is_finite(), ">= 0") {
            config.render_distance_ki = ki;
        }
        if let Some(kd) = parse_var(&lookup, "RENDER_DISTANCE_KD", |v: &f32| *v >= 0.0 && v.is_finite(), ">= 0") {
            config.render_distance_kd = kd;
        }
        if let Some(render) = parse_var(&lookup, "SHOULD_RENDER_AVATARS", |_: &bool| true, "true or false") {
            config.should_render_avatars = render;
        }
        if let Some(port) = parse_var(&lookup, "METRICS_PORT", |_: &u16| true, "a port number") {
            config.metrics_port = port;
        }
        if let Some(count) = parse_var(&lookup, "SIMULATED_AVATARS", |v: &usize| *v <= 10_000, "0-10000") {
            config.simulated_avatars = count;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.target_frame_rate.is_nan() || self.target_frame_rate <= 0.0 {
            return Err("target_frame_rate must be positive".to_string());
        }
        if self.render_distance_high_limit <= DEFAULT_INVERSE_LOW_LIMIT {
            return Err("render_distance_high_limit must exceed the low limit".to_string());
        }
        if self.render_distance_kp < 0.0 || self.render_distance_ki < 0.0 || self.render_distance_kd < 0.0 {
            return Err("PID gains cannot be negative".to_string());
        }
        Ok(())
    }

    /// Governor tuning derived from this config
    pub fn governor_tuning(&self) -> GovernorTuning {
        GovernorTuning {
            target_frame_rate: self.target_frame_rate,
            kp: self.render_distance_kp,
            ki: self.render_distance_ki,
            kd: self.render_distance_kd,
            inverse_low_limit: DEFAULT_INVERSE_LOW_LIMIT,
            inverse_high_limit: self.render_distance_high_limit,
            average_window: AVERAGE_WINDOW,
        }
    }
}
