//! Feedback control primitives used by the render-distance governor

pub mod average;
pub mod pid;
