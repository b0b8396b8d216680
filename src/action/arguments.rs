//! Arguments maps for configuring actions
//!
//! Every field is optional. Extraction returns `Ok(None)` when the field is
//! absent and `Err(InvalidArgument)` when it is present but unusable; either
//! way the caller keeps its previous value for that field.

use glam::{Quat, Vec3};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::action::ActionError;

pub type ArgumentMap = Map<String, Value>;

fn invalid(name: &str, reason: impl Into<String>) -> ActionError {
    ActionError::InvalidArgument {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn component(obj: &Map<String, Value>, name: &str, key: &str) -> Result<f32, ActionError> {
    let value = obj
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid(name, format!("missing numeric '{}'", key)))? as f32;
    if !value.is_finite() {
        return Err(invalid(name, format!("'{}' is not finite", key)));
    }
    Ok(value)
}

pub fn extract_vec3(args: &ArgumentMap, name: &str) -> Result<Option<Vec3>, ActionError> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };
    let obj = value.as_object().ok_or_else(|| invalid(name, "expected {x, y, z}"))?;
    Ok(Some(Vec3::new(
        component(obj, name, "x")?,
        component(obj, name, "y")?,
        component(obj, name, "z")?,
    )))
}

/// Quaternions are normalized; a zero-length quaternion is rejected
pub fn extract_quat(args: &ArgumentMap, name: &str) -> Result<Option<Quat>, ActionError> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(name, "expected {x, y, z, w}"))?;
    let q = Quat::from_xyzw(
        component(obj, name, "x")?,
        component(obj, name, "y")?,
        component(obj, name, "z")?,
        component(obj, name, "w")?,
    );
    if q.length_squared() <= f32::EPSILON {
        return Err(invalid(name, "zero-length quaternion"));
    }
    Ok(Some(q.normalize()))
}

pub fn extract_f32(args: &ArgumentMap, name: &str) -> Result<Option<f32>, ActionError> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };
    let v = value.as_f64().ok_or_else(|| invalid(name, "expected a number"))? as f32;
    if !v.is_finite() {
        return Err(invalid(name, "not finite"));
    }
    Ok(Some(v))
}

pub fn extract_bool(args: &ArgumentMap, name: &str) -> Result<Option<bool>, ActionError> {
    match args.get(name) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(invalid(name, "expected a boolean")),
    }
}

pub fn extract_string(args: &ArgumentMap, name: &str) -> Result<Option<String>, ActionError> {
    match args.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(name, "expected a string")),
    }
}

/// Resolve an extraction to a value, keeping `previous` when absent or invalid
pub fn or_previous<T>(extracted: Result<Option<T>, ActionError>, previous: T) -> T {
    match extracted {
        Ok(Some(v)) => v,
        Ok(None) => previous,
        Err(e) => {
            debug!("{}; keeping previous value", e);
            previous
        }
    }
}

pub fn vec3_to_value(v: Vec3) -> Value {
    json!({ "x": v.x, "y": v.y, "z": v.z })
}

pub fn quat_to_value(q: Quat) -> Value {
    json!({ "x": q.x, "y": q.y, "z": q.z, "w": q.w })
}

pub fn uuid_to_value(id: Uuid) -> Value {
    Value::String(id.to_string())
}
