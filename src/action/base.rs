//! Fields every action kind carries: lifetime and tag

use serde_json::Value;
use tracing::debug;

use crate::action::arguments::{extract_f32, extract_string, or_previous, ArgumentMap};

const USECS_PER_SECOND: f64 = 1_000_000.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionBase {
    /// Local expiry time in microseconds; 0 never expires
    pub expires: u64,
    pub tag: String,
    pub active: bool,
    pub released: bool,
}

impl ActionBase {
    /// Apply `ttl` (seconds from now) and `tag`; returns whether either changed
    pub fn update_arguments(&mut self, args: &ArgumentMap, now: u64) -> bool {
        let mut changed = false;

        let ttl = match extract_f32(args, "ttl") {
            Ok(ttl) => ttl,
            Err(e) => {
                debug!("{}; keeping previous expiry", e);
                None
            }
        };
        if let Some(ttl) = ttl {
            let expires = if ttl > 0.0 {
                // Float-to-int casts saturate; the sum must too
                now.saturating_add((ttl as f64 * USECS_PER_SECOND) as u64)
            } else {
                0
            };
            if expires != self.expires {
                self.expires = expires;
                changed = true;
            }
        }

        let tag = or_previous(extract_string(args, "tag"), self.tag.clone());
        if tag != self.tag {
            self.tag = tag;
            changed = true;
        }

        changed
    }

    pub fn write_arguments(&self, args: &mut ArgumentMap, now: u64) {
        let ttl = if self.expires == 0 {
            0.0
        } else {
            self.expires.saturating_sub(now) as f64 / USECS_PER_SECOND
        };
        args.insert("ttl".into(), Value::from(ttl));
        args.insert("tag".into(), Value::String(self.tag.clone()));
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires != 0 && now >= self.expires
    }
}
