//! Microsecond timestamps and the local/server clock skew
//!
//! Expiry times travel over the wire in server time; everything local runs
//! on the client's own clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the unix epoch on the local clock
pub fn usec_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Offset between the local clock and the domain server's clock
///
/// `server = local + skew`. Updated by the networking layer whenever a
/// ping round-trip produces a new estimate.
#[derive(Debug, Default)]
pub struct ServerClock {
    skew_usecs: AtomicI64,
}

impl ServerClock {
    pub fn new(skew_usecs: i64) -> Self {
        Self {
            skew_usecs: AtomicI64::new(skew_usecs),
        }
    }

    pub fn set_skew(&self, skew_usecs: i64) {
        self.skew_usecs.store(skew_usecs, Ordering::Relaxed);
    }

    pub fn skew(&self) -> i64 {
        self.skew_usecs.load(Ordering::Relaxed)
    }

    /// Zero means "never expires" and is passed through untouched
    pub fn local_to_server(&self, local: u64) -> u64 {
        if local == 0 {
            return 0;
        }
        local.saturating_add_signed(self.skew())
    }

    pub fn server_to_local(&self, server: u64) -> u64 {
        if server == 0 {
            return 0;
        }
        server.saturating_add_signed(-self.skew())
    }
}
