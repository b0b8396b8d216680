//! Prometheus-compatible metrics endpoint
//!
//! Exposes avatar and action counters as Prometheus text and JSON.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::avatar::manager::AvatarTickSummary;
use crate::world::ActionTickReport;

const TICK_HISTORY: usize = 1000;

#[derive(Debug)]
pub struct Metrics {
    // Avatars
    pub avatars_total: AtomicU64,
    pub avatars_rendered: AtomicU64,
    pub avatars_fading: AtomicU64,
    pub avatars_evicted: AtomicU64,
    /// Render distance in centimetres
    pub render_distance_cm: AtomicU64,

    // Actions
    pub hold_updates: AtomicU64,
    pub kinematic_updates: AtomicU64,
    pub skipped_hold_ticks: AtomicU64,
    pub missing_collaborators: AtomicU64,
    pub expired_actions: AtomicU64,

    // Mixer
    pub mixer_events: AtomicU64,
    pub mixer_dropped: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            avatars_total: AtomicU64::new(0),
            avatars_rendered: AtomicU64::new(0),
            avatars_fading: AtomicU64::new(0),
            avatars_evicted: AtomicU64::new(0),
            render_distance_cm: AtomicU64::new(0),
            hold_updates: AtomicU64::new(0),
            kinematic_updates: AtomicU64::new(0),
            skipped_hold_ticks: AtomicU64::new(0),
            missing_collaborators: AtomicU64::new(0),
            expired_actions: AtomicU64::new(0),
            mixer_events: AtomicU64::new(0),
            mixer_dropped: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    pub fn record_avatar_tick(&self, avatars: usize, summary: &AvatarTickSummary) {
        self.avatars_total.store(avatars as u64, Ordering::Relaxed);
        self.avatars_rendered.store(summary.rendered as u64, Ordering::Relaxed);
        self.avatars_fading.store(summary.fading as u64, Ordering::Relaxed);
        self.avatars_evicted.fetch_add(summary.evicted as u64, Ordering::Relaxed);
        self.render_distance_cm
            .store((summary.render_distance * 100.0).max(0.0) as u64, Ordering::Relaxed);
    }

    pub fn record_actions(&self, report: &ActionTickReport) {
        self.hold_updates
            .fetch_add((report.spring + report.kinematic) as u64, Ordering::Relaxed);
        self.kinematic_updates.fetch_add(report.kinematic as u64, Ordering::Relaxed);
        self.skipped_hold_ticks
            .fetch_add(report.skipped_contention as u64, Ordering::Relaxed);
        self.missing_collaborators
            .fetch_add(report.missing_collaborator as u64, Ordering::Relaxed);
        self.expired_actions.fetch_add(report.expired as u64, Ordering::Relaxed);
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("avatar_presence_avatars", "Avatars in the registry, self included", "gauge",
            self.avatars_total.load(Ordering::Relaxed));
        metric!("avatar_presence_avatars_rendered", "Remote avatars within render distance", "gauge",
            self.avatars_rendered.load(Ordering::Relaxed));
        metric!("avatar_presence_avatars_fading", "Avatars in the fade-out set", "gauge",
            self.avatars_fading.load(Ordering::Relaxed));
        metric!("avatar_presence_avatars_evicted_total", "Fades completed", "counter",
            self.avatars_evicted.load(Ordering::Relaxed));
        metric!("avatar_presence_render_distance_cm", "Current render distance in centimetres", "gauge",
            self.render_distance_cm.load(Ordering::Relaxed));

        metric!("avatar_presence_hold_updates_total", "Action ticks that moved a body", "counter",
            self.hold_updates.load(Ordering::Relaxed));
        metric!("avatar_presence_kinematic_updates_total", "Action ticks that wrote a transform directly", "counter",
            self.kinematic_updates.load(Ordering::Relaxed));
        metric!("avatar_presence_hold_ticks_skipped_total", "Action ticks skipped on lock contention", "counter",
            self.skipped_hold_ticks.load(Ordering::Relaxed));
        metric!("avatar_presence_missing_collaborators_total", "Action ticks missing an owner or body", "counter",
            self.missing_collaborators.load(Ordering::Relaxed));
        metric!("avatar_presence_actions_expired_total", "Actions removed on expiry", "counter",
            self.expired_actions.load(Ordering::Relaxed));

        metric!("avatar_presence_mixer_events_total", "Mixer events applied", "counter",
            self.mixer_events.load(Ordering::Relaxed));
        metric!("avatar_presence_mixer_dropped_total", "Mixer events dropped on backpressure", "counter",
            self.mixer_dropped.load(Ordering::Relaxed));

        metric!("avatar_presence_tick_time_microseconds", "Last tick time", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("avatar_presence_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("avatar_presence_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("avatar_presence_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("avatar_presence_uptime_seconds", "Uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    pub fn to_json(&self) -> String {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        json!({
            "avatars": {
                "total": load(&self.avatars_total),
                "rendered": load(&self.avatars_rendered),
                "fading": load(&self.avatars_fading),
                "evicted": load(&self.avatars_evicted),
                "render_distance_m": load(&self.render_distance_cm) as f64 / 100.0,
            },
            "actions": {
                "hold_updates": load(&self.hold_updates),
                "kinematic_updates": load(&self.kinematic_updates),
                "skipped": load(&self.skipped_hold_ticks),
                "missing_collaborators": load(&self.missing_collaborators),
                "expired": load(&self.expired_actions),
            },
            "mixer": {
                "events": load(&self.mixer_events),
                "dropped": load(&self.mixer_dropped),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
                "uptime_seconds": self.uptime_seconds(),
            },
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Serve `/metrics`, `/json` and `/health` until the listener fails
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // /metrics/json has to be checked before /metrics
                    let response = if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
