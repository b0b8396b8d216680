use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use avatar_presence::action::hold::HoldAction;
use avatar_presence::action::Action;
use avatar_presence::avatar::entry::{Hand, HandPoses, PalmPose, SessionId};
use avatar_presence::avatar::registry::AvatarRegistry;
use avatar_presence::avatar::AvatarManager;
use avatar_presence::config::ClientConfig;
use avatar_presence::metrics::{self, Metrics};
use avatar_presence::net::mixer::{MixerError, MixerEvent, MixerInbox, MixerSender};
use avatar_presence::scene::ItemScene;
use avatar_presence::util::clock::{usec_timestamp_now, ServerClock};
use avatar_presence::world::{Entity, EntityArena, RigidBody};

const MIXER_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Avatar presence v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: target_fps={}, simulated_avatars={}, render_avatars={}",
        config.target_frame_rate, config.simulated_avatars, config.should_render_avatars
    );

    let metrics = Arc::new(Metrics::new());
    if config.metrics_port != 0 {
        let metrics_clone = metrics.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let inbox = MixerInbox::default();
    let mixer = tokio::spawn(run_simulated_mixer(
        inbox.sender(),
        config.simulated_avatars,
        metrics.clone(),
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = run_simulation(config, inbox, metrics) => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    mixer.abort();
    info!("Stopped");
    Ok(())
}

/// Frame loop: mixer events, avatars, fades, then actions
async fn run_simulation(config: ClientConfig, inbox: MixerInbox, metrics: Arc<Metrics>) {
    let registry = Arc::new(AvatarRegistry::new());
    let clock = Arc::new(ServerClock::default());
    let scene = Arc::new(ItemScene::new());

    let mut manager = AvatarManager::new(registry.clone(), clock, scene.clone(), config.governor_tuning());
    manager.update_avatar_render_status(config.should_render_avatars);
    manager.init();
    let my_session_id = Uuid::new_v4();
    registry.set_my_session_id(my_session_id);

    // One entity held in our right hand
    let mut arena = EntityArena::new();
    let cup = arena.insert(Entity::with_body(Uuid::new_v4(), RigidBody::default()));
    let hold = Action::Hold(Arc::new(HoldAction::new(Uuid::new_v4(), cup)));
    let args = json!({
        "hand": "right",
        "relativePosition": { "x": 0.0, "y": 0.05, "z": 0.1 },
        "timeScale": 0.2,
        "tag": "demo-cup"
    });
    if let Some(args) = args.as_object() {
        let ctx = manager.action_context(usec_timestamp_now());
        hold.update_arguments(&mut arena, args, &ctx);
    }
    if let Some(entity) = arena.get_mut(cup) {
        entity.add_action(hold);
    }

    let frame = Duration::from_secs_f32(1.0 / config.target_frame_rate);
    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut last_frame = Instant::now();
    let mut last_status = Instant::now();

    loop {
        ticker.tick().await;
        let tick_start = Instant::now();
        let dt = tick_start.duration_since(last_frame).as_secs_f32().max(f32::EPSILON);
        last_frame = tick_start;
        let fps = 1.0 / dt;
        let now = usec_timestamp_now();

        let applied = manager.drain_inbox(&inbox);
        metrics.mixer_events.fetch_add(applied as u64, Ordering::Relaxed);

        sway_my_hand(&registry, started.elapsed().as_secs_f32());
        if manager.update_my_avatar(now, dt) {
            debug!("Avatar data due for session {}", my_session_id);
        }

        // Running far behind: hold the controller and pull everything in
        let throttled = dt > frame.as_secs_f32() * 4.0;
        let summary = manager.update_other_avatars(fps, throttled, dt);

        let report = {
            let ctx = manager.action_context(now);
            arena.update_actions(&ctx, dt)
        };

        metrics.record_avatar_tick(registry.len(), &summary);
        metrics.record_actions(&report);
        metrics.record_tick_time(tick_start.elapsed());

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            let cup_position = arena
                .get(cup)
                .and_then(|e| e.body.as_ref())
                .map(|b| b.position)
                .unwrap_or(Vec3::ZERO);
            info!(
                "avatars={} rendered={} fading={} distance={:.1}m scene_items={} cup={:?}",
                registry.len(),
                summary.rendered,
                summary.fading,
                summary.render_distance,
                scene.len(),
                cup_position
            );
        }
    }
}

/// Move the local right hand in a slow circle so the hold has work to do
fn sway_my_hand(registry: &AvatarRegistry, t: f32) {
    let position = Vec3::new(t.cos() * 0.3, 1.2, t.sin() * 0.3);
    let pose = PalmPose::new(position, Quat::from_rotation_y(t));
    let me = registry.my_avatar();
    let mut avatar = me.write();
    avatar.hands.set_tracked(Hand::Right, pose);
    avatar.hands.set_resolved(Hand::Right, pose);
}

/// Stand-in for the avatar mixer: wandering avatars that come and go
async fn run_simulated_mixer(sender: MixerSender, count: usize, metrics: Arc<Metrics>) {
    let mut rng = StdRng::from_entropy();
    let mut avatars: Vec<(SessionId, Vec3)> = (0..count)
        .map(|_| {
            let position = Vec3::new(rng.gen_range(-200.0..200.0), 0.0, rng.gen_range(-200.0..200.0));
            (Uuid::new_v4(), position)
        })
        .collect();

    let mut ticker = tokio::time::interval(MIXER_INTERVAL);
    loop {
        ticker.tick().await;

        // Occasionally someone leaves and someone new arrives
        if !avatars.is_empty() && rng.gen_bool(0.02) {
            let idx = rng.gen_range(0..avatars.len());
            let (gone, _) = avatars.swap_remove(idx);
            if !send(&sender, MixerEvent::KillAvatar { session_id: gone }, &metrics) {
                return;
            }
            avatars.push((Uuid::new_v4(), Vec3::new(rng.gen_range(-200.0..200.0), 0.0, 0.0)));
        }

        for (session_id, position) in avatars.iter_mut() {
            *position += Vec3::new(rng.gen_range(-0.5..0.5), 0.0, rng.gen_range(-0.5..0.5));
            let palm = PalmPose::new(*position + Vec3::Y, Quat::IDENTITY);
            let event = MixerEvent::AvatarData {
                session_id: *session_id,
                position: *position,
                hands: HandPoses::uniform(palm, palm),
            };
            if !send(&sender, event, &metrics) {
                return;
            }
        }
    }
}

/// Returns false once the simulation side has gone away
fn send(sender: &MixerSender, event: MixerEvent, metrics: &Metrics) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(MixerError::Full) => {
            metrics.mixer_dropped.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(MixerError::Disconnected) => {
            warn!("Mixer inbox closed, stopping simulated mixer");
            false
        }
    }
}
