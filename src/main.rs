use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::interval;
use tracing::{debug, info, Level};

use strikepoint_server::config::ServerConfig;
use strikepoint_server::game::capture::CapturePoint;
use strikepoint_server::game::constants::tick;
use strikepoint_server::game::game_loop::{GameLoop, GameLoopConfig};
use strikepoint_server::game::spawn::{DefaultLoadout, PadSpawnSelector, SpawnPad};
use strikepoint_server::net::session::Session;
use strikepoint_server::util::vec3::Vec3;

/// Scene-placed objective markers and spawn pads for the headless map
fn default_layout() -> (Vec<CapturePoint>, Vec<SpawnPad>) {
    let flags = vec![
        CapturePoint::new(0, Vec3::new(-40.0, 0.0, 0.0), 6.0),
        CapturePoint::new(1, Vec3::new(0.0, 0.0, 30.0), 6.0),
        CapturePoint::new(2, Vec3::new(40.0, 0.0, 0.0), 6.0),
    ];
    let pads = vec![
        SpawnPad {
            team: 0,
            position: Vec3::new(-70.0, 0.0, -20.0),
            yaw: std::f32::consts::FRAC_PI_2,
        },
        SpawnPad {
            team: 0,
            position: Vec3::new(-70.0, 0.0, 20.0),
            yaw: std::f32::consts::FRAC_PI_2,
        },
        SpawnPad {
            team: 1,
            position: Vec3::new(70.0, 0.0, -20.0),
            yaw: -std::f32::consts::FRAC_PI_2,
        },
        SpawnPad {
            team: 1,
            position: Vec3::new(70.0, 0.0, 20.0),
            yaw: -std::f32::consts::FRAC_PI_2,
        },
    ];
    (flags, pads)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Strikepoint Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: capacity={}, teams={}, bot_fill={}",
        config.room_capacity, config.team_count, config.bot_fill
    );

    let (flags, pads) = default_layout();
    let mut session = Session::host(&config.host_name, config.max_humans);
    let mut game = GameLoop::new(
        GameLoopConfig {
            capacity: config.room_capacity,
            team_count: config.team_count,
            bot_fill: config.bot_fill,
            model_pool: vec![0, 1, 2, 3],
        },
        flags,
        Box::new(PadSpawnSelector::new(pads)),
        Box::new(DefaultLoadout),
    );

    // The host participates like any other combatant
    let local_actor = session.local_actor();
    game.register_human(&mut session, local_actor, config.host_name.clone());
    if config.team_count >= 2 {
        game.select_team(&mut session, local_actor, 0);
    }
    game.start(&mut session);

    let shared = Arc::new(RwLock::new((session, game)));

    // Fixed-rate authority tick task
    let tick_state = shared.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(tick::DURATION_MS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("Authority loop started at {} Hz", tick::RATE);
        loop {
            ticker.tick().await;

            let mut guard = tick_state.write();
            let (session, game) = &mut *guard;
            game.authority_tick(session);

            // The wire transport is an external collaborator; a headless
            // run simply drains the queue
            let outbound = session.drain_outbox();
            if !outbound.is_empty() {
                debug!("Drained {} outbound messages", outbound.len());
            }

            // Log stats every 30 seconds
            if game.current_tick() % (tick::RATE as u64 * 30) == 0 {
                game.log_stats(session);
            }
        }
    });

    // Shutdown signal handler
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let guard = shared.read();
    guard.1.log_stats(&guard.0);
    info!("Server stopped");

    Ok(())
}
