//! Demo host
//!
//! Runs the plugin against the in-memory host with a crowd of simulated
//! players that wander, open the map and teleport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hybrid_map_plugin::config::MemoryConfigStore;
use hybrid_map_plugin::driver::run_tick_loop;
use hybrid_map_plugin::events::{EventQueue, EventSender, InteractKind, PluginEvent};
use hybrid_map_plugin::host::{BlockPos, PlayerHandle, PlayerRegistry, Position};
use hybrid_map_plugin::load::SystemLoadSampler;
use hybrid_map_plugin::sim::{SimulatedHost, GROUND_LEVEL};
use hybrid_map_plugin::{HostServices, HybridMapPlugin, PluginConfig};

const DEFAULT_SIM_PLAYERS: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Hybrid Map Plugin v{}", env!("CARGO_PKG_VERSION"));

    let config = PluginConfig::load_or_default();
    info!(
        "Configuration loaded: tick_rate={}, map_icon_refresh_rate={}, bossbar_refresh_rate={}",
        config.tick_rate, config.map_icon_refresh_rate, config.bossbar_refresh_rate
    );

    let sim_players: usize = std::env::var("SIM_PLAYERS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SIM_PLAYERS);

    let host = Arc::new(SimulatedHost::new());
    let services = HostServices {
        registry: host.clone(),
        world: host.clone(),
        transport: host.clone(),
        teleporter: host.clone(),
        config: Arc::new(MemoryConfigStore::new()),
        sampler: Arc::new(SystemLoadSampler::new()),
    };
    let plugin = HybridMapPlugin::enable(services, config.clone())?;

    let events = Arc::new(EventQueue::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runtime_ids = Arc::new(AtomicU64::new(1));
    for index in 0..sim_players {
        tokio::spawn(simulate_player(
            index,
            host.clone(),
            events.sender(),
            runtime_ids.clone(),
            shutdown_rx.clone(),
        ));
    }
    info!("Spawned {} simulated players", sim_players);

    // The simulated transport buffers every packet; drain it so memory stays flat
    let sink_host = host.clone();
    let mut sink_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let delivered = sink_host.drain_messages().len();
                    debug!("Delivered {} display packets", delivered);
                }
                _ = sink_shutdown.changed() => break,
            }
        }
    });

    let tick_loop = tokio::spawn(run_tick_loop(
        plugin.clone(),
        events.clone(),
        config.tick_duration(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    // Receivers may already be gone if every task exited
    let _ = shutdown_tx.send(true);
    let ticks = tick_loop.await?;

    plugin.disable();
    info!("Plugin stopped after {} ticks", ticks);
    info!("Final metrics:\n{}", plugin.metrics().to_prometheus());

    Ok(())
}

/// One simulated seat: a player connects, wanders for a while, leaves, and
/// a fresh player takes the seat until shutdown.
async fn simulate_player(
    index: usize,
    host: Arc<SimulatedHost>,
    events: EventSender,
    runtime_ids: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();

    while !*shutdown.borrow() {
        let runtime_id = runtime_ids.fetch_add(1, Ordering::Relaxed);
        let player = PlayerHandle::new(Uuid::new_v4(), runtime_id, format!("Sim{}-{}", index, runtime_id));
        let mut position = Position::new(
            rng.gen_range(-2000.0..2000.0),
            GROUND_LEVEL as f64,
            rng.gen_range(-2000.0..2000.0),
        );

        host.connect(player.clone(), position);
        submit(&events, PluginEvent::Connected(player.clone()));

        let lifetime: u32 = rng.gen_range(20..200);
        for _ in 0..lifetime {
            let pause = Duration::from_millis(rng.gen_range(100..600));
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }

            // Pick up any teleport that landed since the last step
            if let Some(current) = host.position(player.session) {
                position = current;
            }
            position.x += rng.gen_range(-6.0..6.0);
            position.z += rng.gen_range(-6.0..6.0);
            host.move_player(player.session, position);

            let roll = rng.gen_range(0..100);
            if roll < 4 {
                // Click into the air with the map in hand
                submit(&events, PluginEvent::Interact { session: player.session, kind: InteractKind::Activate });
            } else if roll < 6 {
                let destination = BlockPos::new(
                    rng.gen_range(-5000..5000),
                    rng.gen_range(0..GROUND_LEVEL),
                    rng.gen_range(-5000..5000),
                );
                submit(&events, PluginEvent::TeleportRequest { session: player.session, destination });
            }
        }

        host.disconnect(player.session);
        submit(&events, PluginEvent::Disconnected(player.session));
    }
}

fn submit(events: &EventSender, event: PluginEvent) {
    if let Err(dropped) = events.try_submit(event) {
        warn!("Event queue full, dropped event for {}", dropped.session());
    }
}
