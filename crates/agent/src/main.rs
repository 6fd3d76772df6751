use anyhow::{Context, Result};
use std::{env, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

use plant_agent::communicator::HttpCommunicator;
use plant_agent::config::{self, Config};
use plant_agent::hardware::relay::PumpRelay;
use plant_agent::hardware::{camera, moisture};
use plant_agent::pump::Pump;
use plant_agent::server_checker::ServerChecker;
use plant_agent::state::AgentState;
use plant_agent::time_keeper::{Clock, SystemClock};
use plant_agent::web;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // The local UTC offset can only be read while we are single-threaded.
    let clock = SystemClock::detect();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?
        .block_on(run(cfg, Arc::new(clock)))
}

async fn run(cfg: Config, clock: Arc<dyn Clock>) -> Result<()> {
    // ── Hardware ────────────────────────────────────────────────────
    let relay = PumpRelay::new(cfg.relay.gpio_pin, cfg.relay.active_low)
        .context("failed to initialise pump relay")?;
    let moisture_sensor =
        moisture::build(&cfg.moisture).context("failed to initialise moisture sensor")?;
    let camera = camera::build(&cfg.camera);

    let pump = Pump::new(cfg.pump_settings(), Box::new(relay), moisture_sensor, clock)?;

    // ── Backend ─────────────────────────────────────────────────────
    let communicator =
        HttpCommunicator::new(&cfg.server, &cfg.device.guid, cfg.camera.photos_dir.clone())?;

    // ── Shared state (ephemeral, for the status endpoint) ───────────
    let shared = AgentState::shared();

    // ── Web server ──────────────────────────────────────────────────
    if cfg.web.enabled {
        let web_state = Arc::clone(&shared);
        let port = cfg.web.port;
        tokio::spawn(async move {
            if let Err(e) = web::serve(web_state, port).await {
                tracing::error!("status endpoint stopped: {e:#}");
            }
        });
    }

    // ── Reconciliation loop ─────────────────────────────────────────
    let checker = ServerChecker::new(
        pump,
        communicator,
        camera,
        Duration::from_secs(cfg.timing.wait_time_between_cycle),
        shared,
    );

    info!(
        device = %cfg.device.guid,
        server = %cfg.server.base_url,
        "plant agent starting"
    );

    // Dropping the loop mid-dwell releases the relay.
    tokio::select! {
        () = checker.run() => {}
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
        }
    }

    Ok(())
}
