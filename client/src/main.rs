mod capture;
mod settings;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::Duration;

use anyhow::Context;

use world_core::constants::TICK_MILLIS;
use world_core::error::ProtocolResult;
use world_core::session::GameSession;
use world_core::types::TypeTables;
use world_core::world::World;

use crate::capture::CaptureReader;
use crate::settings::{load_settings, DriverSettings, DEFAULT_SETTINGS_FILE};

fn load_type_tables(path: Option<&Path>) -> anyhow::Result<TypeTables> {
    let Some(path) = path else {
        log::warn!("No type tables configured; every config lookup falls back to defaults");
        return Ok(TypeTables::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading type tables {}", path.display()))?;
    TypeTables::from_json(&text).with_context(|| format!("parsing type tables {}", path.display()))
}

/// `process_incoming` calls allowed per tick. Anything left over stays
/// buffered for the next tick.
const POLLS_PER_TICK: usize = 4;

fn poll_budgeted(session: &mut GameSession) -> ProtocolResult<usize> {
    let mut handled = 0;
    for _ in 0..POLLS_PER_TICK {
        match session.process_incoming()? {
            0 => break,
            n => handled += n,
        }
    }
    Ok(handled)
}

/// One client tick: a bounded decode pass, then the simulation step.
fn step(session: &mut GameSession, settings: &DriverSettings) -> anyhow::Result<usize> {
    let handled =
        poll_budgeted(session).with_context(|| format!("decoding capture at tick {}", session.world.tick))?;
    session.tick();

    let outbound = session.take_outbound();
    if !outbound.is_empty() {
        log::debug!("{} bytes queued for the server", outbound.len());
    }

    let interval = settings.snapshot_interval as i32;
    if interval > 0 && session.world.tick % interval == 0 {
        match serde_json::to_string(&session.world.snapshot()) {
            Ok(json) => log::info!("snapshot {json}"),
            Err(e) => log::error!("Failed to serialize snapshot: {e}"),
        }
    }

    if settings.realtime {
        thread::sleep(Duration::from_millis(TICK_MILLIS));
    }
    Ok(handled)
}

/// Whether the replay should keep going.
fn keep_running(session: &GameSession, settings: &DriverSettings) -> bool {
    if session.world.logged_out {
        log::info!("Server logged the player out at tick {}", session.world.tick);
        return false;
    }
    if settings.tick_limit > 0 && session.world.tick >= settings.tick_limit as i32 {
        log::info!("Tick limit {} reached", settings.tick_limit);
        return false;
    }
    true
}

/// Ticks the session up to `tick`. Returns false once the replay should stop.
fn run_until(session: &mut GameSession, settings: &DriverSettings, tick: i32) -> anyhow::Result<bool> {
    while session.world.tick < tick {
        if !keep_running(session, settings) {
            return Ok(false);
        }
        step(session, settings)?;
    }
    Ok(keep_running(session, settings))
}

/// Ticks until the decoder has nothing complete left to hand out.
fn drain(session: &mut GameSession, settings: &DriverSettings) -> anyhow::Result<()> {
    while session.buffered() > 0 && keep_running(session, settings) {
        if step(session, settings)? == 0 {
            log::warn!("{} bytes of a partial frame left at end of capture", session.buffered());
            break;
        }
    }
    Ok(())
}

fn replay_records(session: &mut GameSession, settings: &DriverSettings) -> anyhow::Result<()> {
    for record in CaptureReader::open(&settings.capture_path)? {
        let record = record?;
        if !run_until(session, settings, record.tick as i32)? {
            return Ok(());
        }
        session.receive(&record.bytes);
    }
    drain(session, settings)
}

fn replay(settings: &DriverSettings) -> anyhow::Result<()> {
    let types = load_type_tables(settings.type_tables_path.as_deref())?;
    let mut session = GameSession::new(World::new(types), settings.session_seed);

    let result = replay_records(&mut session, settings);
    for message in session.world.messages.to_vec_oldest_first() {
        log::info!("message: {message}");
    }
    session.world.telemetry.log_summary();
    result
}

fn main() {
    let settings_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = load_settings(&settings_path);

    world_core::initialize_logger(settings.log_level(), settings.log_file.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logger: {}. Exiting.", e);
        process::exit(1);
    });

    log::info!(
        "Replaying {} with settings from {}",
        settings.capture_path.display(),
        settings_path.display()
    );

    if let Err(e) = replay(&settings) {
        log::error!("Replay failed: {e:#}");
        process::exit(1);
    }
}
