use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTINGS_FILE: &str = "world-client.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Recorded server stream to replay. `.gz` files are inflated on the fly.
    pub capture_path: PathBuf,
    /// JSON type tables. Empty tables are used when unset.
    pub type_tables_path: Option<PathBuf>,
    /// ISAAC seed the capture was recorded with.
    pub session_seed: [u32; 4],

    pub log_level: String,
    pub log_file: Option<String>,

    /// Stop after this many ticks; 0 runs the whole capture.
    pub tick_limit: u32,
    /// Log a world snapshot every this many ticks; 0 disables.
    pub snapshot_interval: u32,
    /// Sleep between ticks to replay at the client's tick rate.
    pub realtime: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            capture_path: PathBuf::from("capture.bin"),
            type_tables_path: None,
            session_seed: [0; 4],

            log_level: "info".to_string(),
            log_file: Some("world-client.log".to_string()),

            tick_limit: 0,
            snapshot_interval: 50,
            realtime: false,
        }
    }
}

impl DriverSettings {
    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Reads settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings(path: &Path) -> DriverSettings {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(_) => return DriverSettings::default(),
    };

    match serde_json::from_slice::<DriverSettings>(&bytes) {
        Ok(s) => s,
        Err(e) => {
            // The logger isn't up yet; it is configured from these settings.
            eprintln!("Failed to parse settings file {:?}: {e}", path);
            DriverSettings::default()
        }
    }
}
