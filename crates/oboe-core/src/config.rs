//! Library configuration
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/oboe/config.yaml (override with `OBOE_CONFIG`).
//! `OBOE_BACKEND` overrides the backend choice from the file.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::BackendKind;

/// Default frames per burst when the backend lets us choose
/// 192 frames @ 48kHz = 4ms
pub const DEFAULT_FRAMES_PER_BURST: u32 = 192;

/// Default capacity of the transfer FIFO, in bursts
pub const DEFAULT_BURSTS_PER_CAPACITY: u32 = 4;

/// SCHED_FIFO priority requested for audio threads
pub const DEFAULT_REALTIME_PRIORITY: i32 = 2;

/// Smallest and largest burst we accept from config or builder hints
pub const MIN_FRAMES_PER_BURST: u32 = 16;
pub const MAX_FRAMES_PER_BURST: u32 = 8192;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OboeConfig {
    /// Which backend `Auto` streams use
    pub backend: BackendKind,
    /// Callback size requested from CPAL and the Null device
    pub frames_per_burst: u32,
    /// FIFO capacity as a multiple of the burst
    pub bursts_per_capacity: u32,
    /// Priority for SCHED_FIFO audio threads (Linux)
    pub realtime_priority: i32,
    /// Base name for JACK clients (JACK may append a suffix)
    pub jack_client_name: String,
    /// Connect JACK ports to the physical system ports on open
    pub jack_autoconnect: bool,
}

impl Default for OboeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            frames_per_burst: DEFAULT_FRAMES_PER_BURST,
            bursts_per_capacity: DEFAULT_BURSTS_PER_CAPACITY,
            realtime_priority: DEFAULT_REALTIME_PRIORITY,
            jack_client_name: "oboe".to_string(),
            jack_autoconnect: true,
        }
    }
}

impl OboeConfig {
    /// Burst size clamped to the supported range
    pub fn burst_frames(&self) -> u32 {
        self.frames_per_burst
            .clamp(MIN_FRAMES_PER_BURST, MAX_FRAMES_PER_BURST)
    }

    /// Capacity multiplier, at least double buffering
    pub fn capacity_bursts(&self) -> u32 {
        self.bursts_per_capacity.clamp(2, 64)
    }

    /// Apply `OBOE_BACKEND` if it names a known backend
    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("OBOE_BACKEND") {
            match value.parse::<BackendKind>() {
                Ok(kind) => {
                    log::info!("OBOE_BACKEND overrides backend: {:?}", kind);
                    self.backend = kind;
                }
                Err(e) => log::warn!("Ignoring OBOE_BACKEND={:?}: {}", value, e),
            }
        }
    }
}

/// Get the default config file path
///
/// Returns: $OBOE_CONFIG, else ~/.config/oboe/config.yaml
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("OBOE_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("oboe")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> OboeConfig {
    if !path.exists() {
        log::debug!("load_config: {:?} doesn't exist, using defaults", path);
        return OboeConfig::default();
    }

    match read_config(path) {
        Ok(config) => {
            log::info!(
                "load_config: backend {:?}, burst {} frames, capacity {} bursts",
                config.backend,
                config.frames_per_burst,
                config.bursts_per_capacity
            );
            config
        }
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            OboeConfig::default()
        }
    }
}

fn read_config(path: &Path) -> Result<OboeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &OboeConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved to {:?}", path);
    Ok(())
}

static GLOBAL_CONFIG: OnceLock<OboeConfig> = OnceLock::new();

/// Process-wide configuration, loaded on first use
pub fn global_config() -> &'static OboeConfig {
    GLOBAL_CONFIG.get_or_init(|| {
        let mut config = load_config(&default_config_path());
        config.apply_env();
        config
    })
}
