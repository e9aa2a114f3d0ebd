//! Configuration vault – reads/writes `~/.patrol/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use patrol_hal::SimNavigator;
use patrol_runtime::PatrolConfig;
use patrol_types::PatrolError;
use serde::{Deserialize, Serialize};

/// Persisted operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name shown in log spans.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Observation tick while investigating, in milliseconds.
    #[serde(default = "default_observation_ms")]
    pub observation_ms: u64,

    /// Per-topic event bus buffer.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Coordinate frame used for poses typed at the prompt.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Simulated travel speed in metres per second.
    #[serde(default = "default_sim_speed")]
    pub sim_speed: f64,

    /// Reachable area of the simulator as `[min_x, min_y, max_x, max_y]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<[f64; 4]>,
}

fn default_agent_name() -> String {
    "patrol".to_string()
}
fn default_observation_ms() -> u64 {
    500
}
fn default_bus_capacity() -> usize {
    patrol_middleware::bus::DEFAULT_CAPACITY
}
fn default_frame_id() -> String {
    "map".to_string()
}
fn default_sim_speed() -> f64 {
    0.5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            observation_ms: default_observation_ms(),
            bus_capacity: default_bus_capacity(),
            frame_id: default_frame_id(),
            sim_speed: default_sim_speed(),
            workspace: None,
        }
    }
}

impl Config {
    pub fn runtime(&self) -> PatrolConfig {
        PatrolConfig {
            agent_name: self.agent_name.clone(),
            observation_period: Duration::from_millis(self.observation_ms),
            bus_capacity: self.bus_capacity,
        }
    }

    pub fn navigator(&self) -> SimNavigator {
        let nav = SimNavigator::new(self.sim_speed);
        match self.workspace {
            Some([min_x, min_y, max_x, max_y]) => nav.with_workspace((min_x, min_y), (max_x, max_y)),
            None => nav,
        }
    }
}

/// Return the path to `~/.patrol/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".patrol").join("config.toml")
}

/// Load the config from disk with `PATROL_*` overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, PatrolError> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, PatrolError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| PatrolError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| PatrolError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `PATROL_*` environment overrides.  Unparseable or non-positive
/// values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `PATROL_AGENT_NAME` | `agent_name` |
/// | `PATROL_OBSERVATION_MS` | `observation_ms` |
/// | `PATROL_SIM_SPEED` | `sim_speed` |
/// | `PATROL_BUS_CAPACITY` | `bus_capacity` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PATROL_AGENT_NAME") {
        cfg.agent_name = v;
    }
    if let Ok(v) = std::env::var("PATROL_OBSERVATION_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.observation_ms = ms;
    }
    if let Ok(v) = std::env::var("PATROL_SIM_SPEED")
        && let Ok(speed) = v.parse::<f64>()
        && speed.is_finite()
        && speed > 0.0
    {
        cfg.sim_speed = speed;
    }
    if let Ok(v) = std::env::var("PATROL_BUS_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
        && capacity > 0
    {
        cfg.bus_capacity = capacity;
    }
}

/// Save the config, creating `~/.patrol/` if necessary.
pub fn save(cfg: &Config) -> Result<(), PatrolError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), PatrolError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PatrolError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                PatrolError::Config(format!("failed to restrict config directory: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| PatrolError::Serialization(format!("failed to serialize config: {e}")))?;
    let write_err = |e: std::io::Error| PatrolError::Config(format!("failed to write {}: {e}", path.display()));

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
