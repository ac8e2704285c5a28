use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use wiggum::domain::WorkMode;
use wiggum::notification::default_events;
use wiggum::process::{DEFAULT_BINARY, DEFAULT_ZOMBIE_TIMEOUT, KILL_BUFFER};
use wiggum::runner::{DEFAULT_DELAY, DEFAULT_SHUTDOWN_GRACE};
use wiggum::status::DEFAULT_DEBOUNCE;
use wiggum::workspace::{DEFAULT_MAX_ITERATIONS, DEFAULT_STAGNATION_THRESHOLD, InitOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub agent: AgentConfig,
    pub engine: EngineDefaults,
    pub watcher: WatcherSettings,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub binary: String,
    /// Passed before the per-mode arguments
    pub extra_args: Vec<String>,
    pub zombie_timeout_secs: u64,
    /// How long to wait for the exit event after SIGKILL
    pub kill_buffer_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            extra_args: Vec::new(),
            zombie_timeout_secs: DEFAULT_ZOMBIE_TIMEOUT.as_secs(),
            kill_buffer_ms: KILL_BUFFER.as_millis() as u64,
        }
    }
}

impl AgentConfig {
    pub fn zombie_timeout(&self) -> Duration {
        Duration::from_secs(self.zombie_timeout_secs)
    }

    pub fn kill_buffer(&self) -> Duration {
        Duration::from_millis(self.kill_buffer_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineDefaults {
    pub max_iterations: u32,
    pub delay_ms: u64,
    pub stagnation_threshold: u32,
    pub shutdown_grace_ms: u64,
    /// Show tool activity while the agent runs
    pub stream_output: bool,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            delay_ms: DEFAULT_DELAY.as_millis() as u64,
            stagnation_threshold: DEFAULT_STAGNATION_THRESHOLD,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            stream_output: false,
        }
    }
}

impl EngineDefaults {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    pub debounce_ms: u64,
    pub notify_only_meaningful: bool,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            notify_only_meaningful: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Target URL; workspace metadata can override it
    pub url: Option<String>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub events: Vec<String>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            url: None,
            priority: None,
            tags: vec!["robot".to_string()],
            events: default_events(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            agent: AgentConfig::default(),
            engine: EngineDefaults::default(),
            watcher: WatcherSettings::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl Config {
    /// Options for a new workspace, seeded from the engine defaults.
    /// A `--max-iterations` given on the command line wins.
    pub fn init_options(&self, task: &str, mode: WorkMode, max_iterations: Option<u32>) -> InitOptions {
        let mut options = InitOptions::new(task, mode);
        options.max_iterations = Some(max_iterations.unwrap_or(self.engine.max_iterations));
        options.stagnation_threshold = Some(self.engine.stagnation_threshold);
        options
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
