//! Configuration resolution for phonelink.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (e.g. ~/.config/phonelink/settings.json)
//! 3. Project config (.phonelink/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete phonelink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Supervised process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Executable to spawn. It is always started with an empty argument list.
    pub binary: PathBuf,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./build/bitlite"),
        }
    }
}

impl ProcessConfig {
    /// Short name used to prefix the process's output on the terminal.
    pub fn display_name(&self) -> String {
        self.binary
            .file_name()
            .map_or_else(|| "process".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Endpoint discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Ceiling for text held back while waiting for a complete token.
    pub max_pending_bytes: usize,
    /// Give up on discovery after this many seconds. Zero waits forever.
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: 64 * 1024,
            timeout_secs: 120,
        }
    }
}

impl DiscoveryConfig {
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

/// Remote link configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LinkConfig {
    /// URL scheme of the remote link.
    pub scheme: String,
    /// Seconds to wait for the connection handshake.
    pub connect_timeout_secs: u64,
    /// Message sent as soon as the link opens.
    pub greeting: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scheme: "ws".to_string(),
            connect_timeout_secs: 10,
            greeting: "Hello from the laptop!".to_string(),
        }
    }
}

impl LinkConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    load_config_from(
        global_config_path().as_deref(),
        project_dir,
        |key| std::env::var(key).ok(),
    )
}

/// Load configuration from explicit sources.
///
/// Missing files are skipped; files that exist but fail to parse are errors.
pub fn load_config_from(
    global_path: Option<&Path>,
    project_dir: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(path) = global_path {
        if path.exists() {
            merge_values(&mut merged, load_config_file(path)?);
        }
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".phonelink").join("settings.json");
        if project_path.exists() {
            merge_values(&mut merged, load_config_file(&project_path)?);
        }
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
    apply_env_overrides(&mut config, env);
    Ok(config)
}

/// Get the global config file path (platform config dir + `phonelink/settings.json`).
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("phonelink").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively overlay `overlay` onto `base`. Objects merge key by key,
/// anything else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(val) = env("PHONELINK_PROCESS_BIN") {
        config.process.binary = PathBuf::from(val);
    }
    if let Some(val) = env("PHONELINK_MAX_PENDING_BYTES") {
        if let Ok(n) = val.parse() {
            config.discovery.max_pending_bytes = n;
        }
    }
    if let Some(val) = env("PHONELINK_DISCOVERY_TIMEOUT") {
        if let Ok(n) = val.parse() {
            config.discovery.timeout_secs = n;
        }
    }
    if let Some(val) = env("PHONELINK_CONNECT_TIMEOUT") {
        if let Ok(n) = val.parse() {
            config.link.connect_timeout_secs = n;
        }
    }
    if let Some(val) = env("PHONELINK_LOG_LEVEL") {
        config.log.level = val;
    }
    if let Some(val) = env("PHONELINK_LOG_JSON") {
        config.log.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
}
