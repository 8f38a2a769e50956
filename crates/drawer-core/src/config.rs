use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DRAWER_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawerConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// How the engine decides the host document drifted from its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// Element count and sorted identity set only.
    #[default]
    Identity,
    /// Identity plus a digest of the element payload.
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_reload_delay_ms")]
    pub reload_delay_ms: u64,
    #[serde(default)]
    pub change_detection: ChangeDetection,
    /// Stamp each sync with the selection current when its debounce window
    /// opened.
    #[serde(default = "default_true")]
    pub capture_origin: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            reload_delay_ms: default_reload_delay_ms(),
            change_detection: ChangeDetection::default(),
            capture_origin: default_true(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub const fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_elements_key")]
    pub elements_key: String,
    #[serde(default = "default_state_key")]
    pub state_key: String,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f64,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            elements_key: default_elements_key(),
            state_key: default_state_key(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file. Defaults to `<data_dir>/drawer/drawer.sqlite3`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolved database path, if one can be determined.
    #[must_use]
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| default_store_path(&dir)))
    }
}

/// Database location under a data directory.
#[must_use]
pub fn default_store_path(data_dir: &Path) -> PathBuf {
    data_dir.join("drawer").join("drawer.sqlite3")
}

/// Load configuration from an explicit path, `$DRAWER_CONFIG`, or the user
/// config directory, in that order. A missing file yields defaults; an
/// explicitly named file must exist.
///
/// # Errors
///
/// Returns an error if the chosen file cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<DrawerConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    if let Some(path) = env::var_os(CONFIG_ENV) {
        return load_config_file(Path::new(&path));
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(DrawerConfig::default());
    };

    let path = config_dir.join("drawer/config.toml");
    if !path.exists() {
        return Ok(DrawerConfig::default());
    }

    load_config_file(&path)
}

/// # Errors
///
/// Returns an error if `path` cannot be read or is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<DrawerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<DrawerConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_debounce_ms() -> u64 {
    1_000
}

const fn default_reload_delay_ms() -> u64 {
    100
}

fn default_elements_key() -> String {
    "excalidraw".to_string()
}

fn default_state_key() -> String {
    "excalidraw-state".to_string()
}

const fn default_viewport_width() -> f64 {
    1920.0
}

const fn default_viewport_height() -> f64 {
    1080.0
}
