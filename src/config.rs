//! Application paths, persisted settings, and proxy base resolution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "fbcheck";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const SETTINGS_FILE: &str = "settings.json";

/// Get the application data directory (`~/.fbcheck/`).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".fbcheck")
}

pub fn settings_path() -> PathBuf {
    app_data_dir().join(SETTINGS_FILE)
}

pub fn default_log_filter() -> &'static str {
    "fbcheck=info"
}

/// Persisted user settings. Only the display language survives between
/// runs; results never do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Selected display language code, under its fixed key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Missing or unreadable settings fall back to defaults; settings are a
/// convenience, never an error source.
pub fn load_settings_from(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
        Err(_) => Settings::default(),
    }
}

pub fn save_settings(settings: &Settings) -> io::Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(io::Error::other)?;
    fs::write(path, json)
}

/// Resolve the proxy base URL from the CLI flag, then the environment.
/// Empty values count as absent; the CLI treats a final `None` as a
/// configuration error, since a terminal has no same-origin to fall back
/// to.
pub fn resolve_proxy_base(flag: Option<&str>, env_value: Option<&str>) -> Option<String> {
    flag.or(env_value)
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
}
