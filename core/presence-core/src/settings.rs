//! User preferences for presence reporting.
//!
//! Settings come from an optional `settings.toml` plus environment overrides.
//! A missing or malformed file falls back to defaults rather than failing.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Application id used when none (or an invalid one) is configured.
pub const DEFAULT_APP_ID: u64 = 1041018234058571847;

const APP_ID_MIN_DIGITS: usize = 17;
const APP_ID_MAX_DIGITS: usize = 20;

const CONFIG_DIR_NAME: &str = "media-presence";
const SETTINGS_FILE_NAME: &str = "settings.toml";
const ENABLED_ENV: &str = "MEDIA_PRESENCE_ENABLED";
const CLIENT_ID_ENV: &str = "MEDIA_PRESENCE_CLIENT_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub app_id: u64,
    pub enabled: bool,
    pub show_artist: bool,
    pub show_album: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID,
            enabled: true,
            show_artist: true,
            show_album: true,
        }
    }
}

impl Settings {
    /// Parses an application id, substituting [`DEFAULT_APP_ID`] unless the
    /// value is 17 to 20 decimal digits that fit in a `u64`.
    pub fn parse_app_id(raw: &str) -> u64 {
        let raw = raw.trim();
        let well_formed = (APP_ID_MIN_DIGITS..=APP_ID_MAX_DIGITS).contains(&raw.len())
            && raw.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return DEFAULT_APP_ID;
        }
        raw.parse().unwrap_or(DEFAULT_APP_ID)
    }
}

/// Source of settings for a session.
pub trait SettingsProvider {
    fn load_settings(&self) -> Settings;
}

impl SettingsProvider for Settings {
    fn load_settings(&self) -> Settings {
        *self
    }
}

/// On-disk schema. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    client_id: Option<String>,
    enabled: Option<bool>,
    show_artist: Option<bool>,
    show_album: Option<bool>,
}

/// Settings read from a TOML file with environment overrides applied.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: Option<PathBuf>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// `<config dir>/media-presence/settings.toml`, if a config dir exists.
    pub fn default_location() -> Self {
        Self {
            path: dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reads the file without falling back, so callers can surface errors.
    /// A missing file is not an error.
    pub fn try_load(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::default();
        if let Some(path) = &self.path {
            if let Some(file) = read_settings_file(path)? {
                apply_file(&mut settings, file);
            }
        }
        apply_env(&mut settings);
        Ok(settings)
    }
}

impl SettingsProvider for FileSettings {
    fn load_settings(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load settings; using defaults");
                let mut settings = Settings::default();
                apply_env(&mut settings);
                settings
            }
        }
    }
}

fn read_settings_file(path: &Path) -> Result<Option<SettingsFile>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };

    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

fn apply_file(settings: &mut Settings, file: SettingsFile) {
    if let Some(client_id) = file.client_id {
        settings.app_id = Settings::parse_app_id(&client_id);
    }
    if let Some(enabled) = file.enabled {
        settings.enabled = enabled;
    }
    if let Some(show_artist) = file.show_artist {
        settings.show_artist = show_artist;
    }
    if let Some(show_album) = file.show_album {
        settings.show_album = show_album;
    }
}

fn apply_env(settings: &mut Settings) {
    if let Ok(value) = env::var(ENABLED_ENV) {
        match value.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => settings.enabled = true,
            "0" | "false" | "FALSE" | "no" | "NO" => settings.enabled = false,
            other => tracing::warn!(value = other, "Ignoring unrecognized {}", ENABLED_ENV),
        }
    }
    if let Ok(value) = env::var(CLIENT_ID_ENV) {
        settings.app_id = Settings::parse_app_id(&value);
    }
}
