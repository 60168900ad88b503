use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE_NAME: &str = "settings.json";
const APP_DIR_NAME: &str = "panic-bell";

/// Environment variable overriding `server_url`.
pub const SERVER_URL_ENV: &str = "PANIC_BELL_SERVER_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Base URL of the announcement server (panic uploads, song and event storage).
    pub server_url: String,

    /// Timeout applied to every request sent to the server.
    pub request_timeout_secs: u64,

    /// Recordings are stopped automatically once they reach this length.
    pub max_recording_secs: u64,

    /// Size of waveform previews rendered by `preview`.
    pub waveform_width: u32,
    pub waveform_height: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
            max_recording_secs: 120,
            waveform_width: 800,
            waveform_height: 150,
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn max_recording(&self) -> Duration {
        Duration::from_secs(self.max_recording_secs.max(1))
    }

    /// Apply environment overrides on top of file settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                log::debug!("Settings: server_url overridden by {}", SERVER_URL_ENV);
                self.server_url = url.to_string();
            }
        }
        self
    }
}

pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings from the default location, falling back to defaults.
pub fn load_settings() -> AppSettings {
    let settings = match settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            AppSettings::default()
        }
    };
    settings.with_env_overrides()
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<PathBuf, String> {
    let path = settings_path()?;
    save_settings_to(&path, settings)?;
    Ok(path)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: write to a temp file in the same directory, then rename.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows rename fails if the destination exists
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("settings.json"));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.max_recording(), Duration::from_secs(120));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            server_url: "http://bell.local:8080".to_string(),
            max_recording_secs: 30,
            ..AppSettings::default()
        };

        save_settings_to(&path, &settings).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server_url": "http://example.test"}"#).unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.server_url, "http://example.test");
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_settings_from(&path), AppSettings::default());
    }
}
