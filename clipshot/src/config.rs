//! User settings, persisted as JSON

use crate::clipboard_monitor::DEFAULT_POLL_INTERVAL;
use crate::folder::FolderBookmark;
use crate::interface::{ClipShotError, ClipShotResult};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "clipshot";
const MIN_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_start_clipboard_monitoring: bool,
    pub auto_start_screenshot_monitoring: bool,
    pub fetch_favicons: bool,
    #[serde(rename = "enableOCR")]
    pub enable_ocr: bool,
    pub screenshot_folder_bookmark: Option<FolderBookmark>,
    pub poll_interval_ms: u64,
    /// Tesseract language code(s), e.g. "eng" or "eng+deu"
    pub ocr_language: String,
    pub database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_start_clipboard_monitoring: true,
            auto_start_screenshot_monitoring: true,
            fetch_favicons: true,
            enable_ocr: true,
            screenshot_folder_bookmark: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            ocr_language: "eng".to_string(),
            database_path: None,
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> ClipShotResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ClipShotError::Config(format!("cannot read {}: {}", path.display(), e)))
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| ClipShotError::Config(format!("invalid settings in {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> ClipShotResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClipShotError::Config(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ClipShotError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| ClipShotError::Config(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Configured database path, or the per-user default
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(default_database_path)
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("settings.json")
}

pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("history.sqlite")
}
