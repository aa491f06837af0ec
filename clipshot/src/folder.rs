//! Screenshot folder resolution and scoped access

use crate::interface::{ClipShotError, ClipShotResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A user-chosen folder, persisted in settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderBookmark {
    pub path: PathBuf,
}

impl FolderBookmark {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Begin accessing the folder. Access lasts until the guard is dropped.
    pub fn acquire(&self) -> ClipShotResult<FolderAccess> {
        if !self.path.is_dir() {
            return Err(ClipShotError::TransientIo(format!(
                "screenshot folder is not accessible: {}",
                self.path.display()
            )));
        }
        debug!(path = %self.path.display(), "Acquired folder access");
        Ok(FolderAccess {
            path: self.path.clone(),
        })
    }
}

/// Held for the lifetime of a watch; dropping it releases the folder
#[derive(Debug)]
pub struct FolderAccess {
    path: PathBuf,
}

impl FolderAccess {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FolderAccess {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Released folder access");
    }
}

/// Where to watch: the bookmark if usable, else the OS screenshot location,
/// else the desktop, else the home directory.
pub fn resolve_screenshot_folder(bookmark: Option<&FolderBookmark>) -> PathBuf {
    if let Some(bookmark) = bookmark {
        if bookmark.path.is_dir() {
            return bookmark.path.clone();
        }
        debug!(path = %bookmark.path.display(), "Bookmarked folder unavailable, falling back");
    }

    system_screenshot_location()
        .filter(|path| path.is_dir())
        .or_else(|| dirs::desktop_dir().filter(|path| path.is_dir()))
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// The folder the OS saves screenshots to, when configured
#[cfg(target_os = "macos")]
fn system_screenshot_location() -> Option<PathBuf> {
    let output = std::process::Command::new("defaults")
        .args(["read", "com.apple.screencapture", "location"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
    expand_home(&raw)
}

#[cfg(not(target_os = "macos"))]
fn system_screenshot_location() -> Option<PathBuf> {
    None
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn expand_home(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None if raw == "~" => dirs::home_dir(),
        None => Some(PathBuf::from(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_wins_when_usable() {
        let dir = tempfile::tempdir().unwrap();
        let bookmark = FolderBookmark::new(dir.path());
        assert_eq!(resolve_screenshot_folder(Some(&bookmark)), dir.path());
    }

    #[test]
    fn test_missing_bookmark_falls_back() {
        let bookmark = FolderBookmark::new("/definitely/not/here");
        let resolved = resolve_screenshot_folder(Some(&bookmark));
        assert_ne!(resolved, PathBuf::from("/definitely/not/here"));
        assert_eq!(resolved, resolve_screenshot_folder(None));
    }

    #[test]
    fn test_acquire_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let access = FolderBookmark::new(dir.path()).acquire().unwrap();
        assert_eq!(access.path(), dir.path());

        let err = FolderBookmark::new(dir.path().join("missing")).acquire().unwrap_err();
        assert!(matches!(err, ClipShotError::TransientIo(_)));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(""), None);
        assert_eq!(expand_home("/Volumes/Shots"), Some(PathBuf::from("/Volumes/Shots")));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/Pictures"), Some(home.join("Pictures")));
        }
    }
}
