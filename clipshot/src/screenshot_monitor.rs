//! Screenshot folder monitor
//!
//! Watches one directory with `notify`. Every change signal triggers a full
//! rescan that emits a `CaptureEvent::Screenshot` for each matching file the
//! store does not already hold, in listing order.

use crate::folder::{resolve_screenshot_folder, FolderAccess, FolderBookmark};
use crate::interface::{ClipShotError, ClipShotResult};
use crate::pipeline::CaptureEvent;
use crate::store::ItemStore;
use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SCREENSHOT_PREFIX: &str = "screenshot";
const SCREENSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Name starts with "screenshot" and ends in png/jpg/jpeg, ignoring case
pub fn is_screenshot_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    if !lower.starts_with(SCREENSHOT_PREFIX) {
        return false;
    }
    Path::new(&lower)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCREENSHOT_EXTENSIONS.contains(&ext))
}

struct RunningWatch {
    folder: PathBuf,
    watcher: RecommendedWatcher,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    access: FolderAccess,
}

pub struct ScreenshotMonitor {
    store: Arc<ItemStore>,
    events: mpsc::Sender<CaptureEvent>,
    bookmark: Mutex<Option<FolderBookmark>>,
    running: Mutex<Option<RunningWatch>>,
}

impl ScreenshotMonitor {
    pub fn new(
        store: Arc<ItemStore>,
        events: mpsc::Sender<CaptureEvent>,
        bookmark: Option<FolderBookmark>,
    ) -> Self {
        Self {
            store,
            events,
            bookmark: Mutex::new(bookmark),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Folder currently being watched
    pub fn current_folder(&self) -> Option<PathBuf> {
        self.running.lock().as_ref().map(|watch| watch.folder.clone())
    }

    /// Resolve the folder, scan it, then watch it. No-op when already running.
    pub fn start(&self) -> ClipShotResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClipShotError::InvalidInput(format!("screenshot monitor needs a tokio runtime: {}", e)))?;

        let folder = resolve_screenshot_folder(self.bookmark.lock().as_ref());
        let access = FolderBookmark::new(&folder).acquire()?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Any
                ) {
                    let _ = signal_tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "Screenshot watcher error"),
        })
        .map_err(|e| ClipShotError::TransientIo(format!("failed to create watcher: {}", e)))?;
        watcher
            .watch(access.path(), RecursiveMode::NonRecursive)
            .map_err(|e| ClipShotError::TransientIo(format!("failed to watch {}: {}", folder.display(), e)))?;

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(scan_loop(
            folder.clone(),
            Arc::clone(&self.store),
            self.events.clone(),
            signal_rx,
            cancel.clone(),
        ));

        info!(folder = %folder.display(), "Screenshot monitor started");
        *running = Some(RunningWatch {
            folder,
            watcher,
            cancel,
            handle,
            access,
        });
        Ok(())
    }

    /// Release the watcher, stop scanning and release folder access. Idempotent.
    pub async fn stop(&self) {
        let Some(watch) = self.running.lock().take() else {
            return;
        };
        let RunningWatch {
            folder,
            watcher,
            cancel,
            handle,
            access,
        } = watch;

        drop(watcher);
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Screenshot scan task ended abnormally");
        }
        drop(access);
        info!(folder = %folder.display(), "Screenshot monitor stopped");
    }

    /// Switch to another folder; restarts the watch if it was running
    pub async fn set_folder(&self, bookmark: Option<FolderBookmark>) -> ClipShotResult<()> {
        let was_running = self.is_running();
        self.stop().await;
        *self.bookmark.lock() = bookmark;
        if was_running {
            self.start()?;
        }
        Ok(())
    }
}

async fn scan_loop(
    folder: PathBuf,
    store: Arc<ItemStore>,
    events: mpsc::Sender<CaptureEvent>,
    mut signals: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = scan(&folder, &store, &events) => {
                if let Err(e) = result {
                    warn!(folder = %folder.display(), error = %e, "Screenshot scan failed, retrying on next change");
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = signals.recv() => {
                if signal.is_none() {
                    break;
                }
                // Coalesce bursts into one rescan
                while signals.try_recv().is_ok() {}
            }
        }
    }
}

/// Emit events for every screenshot in the folder that is not yet stored
async fn scan(folder: &Path, store: &ItemStore, events: &mpsc::Sender<CaptureEvent>) -> ClipShotResult<usize> {
    let entries = std::fs::read_dir(folder)
        .map_err(|e| ClipShotError::TransientIo(format!("cannot list {}: {}", folder.display(), e)))?;

    let mut emitted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_screenshot_file(name) || !path.is_file() {
            continue;
        }
        if store.contains_screenshot(name)? {
            continue;
        }
        debug!(file = %name, "New screenshot found");
        events
            .send(CaptureEvent::Screenshot(path.clone()))
            .await
            .map_err(|_| ClipShotError::TransientIo("capture channel closed".to_string()))?;
        emitted += 1;
    }
    Ok(emitted)
}
