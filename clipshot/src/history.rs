//! History - the service façade
//!
//! Owns the store, the enrichment pipeline, both monitors and the capture
//! consumer, and implements `HistoryApi` for the presentation layer.
//! Clipboard, text recognizer and metadata fetcher are passed in as explicit
//! handles; `History::from_settings` wires the system implementations.

use crate::clipboard::{ClipboardBackend, MemoryClipboard, SystemClipboard};
use crate::clipboard_monitor::ClipboardMonitor;
use crate::config::Settings;
use crate::enrichment::EnrichmentPipeline;
use crate::folder::FolderBookmark;
use crate::interface::{ClipShotError, ClipShotResult, HistoryApi, Item, ItemId, ItemQuery};
use crate::link_metadata::{HttpMetadataFetcher, MetadataFetcher};
use crate::ocr::{TesseractRecognizer, TextRecognizer};
use crate::pipeline::{channel, CaptureEvent, CapturePipeline};
use crate::screenshot_monitor::ScreenshotMonitor;
use crate::store::ItemStore;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// External collaborators the capture path talks to
pub struct CaptureHandles {
    pub clipboard: Arc<dyn ClipboardBackend>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub fetcher: Arc<dyn MetadataFetcher>,
}

struct Consumer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct History {
    settings: Mutex<Settings>,
    store: Arc<ItemStore>,
    enrichment: Arc<EnrichmentPipeline>,
    capture: Arc<CapturePipeline>,
    clipboard_monitor: ClipboardMonitor,
    screenshot_monitor: ScreenshotMonitor,
    pending_events: Mutex<Option<mpsc::Receiver<CaptureEvent>>>,
    consumer: Mutex<Option<Consumer>>,
}

impl History {
    pub fn new(settings: Settings, store: Arc<ItemStore>, handles: CaptureHandles) -> Self {
        let enrichment = Arc::new(EnrichmentPipeline::new(
            Arc::clone(&store),
            handles.recognizer,
            handles.fetcher,
        ));
        enrichment.set_fetch_favicons(settings.fetch_favicons);
        enrichment.set_enable_ocr(settings.enable_ocr);

        let capture = Arc::new(CapturePipeline::new(Arc::clone(&store), Arc::clone(&enrichment)));
        let (tx, rx) = channel();
        let clipboard_monitor = ClipboardMonitor::new(handles.clipboard, tx.clone(), settings.poll_interval());
        let screenshot_monitor = ScreenshotMonitor::new(
            Arc::clone(&store),
            tx,
            settings.screenshot_folder_bookmark.clone(),
        );

        Self {
            settings: Mutex::new(settings),
            store,
            enrichment,
            capture,
            clipboard_monitor,
            screenshot_monitor,
            pending_events: Mutex::new(Some(rx)),
            consumer: Mutex::new(None),
        }
    }

    /// Open the configured database and wire the system clipboard, tesseract and HTTP fetcher
    pub fn from_settings(settings: Settings) -> ClipShotResult<Self> {
        let store = Arc::new(ItemStore::open(settings.resolved_database_path())?);

        let clipboard: Arc<dyn ClipboardBackend> = match SystemClipboard::new() {
            Ok(clipboard) => Arc::new(clipboard),
            Err(e) => {
                warn!(error = %e, "System clipboard unavailable, using in-memory clipboard");
                Arc::new(MemoryClipboard::new())
            }
        };
        // enableOCR gates the enrichment step, so it can be switched on later
        let recognizer: Arc<dyn TextRecognizer> =
            Arc::new(TesseractRecognizer::new(settings.ocr_language.clone()));
        let fetcher: Arc<dyn MetadataFetcher> = Arc::new(HttpMetadataFetcher::new()?);

        Ok(Self::new(
            settings,
            store,
            CaptureHandles {
                clipboard,
                recognizer,
                fetcher,
            },
        ))
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.store
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    pub fn clipboard_monitor(&self) -> &ClipboardMonitor {
        &self.clipboard_monitor
    }

    pub fn screenshot_monitor(&self) -> &ScreenshotMonitor {
        &self.screenshot_monitor
    }

    /// Run one event through the capture pipeline directly
    pub fn capture(&self, event: CaptureEvent) -> ClipShotResult<Option<Item>> {
        self.capture.handle(event)
    }

    /// Wait until every scheduled enrichment step has finished
    pub async fn drain_enrichment(&self) {
        self.enrichment.drain().await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Start the capture consumer and whichever monitors the settings enable
    pub fn start(&self) -> ClipShotResult<()> {
        self.start_consumer()?;

        let settings = self.settings();
        if settings.auto_start_clipboard_monitoring {
            self.clipboard_monitor.start()?;
        }
        if settings.auto_start_screenshot_monitoring {
            if let Err(e) = self.screenshot_monitor.start() {
                // Folder may come back later; clipboard capture keeps running
                warn!(error = %e, "Screenshot monitoring not started");
            }
        }
        Ok(())
    }

    fn start_consumer(&self) -> ClipShotResult<()> {
        let mut consumer = self.consumer.lock();
        if consumer.is_some() {
            return Ok(());
        }
        let Some(rx) = self.pending_events.lock().take() else {
            return Err(ClipShotError::InvalidInput("capture consumer already shut down".to_string()));
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClipShotError::InvalidInput(format!("history needs a tokio runtime: {}", e)))?;
        let cancel = CancellationToken::new();
        let capture = Arc::clone(&self.capture);
        let token = cancel.clone();
        let handle = runtime.spawn(async move { capture.run(rx, token).await });
        *consumer = Some(Consumer { cancel, handle });
        Ok(())
    }

    /// Stop both monitors and the consumer, then wait for in-flight enrichment
    pub async fn shutdown(&self) {
        self.clipboard_monitor.stop().await;
        self.screenshot_monitor.stop().await;

        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            consumer.cancel.cancel();
            if let Err(e) = consumer.handle.await {
                warn!(error = %e, "Capture consumer ended abnormally");
            }
        }

        self.enrichment.drain().await;
        info!("History shut down");
    }

    /// Apply changed settings: enrichment gates and the watched folder
    pub async fn apply_settings(&self, settings: Settings) -> ClipShotResult<()> {
        self.enrichment.set_fetch_favicons(settings.fetch_favicons);
        self.enrichment.set_enable_ocr(settings.enable_ocr);

        let folder_changed = {
            let current = self.settings.lock();
            current.screenshot_folder_bookmark != settings.screenshot_folder_bookmark
        };
        let bookmark = settings.screenshot_folder_bookmark.clone();
        *self.settings.lock() = settings;

        if folder_changed {
            self.set_screenshot_folder(bookmark).await?;
        }
        Ok(())
    }

    pub async fn set_screenshot_folder(&self, bookmark: Option<FolderBookmark>) -> ClipShotResult<()> {
        self.screenshot_monitor.set_folder(bookmark).await
    }
}

impl HistoryApi for History {
    fn items(&self, query: &ItemQuery) -> ClipShotResult<Vec<Item>> {
        self.store.query(query)
    }

    fn toggle_favorite(&self, id: ItemId) -> ClipShotResult<bool> {
        self.store.toggle_favorite(id)
    }

    fn delete(&self, id: ItemId) -> ClipShotResult<()> {
        if self.store.delete(id)? {
            Ok(())
        } else {
            Err(ClipShotError::NotFound(id))
        }
    }

    fn clear_all(&self) -> ClipShotResult<()> {
        self.store.clear_all()?;
        info!("History cleared");
        Ok(())
    }

    fn copy_to_clipboard(&self, text: &str) -> ClipShotResult<()> {
        self.clipboard_monitor.copy_to_clipboard(text)
    }

    fn copy_image_to_clipboard(&self, bytes: &[u8]) -> ClipShotResult<()> {
        self.clipboard_monitor.copy_image_to_clipboard(bytes)
    }

    fn open_url(&self, url: &str) -> ClipShotResult<()> {
        url::Url::parse(url).map_err(|e| ClipShotError::InvalidInput(format!("{}: {}", url, e)))?;
        open::that(url).map_err(|e| ClipShotError::TransientIo(format!("cannot open {}: {}", url, e)))
    }

    fn open_file(&self, path: &Path) -> ClipShotResult<()> {
        if !path.exists() {
            return Err(ClipShotError::InvalidInput(format!("no such file: {}", path.display())));
        }
        open::that(path).map_err(|e| ClipShotError::TransientIo(format!("cannot open {}: {}", path.display(), e)))
    }
}
