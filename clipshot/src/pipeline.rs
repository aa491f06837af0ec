//! Capture pipeline - the single consumer of capture events
//!
//! Both monitors push `CaptureEvent`s into one bounded channel. Each event is
//! classified, checked against recent history, persisted, and handed to the
//! enrichment pipeline. A failing event is logged and never stops the loop.

use crate::content_detection::detect_content;
use crate::dedup::Deduplicator;
use crate::enrichment::EnrichmentPipeline;
use crate::interface::{ClipShotError, ClipShotResult, Item, ItemContent};
use crate::screenshot_monitor::is_screenshot_file;
use crate::store::ItemStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    ClipboardText(String),
    /// PNG-encoded clipboard image
    ClipboardImage(Vec<u8>),
    Screenshot(PathBuf),
}

pub fn channel() -> (mpsc::Sender<CaptureEvent>, mpsc::Receiver<CaptureEvent>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

pub struct CapturePipeline {
    store: Arc<ItemStore>,
    dedup: Deduplicator,
    enrichment: Arc<EnrichmentPipeline>,
}

impl CapturePipeline {
    pub fn new(store: Arc<ItemStore>, enrichment: Arc<EnrichmentPipeline>) -> Self {
        Self {
            dedup: Deduplicator::new(Arc::clone(&store)),
            store,
            enrichment,
        }
    }

    /// Turn an event into a candidate, or None if it carries nothing to keep
    fn candidate(event: CaptureEvent) -> ClipShotResult<Option<ItemContent>> {
        match event {
            CaptureEvent::ClipboardText(text) => {
                if text.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(detect_content(&text)))
            }
            CaptureEvent::ClipboardImage(data) => {
                if data.is_empty() {
                    return Ok(None);
                }
                Ok(Some(ItemContent::Image { data, thumbnail: None }))
            }
            CaptureEvent::Screenshot(path) => {
                let file_name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| {
                        ClipShotError::InvalidInput(format!("unusable screenshot path: {}", path.display()))
                    })?
                    .to_string();
                if !is_screenshot_file(&file_name) {
                    return Ok(None);
                }
                Ok(Some(ItemContent::Screenshot {
                    file_path: path.to_string_lossy().into_owned(),
                    file_name,
                    ocr_text: None,
                    thumbnail: None,
                }))
            }
        }
    }

    /// Classify, dedup, persist and schedule enrichment for one event.
    /// Returns the stored item, or None when the event was dropped or suppressed.
    pub fn handle(&self, event: CaptureEvent) -> ClipShotResult<Option<Item>> {
        let Some(candidate) = Self::candidate(event)? else {
            return Ok(None);
        };

        if self.dedup.is_duplicate(&candidate)? {
            debug!(kind = %candidate.kind(), "Suppressed duplicate capture");
            return Ok(None);
        }

        let item = self.store.insert(candidate)?;
        info!(item_id = item.id, kind = %item.kind(), "Captured item");
        self.enrichment.enqueue(&item);
        Ok(Some(item))
    }

    /// Consume events until the channel closes or `cancel` fires.
    /// Each event is handled on the blocking pool (image decoding, SQLite).
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<CaptureEvent>, cancel: CancellationToken) {
        info!("Capture pipeline started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let pipeline = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || pipeline.handle(event)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "Failed to capture item"),
                        Err(e) => warn!(error = %e, "Capture task panicked"),
                    }
                }
            }
        }
        info!("Capture pipeline stopped");
    }
}
