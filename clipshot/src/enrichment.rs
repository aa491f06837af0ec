//! Enrichment pipeline - background augmentation of stored items
//!
//! Each step runs as its own fire-and-forget task and writes back a
//! field-level `EnrichmentPatch`, so steps on the same item may finish in any
//! order without overwriting one another. Image decoding and OCR run on the
//! blocking pool. An item deleted while a step is in flight is left deleted.

use crate::imaging::{self, THUMBNAIL_SIZE};
use crate::interface::{ClipShotError, EnrichmentPatch, Item, ItemContent, ItemId};
use crate::link_metadata::MetadataFetcher;
use crate::ocr::TextRecognizer;
use crate::store::ItemStore;
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Global fallback Tokio runtime for when items are enqueued outside any runtime context.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

pub struct EnrichmentPipeline {
    store: Arc<ItemStore>,
    recognizer: Arc<dyn TextRecognizer>,
    fetcher: Arc<dyn MetadataFetcher>,
    fetch_favicons: AtomicBool,
    enable_ocr: AtomicBool,
    tracker: TaskTracker,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<ItemStore>,
        recognizer: Arc<dyn TextRecognizer>,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> Self {
        Self {
            store,
            recognizer,
            fetcher,
            fetch_favicons: AtomicBool::new(true),
            enable_ocr: AtomicBool::new(true),
            tracker: TaskTracker::new(),
        }
    }

    pub fn set_fetch_favicons(&self, enabled: bool) {
        self.fetch_favicons.store(enabled, Ordering::Relaxed);
    }

    pub fn set_enable_ocr(&self, enabled: bool) {
        self.enable_ocr.store(enabled, Ordering::Relaxed);
    }

    /// Number of enrichment tasks still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    fn runtime_handle() -> tokio::runtime::Handle {
        tokio::runtime::Handle::try_current()
            .unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
    }

    /// Start every enrichment step that applies to the item's kind. Returns immediately.
    pub fn enqueue(&self, item: &Item) {
        let handle = Self::runtime_handle();
        let id = item.id;

        match &item.content {
            ItemContent::Screenshot { file_path, .. } => {
                let path = PathBuf::from(file_path);

                let store = Arc::clone(&self.store);
                let thumb_path = path.clone();
                self.tracker.spawn_on(
                    async move {
                        let thumbnail = tokio::task::spawn_blocking(move || {
                            imaging::thumbnail_from_file(&thumb_path, THUMBNAIL_SIZE)
                        })
                        .await
                        .ok()
                        .flatten();
                        match thumbnail {
                            Some(thumbnail) => {
                                let patch = EnrichmentPatch {
                                    thumbnail: Some(thumbnail),
                                    ..Default::default()
                                };
                                apply(store, id, patch, "thumbnail").await;
                            }
                            None => warn!(item_id = id, "Could not build screenshot thumbnail"),
                        }
                    },
                    &handle,
                );

                if self.enable_ocr.load(Ordering::Relaxed) {
                    let store = Arc::clone(&self.store);
                    let recognizer = Arc::clone(&self.recognizer);
                    self.tracker.spawn_on(
                        async move {
                            let result =
                                tokio::task::spawn_blocking(move || recognizer.recognize(&path)).await;
                            match result {
                                Ok(Ok(text)) if !text.trim().is_empty() => {
                                    let patch = EnrichmentPatch {
                                        ocr_text: Some(text),
                                        ..Default::default()
                                    };
                                    apply(store, id, patch, "ocr").await;
                                }
                                Ok(Ok(_)) => debug!(item_id = id, "No text recognized"),
                                Ok(Err(e)) => warn!(item_id = id, error = %e, "Text recognition failed"),
                                Err(e) => warn!(item_id = id, error = %e, "Text recognition task panicked"),
                            }
                        },
                        &handle,
                    );
                }
            }
            ItemContent::Image { data, .. } => {
                let store = Arc::clone(&self.store);
                let data = data.clone();
                self.tracker.spawn_on(
                    async move {
                        let thumbnail = tokio::task::spawn_blocking(move || {
                            imaging::generate_thumbnail(&data, THUMBNAIL_SIZE)
                        })
                        .await
                        .ok()
                        .flatten();
                        match thumbnail {
                            Some(thumbnail) => {
                                let patch = EnrichmentPatch {
                                    thumbnail: Some(thumbnail),
                                    ..Default::default()
                                };
                                apply(store, id, patch, "thumbnail").await;
                            }
                            None => warn!(item_id = id, "Could not decode clipboard image"),
                        }
                    },
                    &handle,
                );
            }
            ItemContent::Url { url, .. } => {
                if !self.fetch_favicons.load(Ordering::Relaxed) {
                    return;
                }
                let store = Arc::clone(&self.store);
                let fetcher = Arc::clone(&self.fetcher);
                let url = url.clone();
                self.tracker.spawn_on(
                    async move {
                        match fetcher.fetch(&url).await {
                            Ok(meta) => {
                                let patch = EnrichmentPatch {
                                    title: meta.title,
                                    favicon_url: meta.favicon_url,
                                    ..Default::default()
                                };
                                apply(store, id, patch, "link metadata").await;
                            }
                            Err(e) => debug!(item_id = id, url = %url, error = %e, "Link metadata unavailable"),
                        }
                    },
                    &handle,
                );
            }
            ItemContent::Text { .. } | ItemContent::Code { .. } => {}
        }
    }

    /// Wait for every in-flight task, then accept new work again
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn apply(store: Arc<ItemStore>, id: ItemId, patch: EnrichmentPatch, step: &'static str) {
    let result = tokio::task::spawn_blocking(move || store.apply_enrichment(id, &patch)).await;
    match result {
        Ok(Ok(())) => debug!(item_id = id, step, "Enrichment applied"),
        Ok(Err(ClipShotError::NotFound(_))) => {
            debug!(item_id = id, step, "Item deleted before enrichment finished")
        }
        Ok(Err(e)) => warn!(item_id = id, step, error = %e, "Failed to store enrichment"),
        Err(e) => warn!(item_id = id, step, error = %e, "Enrichment write task panicked"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::interface::{ClipShotError, ClipShotResult};
    use crate::link_metadata::{LinkMetadata, MetadataFetcher};
    use crate::ocr::TextRecognizer;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;
    use tokio::sync::Notify;

    pub struct FixedRecognizer(pub &'static str);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&self, _image_path: &Path) -> ClipShotResult<String> {
            Ok(self.0.to_string())
        }
    }

    /// Returns fixed metadata, optionally after `release` is notified
    pub struct FixedFetcher {
        pub meta: LinkMetadata,
        pub release: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl MetadataFetcher for FixedFetcher {
        async fn fetch(&self, _url: &str) -> ClipShotResult<LinkMetadata> {
            if let Some(release) = &self.release {
                release.notified().await;
            }
            Ok(self.meta.clone())
        }
    }

    pub struct OfflineFetcher;

    #[async_trait]
    impl MetadataFetcher for OfflineFetcher {
        async fn fetch(&self, _url: &str) -> ClipShotResult<LinkMetadata> {
            Err(ClipShotError::Network("offline".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::imaging::solid_png;
    use crate::link_metadata::LinkMetadata;
    use crate::ocr::DisabledRecognizer;
    use tokio::sync::Notify;

    fn pipeline(
        store: &Arc<ItemStore>,
        recognizer: Arc<dyn TextRecognizer>,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> EnrichmentPipeline {
        EnrichmentPipeline::new(Arc::clone(store), recognizer, fetcher)
    }

    fn url_item(store: &ItemStore) -> Item {
        store
            .insert(ItemContent::Url {
                url: "https://example.com".into(),
                title: None,
                favicon_url: None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_screenshot_gets_thumbnail_and_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Screenshot 1.png");
        std::fs::write(&path, solid_png(300, 300, [5, 5, 5, 255])).unwrap();

        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let enrichment = pipeline(&store, Arc::new(FixedRecognizer("Hello\nWorld")), Arc::new(OfflineFetcher));
        let item = store
            .insert(ItemContent::Screenshot {
                file_path: path.to_string_lossy().into_owned(),
                file_name: "Screenshot 1.png".into(),
                ocr_text: None,
                thumbnail: None,
            })
            .unwrap();

        enrichment.enqueue(&item);
        enrichment.drain().await;

        match store.get(item.id).unwrap().unwrap().content {
            ItemContent::Screenshot { ocr_text, thumbnail, .. } => {
                assert_eq!(ocr_text.as_deref(), Some("Hello\nWorld"));
                let thumb = image::load_from_memory(&thumbnail.unwrap()).unwrap();
                assert_eq!((thumb.width(), thumb.height()), (100, 100));
            }
            other => panic!("Expected Screenshot content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ocr_failure_leaves_field_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Screenshot 2.png");
        std::fs::write(&path, solid_png(10, 10, [5, 5, 5, 255])).unwrap();

        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let enrichment = pipeline(&store, Arc::new(DisabledRecognizer), Arc::new(OfflineFetcher));
        let item = store
            .insert(ItemContent::Screenshot {
                file_path: path.to_string_lossy().into_owned(),
                file_name: "Screenshot 2.png".into(),
                ocr_text: None,
                thumbnail: None,
            })
            .unwrap();

        enrichment.enqueue(&item);
        enrichment.drain().await;

        match store.get(item.id).unwrap().unwrap().content {
            ItemContent::Screenshot { ocr_text, thumbnail, .. } => {
                assert!(ocr_text.is_none());
                assert!(thumbnail.is_some());
            }
            other => panic!("Expected Screenshot content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_url_metadata_and_favicon_gate() {
        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let fetcher = FixedFetcher {
            meta: LinkMetadata {
                title: Some("Example".into()),
                favicon_url: Some("https://example.com/favicon.ico".into()),
            },
            release: None,
        };
        let enrichment = pipeline(&store, Arc::new(DisabledRecognizer), Arc::new(fetcher));

        enrichment.set_fetch_favicons(false);
        let skipped = url_item(&store);
        enrichment.enqueue(&skipped);
        assert_eq!(enrichment.in_flight(), 0);

        enrichment.set_fetch_favicons(true);
        let item = url_item(&store);
        enrichment.enqueue(&item);
        enrichment.drain().await;

        match store.get(item.id).unwrap().unwrap().content {
            ItemContent::Url { title, favicon_url, .. } => {
                assert_eq!(title.as_deref(), Some("Example"));
                assert_eq!(favicon_url.as_deref(), Some("https://example.com/favicon.ico"));
            }
            other => panic!("Expected Url content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_failure_leaves_fields_unset() {
        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let enrichment = pipeline(&store, Arc::new(DisabledRecognizer), Arc::new(OfflineFetcher));
        let item = url_item(&store);
        enrichment.enqueue(&item);
        enrichment.drain().await;
        assert_eq!(store.get(item.id).unwrap().unwrap().content, item.content);
    }

    #[tokio::test]
    async fn test_delete_during_enrichment_does_not_resurrect() {
        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let release = Arc::new(Notify::new());
        let fetcher = FixedFetcher {
            meta: LinkMetadata {
                title: Some("Late".into()),
                favicon_url: None,
            },
            release: Some(Arc::clone(&release)),
        };
        let enrichment = pipeline(&store, Arc::new(DisabledRecognizer), Arc::new(fetcher));

        let item = url_item(&store);
        enrichment.enqueue(&item);
        assert!(store.delete(item.id).unwrap());
        release.notify_one();
        enrichment.drain().await;

        assert!(store.get(item.id).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_text_and_code_are_not_enriched() {
        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let enrichment = pipeline(&store, Arc::new(DisabledRecognizer), Arc::new(OfflineFetcher));
        let text = store.insert(ItemContent::Text { content: "plain".into() }).unwrap();
        let code = store
            .insert(ItemContent::Code { code: "x();".into(), language: None })
            .unwrap();
        enrichment.enqueue(&text);
        enrichment.enqueue(&code);
        assert_eq!(enrichment.in_flight(), 0);
    }
}
