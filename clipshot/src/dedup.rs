//! Suppress-or-accept decision for capture candidates
//!
//! Text-like kinds are compared against the single most recent item of the
//! same kind only. Screenshots are unique by file name. Images are compared
//! against recent screenshots (by a small render of the stored thumbnail) and
//! recent images (by raw bytes) inside `DEDUP_WINDOW`.

use crate::imaging;
use crate::interface::{ClipShotResult, ItemContent, ItemFilter, ItemKind};
use crate::store::ItemStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// How far back an image candidate is compared against stored items
pub const DEDUP_WINDOW: Duration = Duration::seconds(5);

pub struct Deduplicator {
    store: Arc<ItemStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<ItemStore>) -> Self {
        Self { store }
    }

    pub fn is_duplicate(&self, candidate: &ItemContent) -> ClipShotResult<bool> {
        self.is_duplicate_at(candidate, Utc::now())
    }

    /// Same as `is_duplicate`, evaluated as if the current time were `now`
    pub fn is_duplicate_at(&self, candidate: &ItemContent, now: DateTime<Utc>) -> ClipShotResult<bool> {
        match candidate {
            ItemContent::Text { .. } | ItemContent::Url { .. } | ItemContent::Code { .. } => {
                self.matches_most_recent(candidate)
            }
            ItemContent::Screenshot { file_name, .. } => self.store.contains_screenshot(file_name),
            ItemContent::Image { data, .. } => self.image_seen_recently(data, now),
        }
    }

    fn matches_most_recent(&self, candidate: &ItemContent) -> ClipShotResult<bool> {
        let latest = self.store.most_recent(candidate.kind(), 1)?;
        let Some(latest) = latest.first() else {
            return Ok(false);
        };

        let same = match (&latest.content, candidate) {
            (ItemContent::Text { content: a }, ItemContent::Text { content: b }) => a == b,
            (ItemContent::Url { url: a, .. }, ItemContent::Url { url: b, .. }) => a == b,
            (ItemContent::Code { code: a, .. }, ItemContent::Code { code: b, .. }) => a == b,
            _ => false,
        };
        if same {
            debug!(item_id = latest.id, kind = %candidate.kind(), "Candidate repeats most recent item");
        }
        Ok(same)
    }

    fn image_seen_recently(&self, data: &[u8], now: DateTime<Utc>) -> ClipShotResult<bool> {
        let window = ItemFilter::CreatedBetween {
            start: now - DEDUP_WINDOW,
            end: now,
        };

        // A copied screenshot arrives as an image right after the file appears
        let screenshots = self.store.find_by_field(ItemKind::Screenshot, &window)?;
        let candidate_print = if screenshots.is_empty() {
            None
        } else {
            imaging::thumbnail_fingerprint(data)
        };
        if let Some(candidate_print) = candidate_print {
            for shot in &screenshots {
                let Some(thumbnail) = shot.content.thumbnail() else {
                    continue;
                };
                if imaging::fingerprint(thumbnail).as_deref() == Some(candidate_print.as_slice()) {
                    debug!(item_id = shot.id, "Image matches recent screenshot");
                    return Ok(true);
                }
            }
        }

        let images = self.store.find_by_field(ItemKind::Image, &window)?;
        let repeated = images.iter().any(|image| match &image.content {
            ItemContent::Image { data: stored, .. } => stored.as_slice() == data,
            _ => false,
        });
        Ok(repeated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{generate_thumbnail, gradient_png, solid_png, THUMBNAIL_SIZE};
    use crate::interface::EnrichmentPatch;

    fn setup() -> (Arc<ItemStore>, Deduplicator) {
        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let dedup = Deduplicator::new(Arc::clone(&store));
        (store, dedup)
    }

    fn text(value: &str) -> ItemContent {
        ItemContent::Text { content: value.to_string() }
    }

    fn screenshot(name: &str) -> ItemContent {
        ItemContent::Screenshot {
            file_path: format!("/shots/{}", name),
            file_name: name.to_string(),
            ocr_text: None,
            thumbnail: None,
        }
    }

    #[test]
    fn test_consecutive_text_suppressed() {
        let (store, dedup) = setup();
        assert!(!dedup.is_duplicate(&text("hello")).unwrap());
        store.insert(text("hello")).unwrap();
        assert!(dedup.is_duplicate(&text("hello")).unwrap());
    }

    #[test]
    fn test_only_most_recent_is_compared() {
        let (store, dedup) = setup();
        store.insert(text("A")).unwrap();
        store.insert(text("B")).unwrap();
        assert!(!dedup.is_duplicate(&text("A")).unwrap());
    }

    #[test]
    fn test_kinds_are_compared_separately() {
        let (store, dedup) = setup();
        store.insert(text("let x = 1;")).unwrap();
        let code = ItemContent::Code { code: "let x = 1;".into(), language: None };
        assert!(!dedup.is_duplicate(&code).unwrap());
    }

    #[test]
    fn test_screenshot_file_name_is_unique() {
        let (store, dedup) = setup();
        store.insert(screenshot("Screenshot 1.png")).unwrap();
        store.insert(screenshot("Screenshot 2.png")).unwrap();
        assert!(dedup.is_duplicate(&screenshot("Screenshot 1.png")).unwrap());
        assert!(!dedup.is_duplicate(&screenshot("Screenshot 3.png")).unwrap());
    }

    #[test]
    fn test_image_matching_screenshot_thumbnail_inside_window() {
        let (store, dedup) = setup();
        let picture = gradient_png(1440, 900, 7);
        let shot = store.insert(screenshot("Screenshot 9.png")).unwrap();
        store
            .apply_enrichment(
                shot.id,
                &EnrichmentPatch {
                    thumbnail: generate_thumbnail(&picture, THUMBNAIL_SIZE),
                    ..Default::default()
                },
            )
            .unwrap();

        let candidate = ItemContent::Image { data: picture, thumbnail: None };
        assert!(dedup.is_duplicate(&candidate).unwrap());
        assert!(!dedup
            .is_duplicate_at(&candidate, Utc::now() + Duration::seconds(6))
            .unwrap());

        let unrelated = ItemContent::Image { data: gradient_png(1440, 900, 99), thumbnail: None };
        assert!(!dedup.is_duplicate(&unrelated).unwrap());
    }

    #[test]
    fn test_repeated_image_inside_window() {
        let (store, dedup) = setup();
        let picture = solid_png(8, 8, [1, 2, 3, 255]);
        store
            .insert(ItemContent::Image { data: picture.clone(), thumbnail: None })
            .unwrap();

        let candidate = ItemContent::Image { data: picture, thumbnail: None };
        assert!(dedup.is_duplicate(&candidate).unwrap());
        assert!(!dedup
            .is_duplicate_at(&candidate, Utc::now() + Duration::seconds(6))
            .unwrap());

        let different = ItemContent::Image {
            data: solid_png(8, 8, [9, 9, 9, 255]),
            thumbnail: None,
        };
        assert!(!dedup.is_duplicate(&different).unwrap());
    }
}
