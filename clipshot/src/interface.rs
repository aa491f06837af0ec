//! clipshot Interface Definition
//!
//! Shared types consumed by the presentation layer and the CLI: the item
//! model, query filters, the error type and the `HistoryApi` service trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub type ItemId = i64;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Discriminant of the five item variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Url,
    Code,
    Screenshot,
    Image,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        ItemKind::Text,
        ItemKind::Url,
        ItemKind::Code,
        ItemKind::Screenshot,
        ItemKind::Image,
    ];

    /// Value stored in `items.kind`
    pub fn database_type(self) -> &'static str {
        match self {
            ItemKind::Text => "text",
            ItemKind::Url => "url",
            ItemKind::Code => "code",
            ItemKind::Screenshot => "screenshot",
            ItemKind::Image => "image",
        }
    }

    pub fn from_database(value: &str) -> Option<Self> {
        match value {
            "text" => Some(ItemKind::Text),
            "url" => Some(ItemKind::Url),
            "code" => Some(ItemKind::Code),
            "screenshot" => Some(ItemKind::Screenshot),
            "image" => Some(ItemKind::Image),
            _ => None,
        }
    }

    /// Child table holding the variant-specific columns
    pub(crate) fn child_table(self) -> &'static str {
        match self {
            ItemKind::Text => "text_items",
            ItemKind::Url => "url_items",
            ItemKind::Code => "code_items",
            ItemKind::Screenshot => "screenshot_items",
            ItemKind::Image => "image_items",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.database_type())
    }
}

impl FromStr for ItemKind {
    type Err = ClipShotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemKind::from_database(&s.to_lowercase())
            .ok_or_else(|| ClipShotError::InvalidInput(format!("unknown item kind: {}", s)))
    }
}

/// Type-safe item payload. Exactly one variant per item; fields of other
/// kinds cannot exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemContent {
    Text {
        content: String,
    },
    Url {
        url: String,
        title: Option<String>,
        favicon_url: Option<String>,
    },
    Code {
        code: String,
        language: Option<String>,
    },
    Screenshot {
        file_path: String,
        file_name: String,
        ocr_text: Option<String>,
        #[serde(skip_serializing)]
        thumbnail: Option<Vec<u8>>,
    },
    Image {
        #[serde(skip_serializing)]
        data: Vec<u8>,
        #[serde(skip_serializing)]
        thumbnail: Option<Vec<u8>>,
    },
}

impl ItemContent {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemContent::Text { .. } => ItemKind::Text,
            ItemContent::Url { .. } => ItemKind::Url,
            ItemContent::Code { .. } => ItemKind::Code,
            ItemContent::Screenshot { .. } => ItemKind::Screenshot,
            ItemContent::Image { .. } => ItemKind::Image,
        }
    }

    /// The primary displayable text of the payload
    pub fn text_content(&self) -> &str {
        match self {
            ItemContent::Text { content } => content,
            ItemContent::Url { title: Some(title), .. } if !title.is_empty() => title,
            ItemContent::Url { url, .. } => url,
            ItemContent::Code { code, .. } => code,
            ItemContent::Screenshot { file_name, .. } => file_name,
            ItemContent::Image { .. } => "Image",
        }
    }

    pub fn thumbnail(&self) -> Option<&[u8]> {
        match self {
            ItemContent::Screenshot { thumbnail, .. } | ItemContent::Image { thumbnail, .. } => {
                thumbnail.as_deref()
            }
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// A persisted history entry: shared envelope plus the kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub timestamp: DateTime<Utc>,
    pub is_favorite: bool,
    pub tags: Vec<String>,
    pub content: ItemContent,
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        self.content.kind()
    }
}

/// Field-level update produced by one enrichment step.
///
/// `None` means "leave unchanged", so steps that finish out of order on the
/// same item never clobber each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentPatch {
    pub title: Option<String>,
    pub favicon_url: Option<String>,
    pub ocr_text: Option<String>,
    pub thumbnail: Option<Vec<u8>>,
}

impl EnrichmentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.favicon_url.is_none()
            && self.ocr_text.is_none()
            && self.thumbnail.is_none()
    }
}

/// Equality / range predicates understood by `ItemStore::find_by_field`
#[derive(Debug, Clone, PartialEq)]
pub enum ItemFilter {
    FileName(String),
    Url(String),
    CreatedSince(DateTime<Utc>),
    CreatedBetween {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Favorite(bool),
}

/// UI query: every item across kinds, newest first, optionally filtered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemQuery {
    pub kind: Option<ItemKind>,
    pub favorites_only: bool,
    /// Case-insensitive substring over content, URL, title, code, OCR text and tags
    pub search: Option<String>,
    pub limit: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for clipshot operations
#[derive(Debug, Error)]
pub enum ClipShotError {
    /// Clipboard read or directory listing failed; retried on the next poll/event
    #[error("Transient I/O error: {0}")]
    TransientIo(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Enrichment error: {0}")]
    Enrichment(String),
    /// The item was deleted (possibly concurrently)
    #[error("Item {0} not found")]
    NotFound(ItemId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ClipShotResult<T> = Result<T, ClipShotError>;

impl From<crate::database::DatabaseError> for ClipShotError {
    fn from(e: crate::database::DatabaseError) -> Self {
        match e {
            crate::database::DatabaseError::NotFound(id) => ClipShotError::NotFound(id),
            other => ClipShotError::Storage(other.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Entry points consumed by the presentation layer.
pub trait HistoryApi: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// All items across kinds, newest first, filtered by the query
    fn items(&self, query: &ItemQuery) -> ClipShotResult<Vec<Item>>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Flip the favorite flag. Returns the new value.
    fn toggle_favorite(&self, id: ItemId) -> ClipShotResult<bool>;

    fn delete(&self, id: ItemId) -> ClipShotResult<()>;

    fn clear_all(&self) -> ClipShotResult<()>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Write text to the clipboard without re-capturing it
    fn copy_to_clipboard(&self, text: &str) -> ClipShotResult<()>;

    /// Write encoded image bytes to the clipboard without re-capturing them
    fn copy_image_to_clipboard(&self, bytes: &[u8]) -> ClipShotResult<()>;

    fn open_url(&self, url: &str) -> ClipShotResult<()>;

    fn open_file(&self, path: &Path) -> ClipShotResult<()>;
}
