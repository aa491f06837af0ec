//! clipshot - clipboard and screenshot history
//!
//! Captures clipboard changes and new screenshot files, classifies and
//! de-duplicates them, persists them into a typed SQLite store and enriches
//! them in the background (thumbnails, OCR, link titles and favicons).
//!
//! # Architecture
//! - `interface`: item model, query types, errors and the `HistoryApi` trait
//! - `database` / `store`: normalized SQLite schema behind a per-item locked store
//! - `content_detection`: URL / code / text classification
//! - `dedup`: suppress-or-accept decisions against recent history
//! - `enrichment`: background thumbnail, OCR and link metadata tasks
//! - `clipboard_monitor` / `screenshot_monitor`: capture event producers
//! - `pipeline`: the single capture event consumer
//! - `history`: façade wiring everything together

pub mod clipboard;
pub mod clipboard_monitor;
pub mod config;
pub mod content_detection;
pub mod database;
pub mod dedup;
pub mod enrichment;
pub mod folder;
pub mod history;
pub mod imaging;
pub mod interface;
pub mod link_metadata;
pub mod logging;
mod models;
pub mod ocr;
pub mod pipeline;
pub mod screenshot_monitor;
pub mod store;

pub use history::{CaptureHandles, History};
pub use interface::*;
pub use models::normalize_preview;
pub use pipeline::CaptureEvent;
pub use store::ItemStore;
