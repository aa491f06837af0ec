//! Clipboard access behind an explicit handle
//!
//! `SystemClipboard` talks to the OS clipboard through arboard. It has no
//! native change counter, so one is derived from a hash of the current
//! contents. `MemoryClipboard` is an in-process clipboard used for headless
//! runs and tests.

use crate::interface::{ClipShotError, ClipShotResult};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;

/// One read of the clipboard. Image data is PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    Image(Vec<u8>),
    Text(String),
    Empty,
}

pub trait ClipboardBackend: Send + Sync {
    /// Monotonic counter that changes whenever the clipboard contents change
    fn change_count(&self) -> ClipShotResult<i64>;

    /// Current contents; an image wins over text when both are present
    fn read(&self) -> ClipShotResult<ClipboardPayload>;

    fn write_text(&self, text: &str) -> ClipShotResult<()>;

    /// Write PNG (or any decodable) image bytes
    fn write_image(&self, bytes: &[u8]) -> ClipShotResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SYSTEM CLIPBOARD
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct HashCounter {
    last_hash: Option<u64>,
    count: i64,
}

/// Owns one long-lived arboard instance. On X11 and Wayland the selection
/// written by `write_text` / `write_image` is served only while it is alive.
pub struct SystemClipboard {
    clipboard: Mutex<arboard::Clipboard>,
    counter: Mutex<HashCounter>,
}

impl SystemClipboard {
    /// Fails when no clipboard is reachable (e.g. headless session)
    pub fn new() -> ClipShotResult<Self> {
        let clipboard = arboard::Clipboard::new()
            .map_err(|e| ClipShotError::TransientIo(format!("clipboard unavailable: {}", e)))?;
        Ok(Self {
            clipboard: Mutex::new(clipboard),
            counter: Mutex::new(HashCounter::default()),
        })
    }

    fn content_hash(clipboard: &mut arboard::Clipboard) -> u64 {
        let mut hasher = DefaultHasher::new();
        if let Ok(image) = clipboard.get_image() {
            image.width.hash(&mut hasher);
            image.height.hash(&mut hasher);
            image.bytes.hash(&mut hasher);
        } else if let Ok(text) = clipboard.get_text() {
            text.hash(&mut hasher);
        }
        hasher.finish()
    }
}

fn transient(e: arboard::Error) -> ClipShotError {
    ClipShotError::TransientIo(e.to_string())
}

/// Encode raw RGBA clipboard pixels as PNG
fn encode_image_to_png_bytes(image: &arboard::ImageData) -> ClipShotResult<Vec<u8>> {
    let rgba_image = image::RgbaImage::from_raw(
        image.width as u32,
        image.height as u32,
        image.bytes.to_vec(),
    )
    .ok_or_else(|| ClipShotError::TransientIo("clipboard image has inconsistent size".to_string()))?;

    let mut png_data = Vec::new();
    rgba_image
        .write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| ClipShotError::TransientIo(format!("failed to encode clipboard image: {}", e)))?;
    Ok(png_data)
}

/// Decode image bytes into the RGBA layout arboard writes
fn decode_to_image_data(bytes: &[u8]) -> ClipShotResult<arboard::ImageData<'static>> {
    let rgba = image::load_from_memory(bytes)
        .map_err(|e| ClipShotError::InvalidInput(format!("not a decodable image: {}", e)))?
        .to_rgba8();
    Ok(arboard::ImageData {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        bytes: Cow::Owned(rgba.into_raw()),
    })
}

impl ClipboardBackend for SystemClipboard {
    fn change_count(&self) -> ClipShotResult<i64> {
        let hash = Self::content_hash(&mut self.clipboard.lock());

        let mut counter = self.counter.lock();
        if counter.last_hash != Some(hash) {
            counter.last_hash = Some(hash);
            counter.count += 1;
        }
        Ok(counter.count)
    }

    fn read(&self) -> ClipShotResult<ClipboardPayload> {
        let mut clipboard = self.clipboard.lock();

        match clipboard.get_image() {
            Ok(image) => return Ok(ClipboardPayload::Image(encode_image_to_png_bytes(&image)?)),
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(e) => return Err(transient(e)),
        }

        match clipboard.get_text() {
            Ok(text) => Ok(ClipboardPayload::Text(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(ClipboardPayload::Empty),
            Err(e) => Err(transient(e)),
        }
    }

    fn write_text(&self, text: &str) -> ClipShotResult<()> {
        self.clipboard.lock().set_text(text).map_err(transient)
    }

    fn write_image(&self, bytes: &[u8]) -> ClipShotResult<()> {
        let image = decode_to_image_data(bytes)?;
        self.clipboard.lock().set_image(image).map_err(transient)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IN-MEMORY CLIPBOARD
// ─────────────────────────────────────────────────────────────────────────────

struct MemoryState {
    count: i64,
    payload: ClipboardPayload,
    unavailable: bool,
}

/// In-process clipboard. Every write bumps the change counter, including
/// writes of identical content.
pub struct MemoryClipboard {
    state: Mutex<MemoryState>,
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                count: 0,
                payload: ClipboardPayload::Empty,
                unavailable: false,
            }),
        }
    }

    fn set(&self, payload: ClipboardPayload) {
        let mut state = self.state.lock();
        state.count += 1;
        state.payload = payload;
    }

    /// Make reads fail with a transient error until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }
}

impl ClipboardBackend for MemoryClipboard {
    fn change_count(&self) -> ClipShotResult<i64> {
        Ok(self.state.lock().count)
    }

    fn read(&self) -> ClipShotResult<ClipboardPayload> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(ClipShotError::TransientIo("clipboard busy".to_string()));
        }
        Ok(state.payload.clone())
    }

    fn write_text(&self, text: &str) -> ClipShotResult<()> {
        self.set(ClipboardPayload::Text(text.to_string()));
        Ok(())
    }

    fn write_image(&self, bytes: &[u8]) -> ClipShotResult<()> {
        self.set(ClipboardPayload::Image(bytes.to_vec()));
        Ok(())
    }
}
