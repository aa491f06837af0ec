//! Display and search helpers on top of the item model

use crate::interface::{Item, ItemContent};

impl Item {
    /// One-line preview for list display (whitespace collapsed, truncated)
    pub fn preview(&self, max_chars: usize) -> String {
        normalize_preview(self.content.text_content(), max_chars)
    }

    /// Case-insensitive substring match over every searchable field.
    /// An empty query matches everything.
    pub fn matches_search(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        let hit = |field: &str| field.to_lowercase().contains(&needle);

        let content_hit = match &self.content {
            ItemContent::Text { content } => hit(content),
            ItemContent::Url { url, title, .. } => hit(url) || title.as_deref().is_some_and(hit),
            ItemContent::Code { code, .. } => hit(code),
            ItemContent::Screenshot { file_name, ocr_text, .. } => {
                hit(file_name) || ocr_text.as_deref().is_some_and(hit)
            }
            ItemContent::Image { .. } => false,
        };

        content_hit || self.tags.iter().any(|tag| hit(tag))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TEXT NORMALIZATION
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize text for preview display
/// - Skips leading whitespace
/// - Collapses runs of whitespace (newlines, tabs) to a single space
/// - Truncates at max_chars with ellipsis
pub fn normalize_preview(text: &str, max_chars: usize) -> String {
    let mut result = String::with_capacity(max_chars + 1);
    let mut last_was_space = false;
    let mut count = 0;

    for ch in text.trim_start().chars() {
        if count >= max_chars {
            while result.ends_with(' ') {
                result.pop();
            }
            result.push('…');
            return result;
        }

        if ch.is_whitespace() {
            if last_was_space {
                continue;
            }
            last_was_space = true;
            result.push(' ');
        } else {
            last_was_space = false;
            result.push(ch);
        }
        count += 1;
    }

    while result.ends_with(' ') {
        result.pop();
    }

    result
}
