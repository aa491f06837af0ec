//! Text recognition for screenshots

use crate::interface::{ClipShotError, ClipShotResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Recognizes text in an image file. Blocking; callers run it off the async runtime.
pub trait TextRecognizer: Send + Sync {
    /// Newline-joined best candidate per detected text region
    fn recognize(&self, image_path: &Path) -> ClipShotResult<String>;
}

/// Shells out to the `tesseract` CLI (LSTM engine, dictionary correction
/// through the language model).
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: language.into(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image_path: &Path) -> ClipShotResult<String> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["--oem", "1", "-l", self.language.as_str(), "tsv"])
            .output()
            .map_err(|e| ClipShotError::Enrichment(format!("failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            return Err(ClipShotError::Enrichment(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(path = %image_path.display(), chars = text.len(), "OCR finished");
        Ok(text)
    }
}

/// Used when OCR is turned off or unavailable
pub struct DisabledRecognizer;

impl TextRecognizer for DisabledRecognizer {
    fn recognize(&self, _image_path: &Path) -> ClipShotResult<String> {
        Err(ClipShotError::Enrichment("text recognition is disabled".to_string()))
    }
}

/// Collapse tesseract TSV output into one line per text block.
///
/// Columns: level page block par line word left top width height conf text.
/// Word rows (level 5) with a negative confidence are layout rows and skipped.
pub(crate) fn parse_tsv(tsv: &str) -> String {
    let mut blocks: BTreeMap<(u32, u32), Vec<&str>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let confidence: f32 = cols[10].parse().unwrap_or(-1.0);
        let word = cols[11].trim();
        if confidence < 0.0 || word.is_empty() {
            continue;
        }
        let page: u32 = cols[1].parse().unwrap_or(0);
        let block: u32 = cols[2].parse().unwrap_or(0);
        blocks.entry((page, block)).or_default().push(word);
    }

    blocks
        .values()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_groups_by_block() {
        let tsv = [
            HEADER,
            "1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t",
            "2\t1\t1\t0\t0\t0\t10\t10\t200\t20\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t96.1\tHello",
            "5\t1\t1\t1\t1\t2\t70\t10\t60\t20\t95.0\tworld",
            "5\t1\t2\t1\t1\t1\t10\t80\t60\t20\t91.3\tTotal:",
            "5\t1\t2\t1\t1\t2\t80\t80\t30\t20\t90.0\t42",
            "5\t1\t2\t1\t1\t3\t120\t80\t30\t20\t-1\t ",
        ]
        .join("\n");
        assert_eq!(parse_tsv(&tsv), "Hello world\nTotal: 42");
    }

    #[test]
    fn test_parse_tsv_empty() {
        assert_eq!(parse_tsv(HEADER), "");
        assert_eq!(parse_tsv(""), "");
    }

    #[test]
    fn test_disabled_recognizer_errors() {
        let err = DisabledRecognizer.recognize(Path::new("/tmp/x.png")).unwrap_err();
        assert!(matches!(err, ClipShotError::Enrichment(_)));
    }

    #[test]
    fn test_missing_binary_is_enrichment_error() {
        let recognizer = TesseractRecognizer::new("eng").with_binary("/nonexistent/tesseract-bin");
        let err = recognizer.recognize(Path::new("/tmp/x.png")).unwrap_err();
        assert!(matches!(err, ClipShotError::Enrichment(_)));
    }
}
