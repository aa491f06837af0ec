//! Link metadata fetching - page title and favicon for URL items

use crate::interface::{ClipShotError, ClipShotResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HTML_SIZE: usize = 512 * 1024; // 512KB max HTML

static TITLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static LINK_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<link\b[^>]*>").unwrap());
static REL_ATTR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\brel\s*=\s*["']([^"']*)["']"#).unwrap());
static HREF_ATTR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bhref\s*=\s*["']([^"']+)["']"#).unwrap());

/// Fetched link metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkMetadata {
    pub title: Option<String>,
    pub favicon_url: Option<String>,
}

#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> ClipShotResult<LinkMetadata>;
}

/// Fetches pages over HTTP(S)
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new() -> ClipShotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15")
            .build()
            .map_err(|e| ClipShotError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, url: &str) -> ClipShotResult<LinkMetadata> {
        let network = |e: reqwest::Error| ClipShotError::Network(e.to_string());

        let mut response = self.client.get(url).send().await.map_err(network)?;
        if !response.status().is_success() {
            return Err(ClipShotError::Network(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        // Stop reading at the cap; the head of the page holds what we need
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(network)? {
            body.extend_from_slice(&chunk);
            if body.len() >= MAX_HTML_SIZE {
                body.truncate(MAX_HTML_SIZE);
                break;
            }
        }

        let final_url = response.url().to_string();
        Ok(parse_metadata(&String::from_utf8_lossy(&body), &final_url))
    }
}

/// Extract `<title>` text and the `rel="icon"` href from an HTML document
pub fn parse_metadata(html: &str, page_url: &str) -> LinkMetadata {
    LinkMetadata {
        title: extract_title_tag(html),
        favicon_url: extract_icon_href(html).and_then(|href| resolve_url(page_url, &href)),
    }
}

fn extract_title_tag(html: &str) -> Option<String> {
    let raw = TITLE_REGEX.captures(html)?.get(1)?.as_str();
    let title = decode_entities(&raw.split_whitespace().collect::<Vec<_>>().join(" "));
    (!title.is_empty()).then_some(title)
}

fn extract_icon_href(html: &str) -> Option<String> {
    LINK_TAG_REGEX.find_iter(html).find_map(|tag| {
        let tag = tag.as_str();
        let rel = REL_ATTR_REGEX.captures(tag)?;
        let is_icon = rel[1]
            .split_whitespace()
            .any(|token| token.eq_ignore_ascii_case("icon"));
        if !is_icon {
            return None;
        }
        HREF_ATTR_REGEX.captures(tag).map(|c| c[1].trim().to_string())
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn resolve_url(base: &str, relative: &str) -> Option<String> {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return Some(relative.to_string());
    }
    url::Url::parse(base)
        .ok()?
        .join(relative)
        .ok()
        .map(|u| u.to_string())
}
