//! Page metadata extraction
//!
//! One script reads the document's title, meta description, OpenGraph
//! tags, language, canonical link, and publication tags. The formatted
//! block is used verbatim in the artifact header.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::browser::PageGuard;

/// Script evaluated in the page. Returns a JSON object whose fields
/// mirror `PageMetadata`.
const METADATA_SCRIPT: &str = r#"
(() => {
    const meta = (name) => {
        const el = document.querySelector('meta[name="' + name + '"]');
        return el ? el.getAttribute('content') : null;
    };
    const prop = (name) => {
        const el = document.querySelector('meta[property="' + name + '"]');
        return el ? el.getAttribute('content') : null;
    };
    const canonical = document.querySelector('link[rel="canonical"]');
    return {
        title: prop('og:title') || document.title || null,
        description: prop('og:description') || meta('description') || null,
        author: meta('author') || prop('article:author') || null,
        published: prop('article:published_time') || meta('date') || null,
        language: document.documentElement.getAttribute('lang') || null,
        canonical: canonical ? canonical.getAttribute('href') : null,
        site_name: prop('og:site_name') || null,
    };
})()
"#;

/// Metadata read from a loaded page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub language: Option<String>,
    pub canonical: Option<String>,
    pub site_name: Option<String>,
}

/// Extract metadata from the page. Extraction failures degrade to an
/// empty record rather than failing the conversion.
pub async fn extract(page: &PageGuard) -> PageMetadata {
    match page.evaluate(METADATA_SCRIPT).await {
        Ok(value) => match serde_json::from_value(value) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "metadata script returned unexpected shape");
                PageMetadata::default()
            }
        },
        Err(e) => {
            warn!(error = %e, "metadata extraction failed");
            PageMetadata::default()
        }
    }
}

/// Render the stable, human-readable metadata block.
pub fn format_metadata(metadata: &PageMetadata) -> String {
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    let mut lines = Vec::new();
    lines.push(format!(
        "Title: {}",
        non_empty(&metadata.title).unwrap_or("Untitled")
    ));
    if let Some(description) = non_empty(&metadata.description) {
        lines.push(format!("Description: {}", description));
    }
    if let Some(author) = non_empty(&metadata.author) {
        lines.push(format!("Author: {}", author));
    }
    if let Some(published) = non_empty(&metadata.published) {
        lines.push(format!("Published: {}", published));
    }
    if let Some(language) = non_empty(&metadata.language) {
        lines.push(format!("Language: {}", language));
    }
    if let Some(canonical) = non_empty(&metadata.canonical) {
        lines.push(format!("Canonical: {}", canonical));
    }
    if let Some(site_name) = non_empty(&metadata.site_name) {
        lines.push(format!("Site: {}", site_name));
    }
    lines.join("\n")
}
