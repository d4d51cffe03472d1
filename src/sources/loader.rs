// src/sources/loader.rs

// --- Imports ---
use crate::sources::{document_name, Document, SourceKind};
use crate::utils::error::SourceError;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;

/// Page separator emitted by common PDF-to-text converters.
const FORM_FEED: char = '\x0C';

// --- CSS Selectors (Lazy Static) ---
// Elements whose text forms one logical line
static LINE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("tr, p, li, h1, h2, h3, h4, h5, h6")
        .expect("Failed to compile LINE_SELECTOR")
});

/// Reads a local file and splits it into pages according to its kind.
pub fn load_file(path: &Path) -> Result<Document, SourceError> {
    let kind = SourceKind::from_path(path);
    tracing::info!("Loading {} document: {}", kind.as_str(), path.display());

    let bytes = std::fs::read(path)?;
    let pages = pages_from_bytes(kind, &bytes)?;

    Ok(Document {
        name: document_name(&path.to_string_lossy()),
        kind,
        pages,
    })
}

/// Converts raw document bytes into ordered page texts.
pub fn pages_from_bytes(kind: SourceKind, bytes: &[u8]) -> Result<Vec<String>, SourceError> {
    let pages = match kind {
        SourceKind::Pdf => pdf_pages(bytes)?,
        SourceKind::Text => text_pages(&String::from_utf8_lossy(bytes)),
        SourceKind::Html => vec![html_lines(&String::from_utf8_lossy(bytes))],
    };
    tracing::debug!("Loaded {} pages ({} bytes)", pages.len(), bytes.len());
    Ok(pages)
}

fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>, SourceError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| SourceError::Pdf(e.to_string()))?;

    if pages.iter().all(|p| p.trim().is_empty()) {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(vec![String::new()]);
    }
    Ok(pages)
}

/// Splits plain text into pages on form feeds.
pub fn text_pages(text: &str) -> Vec<String> {
    text.split(FORM_FEED).map(str::to_string).collect()
}

/// Flattens an HTML document to newline-separated lines, one per row,
/// paragraph, list item or heading, in document order.
pub fn html_lines(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for element in document.select(&LINE_SELECTOR) {
        // Paragraphs inside a table row are already covered by the row
        if element.value().name() != "tr" && inside_table_row(element) {
            continue;
        }

        let text = element
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !text.is_empty() {
            lines.push(text);
        }
    }

    lines.join("\n")
}

fn inside_table_row(element: ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "tr")
}
