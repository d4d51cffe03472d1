// src/sources/mod.rs
pub mod client;
pub mod loader;

use std::path::Path;

/// Format of an input document, which decides how it is split into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
    Html,
}

impl SourceKind {
    /// Detects the kind from a file extension. Unknown extensions are read as text.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => SourceKind::Pdf,
            Some("htm") | Some("html") | Some("xhtml") => SourceKind::Html,
            _ => SourceKind::Text,
        }
    }

    /// Detects the kind from an HTTP `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/pdf" => Some(SourceKind::Pdf),
            "text/html" | "application/xhtml+xml" => Some(SourceKind::Html),
            "text/plain" => Some(SourceKind::Text),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Text => "text",
            SourceKind::Html => "html",
        }
    }
}

/// A loaded document: ordered page texts ready for extraction.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub kind: SourceKind,
    pub pages: Vec<String>,
}

/// Name of a document from its path or URL: the last segment without extension.
pub fn document_name(location: &str) -> String {
    let trimmed = location
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');

    Path::new(trimmed)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(SourceKind::from_path(Path::new("reports/10k.PDF")), SourceKind::Pdf);
        assert_eq!(SourceKind::from_path(Path::new("filing.htm")), SourceKind::Html);
        assert_eq!(SourceKind::from_path(Path::new("q3.txt")), SourceKind::Text);
        assert_eq!(SourceKind::from_path(Path::new("no_extension")), SourceKind::Text);
    }

    #[test]
    fn test_kind_from_content_type() {
        assert_eq!(SourceKind::from_content_type("application/pdf"), Some(SourceKind::Pdf));
        assert_eq!(
            SourceKind::from_content_type("text/html; charset=utf-8"),
            Some(SourceKind::Html)
        );
        assert_eq!(SourceKind::from_content_type("application/octet-stream"), None);
    }

    #[test]
    fn test_document_name() {
        assert_eq!(document_name("data/annual_report.pdf"), "annual_report");
        assert_eq!(
            document_name("https://example.com/ir/q4-results.html?download=1"),
            "q4-results"
        );
        assert_eq!(document_name("https://example.com/"), "example");
        assert_eq!(document_name(""), "document");
    }
}
