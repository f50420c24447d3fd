//! Source classification: map a reference to the pipeline that handles it.
//!
//! Classification is by file extension, the only signal available before the
//! bytes arrive. URL references may carry query strings or fragments, so the
//! extension is taken from the path portion only.

use serde::{Deserialize, Serialize};

/// How a source is converted to pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Word-processor container (`.docx`): convert to markup, sanitize,
    /// render with the markup layout.
    Word,
    /// Markup document (`.html`, `.htm`): sanitize, render with the markup
    /// layout.
    Markup,
    /// Raster image: render as a single scaled-to-fit page.
    RasterImage,
    /// Finished page document (`.pdf`): validated and passed through.
    PageDocument,
}

impl SourceKind {
    /// Human-readable kind name for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Word => "word",
            SourceKind::Markup => "markup",
            SourceKind::RasterImage => "image",
            SourceKind::PageDocument => "pdf",
        }
    }
}

/// Classify a source reference by its lowercased extension.
///
/// Returns `None` for references with no extension or an unsupported one;
/// the caller turns that into a per-source unsupported error.
pub fn classify(reference: &str) -> Option<SourceKind> {
    let ext = extension_of(reference)?;
    match ext.as_str() {
        "docx" => Some(SourceKind::Word),
        "html" | "htm" => Some(SourceKind::Markup),
        "pdf" => Some(SourceKind::PageDocument),
        "png" | "gif" | "bmp" | "jpeg" | "jpg" | "tiff" | "tif" | "wmf" => {
            Some(SourceKind::RasterImage)
        }
        _ => None,
    }
}

/// Extract the lowercased extension from a reference, ignoring any URL
/// query string or fragment.
pub fn extension_of(reference: &str) -> Option<String> {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_the_supported_extensions() {
        assert_eq!(classify("report.docx"), Some(SourceKind::Word));
        assert_eq!(classify("page.html"), Some(SourceKind::Markup));
        assert_eq!(classify("page.htm"), Some(SourceKind::Markup));
        assert_eq!(classify("scan.pdf"), Some(SourceKind::PageDocument));
        for img in ["a.png", "a.gif", "a.bmp", "a.jpeg", "a.jpg", "a.tiff", "a.tif", "a.wmf"] {
            assert_eq!(classify(img), Some(SourceKind::RasterImage), "{img}");
        }
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify("REPORT.DOCX"), Some(SourceKind::Word));
        assert_eq!(classify("Photo.JPeG"), Some(SourceKind::RasterImage));
    }

    #[test]
    fn unsupported_and_missing_extensions_are_none() {
        assert_eq!(classify("slides.pptx"), None);
        assert_eq!(classify("archive.tar.xz"), None);
        assert_eq!(classify("noextension"), None);
        assert_eq!(classify(""), None);
        assert_eq!(classify(".hidden"), None);
    }

    #[test]
    fn url_query_and_fragment_are_ignored() {
        assert_eq!(
            classify("https://example.com/files/a.docx?token=abc#frag"),
            Some(SourceKind::Word)
        );
        assert_eq!(extension_of("https://h/x/b.PNG?x=1"), Some("png".into()));
        // The query string must not donate an extension of its own.
        assert_eq!(classify("https://example.com/download?name=a.docx"), None);
    }
}
