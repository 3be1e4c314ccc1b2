//! Plain-text extraction from supported document formats.
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// Extensions the directory scan picks up (lower case, no dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "txt", "md"];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: .{extension}")]
    Unsupported { extension: String },

    #[error("error reading file {file}: {reason}")]
    Failed { file: String, reason: String },
}

impl ExtractError {
    fn failed(path: &Path, reason: impl ToString) -> Self {
        Self::Failed {
            file: display_name(path),
            reason: reason.to_string(),
        }
    }
}

/// Converts a document into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Lower-cased extension of `path`, if any.
#[must_use]
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Whether the directory scan should consider `path`.
#[must_use]
pub fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Default extractor: PDF via `lopdf`, DOCX via `docx-rs`, text and markdown
/// read as UTF-8. Legacy binary `.doc` files are reported as unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let ext = extension_of(path).unwrap_or_default();
        debug!("Extracting text from {} (.{ext})", path.display());

        match ext.as_str() {
            "txt" | "md" => fs::read_to_string(path).map_err(|e| ExtractError::failed(path, e)),
            "pdf" => extract_pdf(path),
            "docx" => extract_docx(path),
            _ => Err(ExtractError::Unsupported { extension: ext }),
        }
    }
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractError::failed(path, e))?;

    let mut text = String::new();
    for page in doc.get_pages().keys() {
        let page_text = doc
            .extract_text(&[*page])
            .map_err(|e| ExtractError::failed(path, format!("page {page}: {e}")))?;
        text.push_str(&page_text);
        text.push('\n');
    }
    Ok(text)
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let bytes = fs::read(path).map_err(|e| ExtractError::failed(path, e))?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::failed(path, e))?;

    let mut text = String::new();
    for child in &docx.document.children {
        let DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };
        for item in &paragraph.children {
            let ParagraphChild::Run(run) = item else {
                continue;
            };
            for piece in &run.children {
                match piece {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("a/b/Policy.PDF")));
        assert!(is_supported(Path::new("notes.md")));
        assert!(is_supported(Path::new("legacy.doc")));
        assert!(!is_supported(Path::new("image.png")));
        assert!(!is_supported(Path::new("README")));
    }

    #[test]
    fn test_extract_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.txt");
        fs::write(&path, "Step one.\nStep two.").unwrap();

        let text = DocumentExtractor.extract(&path).unwrap();
        assert_eq!(text, "Step one.\nStep two.");
    }

    #[test]
    fn test_doc_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.doc");
        fs::write(&path, b"\xd0\xcf\x11\xe0").unwrap();

        let err = DocumentExtractor.extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported { ref extension } if extension == "doc"));
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();

        let err = DocumentExtractor.extract(&path).unwrap_err();
        assert!(err.to_string().contains("broken.txt"));
    }

    #[test]
    fn test_corrupt_pdf_and_docx_fail() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["bad.pdf", "bad.docx"] {
            let path = dir.path().join(name);
            fs::write(&path, "definitely not a real document").unwrap();
            let err = DocumentExtractor.extract(&path).unwrap_err();
            assert!(matches!(err, ExtractError::Failed { .. }), "{name}: {err}");
        }
    }
}
