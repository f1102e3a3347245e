//! Document loading.
//!
//! Loaders turn a file on disk into an ordered list of [`DocumentUnit`]s,
//! one per page. PDFs go through `lopdf`; everything else is read as UTF-8
//! text with form feeds treated as page breaks.

use lopdf::Document;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::vector_entry::Metadata;

pub const SOURCE_KEY: &str = "source";
pub const PAGE_KEY: &str = "page";

const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUnit {
    pub text: String,
    pub source_metadata: Metadata,
}

impl DocumentUnit {
    pub fn new(text: impl Into<String>, source_metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            source_metadata,
        }
    }

    fn page(path: &Path, page: usize, text: String) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), path.display().to_string());
        metadata.insert(PAGE_KEY.to_string(), page.to_string());
        Self::new(text, metadata)
    }
}

pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<DocumentUnit>>;
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(Error::parse(path, "not a regular file"));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<DocumentUnit>> {
        ensure_exists(path)?;

        let doc = Document::load(path).map_err(|e| Error::parse(path, e.to_string()))?;

        // BTreeMap keyed by 1-based page number, so iteration is source order.
        let pages = doc.get_pages();
        let mut units = Vec::with_capacity(pages.len());
        for (index, page_number) in pages.keys().enumerate() {
            let text = match doc.extract_text(&[*page_number]) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!(
                        "No text extracted from page {} of '{}': {}",
                        page_number,
                        path.display(),
                        e
                    );
                    String::new()
                }
            };
            units.push(DocumentUnit::page(path, index, text));
        }

        if units.iter().all(|unit| unit.text.trim().is_empty()) {
            return Err(Error::parse(
                path,
                "no extractable text content (document may be scanned)",
            ));
        }

        log::debug!("Loaded {} page(s) from PDF '{}'", units.len(), path.display());
        Ok(units)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Vec<DocumentUnit>> {
        ensure_exists(path)?;

        let bytes = fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::parse(path, format!("invalid UTF-8: {}", e)))?;

        let units: Vec<DocumentUnit> = text
            .split(PAGE_BREAK)
            .enumerate()
            .map(|(page, page_text)| DocumentUnit::page(path, page, page_text.to_string()))
            .collect();

        log::debug!("Loaded {} page(s) from text file '{}'", units.len(), path.display());
        Ok(units)
    }
}

/// Picks a loader from the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoLoader;

impl DocumentLoader for AutoLoader {
    fn load(&self, path: &Path) -> Result<Vec<DocumentUnit>> {
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            PdfLoader.load(path)
        } else {
            TextLoader.load(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_path_is_not_found() {
        let missing = Path::new("/definitely/not/here.txt");
        assert!(matches!(TextLoader.load(missing), Err(Error::NotFound { .. })));
        assert!(matches!(
            AutoLoader.load(Path::new("/definitely/not/here.pdf")),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_directory_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(TextLoader.load(dir.path()), Err(Error::Parse { .. })));
        assert!(matches!(AutoLoader.load(dir.path()), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_text_pages_split_on_form_feed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first page\x0csecond page").unwrap();

        let units = TextLoader.load(file.path()).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "first page");
        assert_eq!(units[1].text, "second page");
        assert_eq!(units[1].source_metadata.get(PAGE_KEY).map(String::as_str), Some("1"));
        assert_eq!(
            units[0].source_metadata.get(SOURCE_KEY),
            Some(&file.path().display().to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
        assert!(matches!(TextLoader.load(file.path()), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_garbage_pdf_is_parse_error() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"this is not a pdf").unwrap();
        assert!(matches!(AutoLoader.load(file.path()), Err(Error::Parse { .. })));
    }
}
