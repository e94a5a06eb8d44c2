//! Page-text extraction for ingestable files (pipeline layer).
//!
//! The core treats page extraction as a black box producing ordered
//! `(text, page_number, total_pages)` tuples; this module is the thin
//! implementation of that box for the CLI. PDFs are extracted per page;
//! plain text and Markdown ingest as single-page documents. A PDF page
//! that yields no text becomes an empty [`Page`] and flows through —
//! the chunker never attributes it, the pipeline never fails on it.

use std::path::Path;

use crate::error::ExtractError;
use crate::models::Page;

/// Extract the ordered page sequence for one file.
pub fn extract_pages(path: &Path) -> Result<Vec<Page>, ExtractError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ExtractError::UnsupportedType(path.display().to_string()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => extract_pdf(path, &filename),
        "txt" | "md" => {
            let text = std::fs::read_to_string(path)?;
            Ok(vec![Page {
                source: filename,
                page_number: 1,
                total_pages: 1,
                text,
            }])
        }
        other => Err(ExtractError::UnsupportedType(other.to_string())),
    }
}

fn extract_pdf(path: &Path, filename: &str) -> Result<Vec<Page>, ExtractError> {
    let bytes = std::fs::read(path)?;
    let page_texts = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let total_pages = page_texts.len() as u32;
    Ok(page_texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            source: filename.to_string(),
            page_number: i as u32 + 1,
            total_pages,
            text,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_pages(Path::new("notes.xyz")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType(_)));
    }

    #[test]
    fn text_file_is_a_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "line one\nline two").unwrap();

        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].source, "notes.txt");
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].total_pages, 1);
        assert!(pages[0].text.contains("line two"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = extract_pages(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
