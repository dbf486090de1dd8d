use std::path::Path;

use anyhow::{Context, Result};

use crate::types::PageDoc;

/// Loads a document as page texts. PDFs are split by page; plain-text files
/// treat form feeds as page breaks (a single page otherwise).
pub fn load_document(path: &Path) -> Result<Vec<PageDoc>> {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    let pages: Vec<String> = if is_pdf {
        pdf_extract::extract_text_by_pages(path)
            .with_context(|| format!("extracting text from {}", path.display()))?
    } else {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        text.split('\x0c').map(|s| s.to_string()).collect()
    };
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageDoc {
            page: i as u32 + 1,
            text,
        })
        .collect())
}

/// Loads a document and merges its pages into a single string.
pub fn load_document_text(path: &Path) -> Result<String> {
    let pages = load_document(path)?;
    Ok(pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_file_splits_on_form_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("essay.txt");
        std::fs::write(&path, "page one text\x0cpage two text").unwrap();
        let pages = load_document(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page, 1);
        assert_eq!(pages[1].text, "page two text");
    }

    #[test]
    fn single_page_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("question.txt");
        std::fs::write(&path, "What causes inflation?").unwrap();
        let text = load_document_text(&path).unwrap();
        assert_eq!(text, "What causes inflation?");
    }
}
