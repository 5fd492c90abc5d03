//! Document loading
//!
//! Turns a source file into one [`Document`] per page. PDFs are parsed with
//! `pdf-extract`; plain text files use form feeds as page breaks.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{QaError, Result};

const PAGE_BREAK: char = '\x0c';

/// Where a piece of text came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source file name
    pub source: String,
    /// Zero-based page number
    pub page: u32,
}

/// The text of a single page of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Load `path` into per-page documents.
///
/// `source` overrides the name recorded in each page's metadata; the file name
/// is used otherwise.
#[inline]
pub fn load_document(path: &Path, source: Option<&str>) -> Result<Vec<Document>> {
    let source = match source {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| QaError::Document(format!("Not a file: {}", path.display())))?,
    };

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    debug!("Loading {} as {:?}", path.display(), extension);

    let pages = match extension.as_str() {
        "pdf" => {
            let bytes = fs::read(path)?;
            extract_pdf_pages(&bytes)?
        }
        "txt" | "md" => split_pages(&fs::read_to_string(path)?),
        other => {
            return Err(QaError::Config(format!(
                "Unsupported document type {:?} for {} (expected pdf, txt or md)",
                other,
                path.display()
            )));
        }
    };

    let documents = documents_from_pages(&source, pages);
    info!("Loaded {} pages from {}", documents.len(), path.display());
    Ok(documents)
}

/// Extract the text of every page of an in-memory PDF
#[inline]
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    // pdf-extract panics on some malformed files
    let extracted =
        std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| QaError::Document("PDF parser panicked on malformed input".to_string()))?;

    extracted.map_err(|e| QaError::Document(format!("Failed to extract PDF text: {}", e)))
}

/// Split plain text into pages on form feed characters
#[inline]
pub fn split_pages(text: &str) -> Vec<String> {
    text.split(PAGE_BREAK).map(str::to_string).collect()
}

/// Build one document per non-blank page, keeping original page numbers
#[inline]
pub fn documents_from_pages(source: &str, pages: Vec<String>) -> Vec<Document> {
    let total = pages.len();
    let documents: Vec<Document> = pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(page, text)| Document {
            text,
            metadata: DocumentMetadata {
                source: source.to_string(),
                page: page as u32,
            },
        })
        .collect();

    if documents.len() < total {
        warn!(
            "Skipped {} blank pages in {}",
            total - documents.len(),
            source
        );
    }

    documents
}
