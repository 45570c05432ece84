use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Error extracting text from PDF {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Extraction worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Concatenate per-page text in document order, one line break between pages.
///
/// Pages without text contribute an empty segment. When no page has any text the
/// result is the empty string.
pub fn join_pages<I>(pages: I) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    let pages: Vec<String> = pages.into_iter().map(Option::unwrap_or_default).collect();
    if pages.iter().all(|page| page.trim().is_empty()) {
        return String::new();
    }
    pages.join("\n")
}

/// Extract the text of every page from PDF bytes.
pub fn extract_text_from_bytes(bytes: &[u8], path: &Path) -> Result<String, ExtractionError> {
    let unreadable = |reason: String| ExtractionError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };

    // pdf-extract can panic on malformed fonts
    let pages = match catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => return Err(unreadable(e.to_string())),
        Err(_) => return Err(unreadable("PDF parser panicked, likely malformed fonts".to_string())),
    };

    debug!(path = %path.display(), pages = pages.len(), "pages extracted");
    Ok(join_pages(pages.into_iter().map(Some)))
}

/// Read a PDF from disk and extract its text off the async runtime.
pub async fn extract_text_from_pdf(path: &Path) -> Result<String, ExtractionError> {
    info!(path = %path.display(), "extracting text from PDF");

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractionError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let owned_path = path.to_path_buf();
    let text =
        tokio::task::spawn_blocking(move || extract_text_from_bytes(&bytes, &owned_path)).await??;

    if text.is_empty() {
        warn!(path = %path.display(), "no text found in PDF");
    } else {
        info!(path = %path.display(), characters = text.len(), "PDF text extracted");
    }
    Ok(text)
}
