use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Pdf(String),
    #[error("Unsupported file type: .{0}")]
    UnsupportedType(String),
}

/// Text and page count recovered from a PDF. Only the count is shown to the
/// user; the remote index receives the uploaded file.
#[derive(Debug, Clone, Default)]
pub struct PdfExtraction {
    pub text: String,
    pub page_count: usize,
}

/// Reject anything that is not named `*.pdf`.
pub fn ensure_pdf(file_name: &str) -> Result<(), DocError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => Ok(()),
        _ => Err(DocError::UnsupportedType(ext)),
    }
}

/// Write the uploaded bytes to a uniquely named `.pdf` temp file.
///
/// The file is removed when the returned handle is dropped; removal errors
/// are ignored.
pub fn save_temp_pdf(bytes: &[u8]) -> Result<NamedTempFile, DocError> {
    let mut file = tempfile::Builder::new()
        .prefix("pdf-chat-")
        .suffix(".pdf")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

/// Extract text page by page. A failure on any page, including a parser
/// panic, fails the whole document.
pub fn extract_pdf(bytes: &[u8]) -> Result<PdfExtraction, DocError> {
    let pages = std::panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| DocError::Pdf("parser panicked".into()))?
    .map_err(|e| DocError::Pdf(e.to_string()))?;

    let mut text = String::new();
    for page in &pages {
        text.push_str(page);
        text.push('\n');
    }

    Ok(PdfExtraction {
        text,
        page_count: pages.len(),
    })
}

/// `extract_pdf` on the blocking pool, so large documents do not stall the
/// runtime.
pub async fn extract_pdf_blocking(bytes: Vec<u8>) -> Result<PdfExtraction, DocError> {
    tokio::task::spawn_blocking(move || extract_pdf(&bytes))
        .await
        .map_err(|e| DocError::Pdf(format!("extraction task failed: {}", e)))?
}

/// Human readable size, e.g. `1.0 MB`.
pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
