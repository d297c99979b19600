//! Plain-text extraction from uploaded ES PDFs.
//!
//! Parsing is CPU-bound, so it runs on the blocking pool via `spawn_blocking`.

use bytes::Bytes;
use tracing::{info, warn};

use crate::errors::AppError;

pub const MAX_PDF_BYTES: usize = 10 * 1024 * 1024;

/// Cheap header check before handing bytes to the parser.
pub fn validate_pdf(bytes: &[u8]) -> Result<(), AppError> {
    if bytes.is_empty() {
        return Err(AppError::Validation("file is empty".to_string()));
    }
    if bytes.len() > MAX_PDF_BYTES {
        return Err(AppError::Validation(format!(
            "file exceeds {} MB",
            MAX_PDF_BYTES / (1024 * 1024)
        )));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(AppError::Validation("file is not a PDF".to_string()));
    }
    Ok(())
}

/// Trims every line and collapses runs of blank lines into one.
pub fn normalize_text(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in raw.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

pub async fn extract_pdf_text(bytes: Bytes) -> Result<String, AppError> {
    validate_pdf(&bytes)?;
    let size = bytes.len();

    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in PDF extract: {e}")))?
        .map_err(|e| {
            warn!("PDF parse failed: {e}");
            AppError::UnprocessableEntity("The PDF could not be read".to_string())
        })?;

    let text = normalize_text(&raw);
    if text.is_empty() {
        // Scanned PDFs have no text layer.
        return Err(AppError::UnprocessableEntity(
            "No text could be extracted from the PDF".to_string(),
        ));
    }

    info!(
        "Extracted {} chars from a {} byte PDF",
        text.chars().count(),
        size
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_pdf() {
        assert!(matches!(
            validate_pdf(b"PK\x03\x04 docx"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(validate_pdf(b""), Err(AppError::Validation(_))));
        assert!(validate_pdf(b"%PDF-1.7\n...").is_ok());
    }

    #[test]
    fn test_normalize_collapses_blank_lines() {
        let raw = "\n\n  志望動機  \n\n\n\n貴社を志望する理由は\n  \n";
        assert_eq!(normalize_text(raw), "志望動機\n\n貴社を志望する理由は");
    }

    #[test]
    fn test_normalize_whitespace_only_is_empty() {
        assert_eq!(normalize_text(" \n \n\t"), "");
    }

    #[tokio::test]
    async fn test_extract_rejects_non_pdf_before_parsing() {
        let result = extract_pdf_text(Bytes::from_static(b"hello")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
