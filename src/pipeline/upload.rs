//! Upload staging: validate the bytes and place them in a scoped temp file.
//!
//! pdfium opens documents by path, so every upload is written to a
//! `NamedTempFile`. The file lives exactly as long as the returned
//! [`StagedUpload`] and is removed when it drops, whether extraction
//! succeeded, failed, or panicked.

use crate::error::AnalysisError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// An upload written to disk for the duration of one request.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    filename: String,
    size: usize,
}

impl StagedUpload {
    /// Path of the temporary copy.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Name the user gave the file (for messages only).
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Reject empty buffers and anything that does not start with `%PDF`.
pub fn validate_pdf(bytes: &[u8], filename: &str) -> Result<(), AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::EmptyUpload {
            filename: filename.to_string(),
        });
    }
    if bytes.len() < PDF_MAGIC.len() || &bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
        return Err(AnalysisError::NotAPdf {
            filename: filename.to_string(),
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        });
    }
    Ok(())
}

/// Validate `bytes` and write them to a fresh temporary `.pdf` file.
pub fn stage_upload(bytes: &[u8], filename: &str) -> Result<StagedUpload, AnalysisError> {
    validate_pdf(bytes, filename)?;

    let mut file = tempfile::Builder::new()
        .prefix("pliego-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| AnalysisError::Internal(format!("tempfile: {e}")))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| AnalysisError::Internal(format!("tempfile write: {e}")))?;

    debug!(
        "Staged '{}' ({} bytes) at {}",
        filename,
        bytes.len(),
        file.path().display()
    );

    Ok(StagedUpload {
        file,
        filename: filename.to_string(),
        size: bytes.len(),
    })
}
