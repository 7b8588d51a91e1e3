//! Text extraction: read every page of a staged PDF and join the results.
//!
//! The pdfium collaborator sits behind [`PageTextBackend`] so the joining and
//! progress logic can be exercised without a native library. Backends push
//! pages into a [`PageSink`] in page order; [`extract_text`] owns the sink,
//! reports one progress event per page and joins pages with a blank line.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. Extraction runs on the blocking pool so Tokio worker threads
//! keep serving other uploads.

use crate::error::AnalysisError;
use crate::pipeline::postprocess::clean_page_text;
use crate::pipeline::upload::StagedUpload;
use crate::progress::{AnalysisProgressCallback, ProgressCallback};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Separator placed between consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Receives pages from a [`PageTextBackend`].
pub trait PageSink {
    /// Called once, before the first page.
    fn begin(&mut self, total_pages: usize);
    /// Called for each page, in order.
    fn page(&mut self, text: String);
}

/// A source of per-page text for a PDF on disk.
pub trait PageTextBackend: Send + Sync {
    /// Open `path` and push every page's text into `sink`.
    ///
    /// `filename` is the user-facing name, used only in error messages.
    fn read_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        filename: &str,
        sink: &mut dyn PageSink,
    ) -> Result<(), AnalysisError>;
}

/// The joined text of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Join page texts in order with [`PAGE_SEPARATOR`].
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

struct CollectingSink<'a> {
    pages: Vec<String>,
    total: usize,
    progress: &'a dyn AnalysisProgressCallback,
}

impl PageSink for CollectingSink<'_> {
    fn begin(&mut self, total_pages: usize) {
        self.total = total_pages;
        self.pages.reserve(total_pages);
        self.progress.on_extraction_start(total_pages);
    }

    fn page(&mut self, text: String) {
        let cleaned = clean_page_text(&text);
        let page_num = self.pages.len() + 1;
        self.progress
            .on_page_extracted(page_num, self.total.max(page_num), cleaned.chars().count());
        self.pages.push(cleaned);
    }
}

/// Extract the staged document's text on the blocking pool.
pub async fn extract_text(
    backend: Arc<dyn PageTextBackend>,
    staged: &StagedUpload,
    password: Option<String>,
    progress: ProgressCallback,
) -> Result<ExtractedText, AnalysisError> {
    let path = staged.path().to_path_buf();
    let filename = staged.filename().to_string();

    tokio::task::spawn_blocking(move || {
        extract_text_blocking(
            backend.as_ref(),
            &path,
            password.as_deref(),
            &filename,
            progress.as_ref(),
        )
    })
    .await
    .map_err(|e| AnalysisError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Blocking implementation of [`extract_text`].
pub fn extract_text_blocking(
    backend: &dyn PageTextBackend,
    path: &Path,
    password: Option<&str>,
    filename: &str,
    progress: &dyn AnalysisProgressCallback,
) -> Result<ExtractedText, AnalysisError> {
    let mut sink = CollectingSink {
        pages: Vec::new(),
        total: 0,
        progress,
    };
    backend.read_pages(path, password, filename, &mut sink)?;

    let page_count = sink.pages.len();
    let text = join_pages(&sink.pages);
    progress.on_extraction_complete(page_count, text.chars().count());
    debug!("Extracted {} pages from '{}'", page_count, filename);

    Ok(ExtractedText { text, page_count })
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// Reads page text with pdfium.
///
/// The library is located through `pdfium-auto`: `PDFIUM_LIB_PATH` if set,
/// otherwise a cached copy, otherwise a one-time download.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the pdfium library at `path` instead of the auto-managed one.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, AnalysisError> {
        let bound = match self.library_path {
            Some(ref path) => pdfium_auto::bind_pdfium_from_path(path),
            None => pdfium_auto::bind_pdfium_silent(),
        };
        bound.map_err(|e| AnalysisError::PdfiumBindingFailed(e.to_string()))
    }
}

impl PageTextBackend for PdfiumBackend {
    fn read_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        filename: &str,
        sink: &mut dyn PageSink,
    ) -> Result<(), AnalysisError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| load_error(e, password, filename))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);
        sink.begin(total_pages);

        for (idx, page) in pages.iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| AnalysisError::PageTextFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?
                .all();
            sink.page(text);
        }

        Ok(())
    }
}

/// Map a pdfium load failure to the user-facing error.
fn load_error(e: PdfiumError, password: Option<&str>, filename: &str) -> AnalysisError {
    match e {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            if password.is_some() {
                AnalysisError::WrongPassword {
                    filename: filename.to_string(),
                }
            } else {
                AnalysisError::PasswordRequired {
                    filename: filename.to_string(),
                }
            }
        }
        other => AnalysisError::CorruptPdf {
            filename: filename.to_string(),
            detail: format!("{:?}", other),
        },
    }
}
