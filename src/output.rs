//! Result types returned by [`crate::Analyzer`].

use serde::{Deserialize, Serialize};

/// The complete result of analysing one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Name the document was uploaded under.
    pub filename: String,
    /// Joined page text that was embedded in the prompt.
    pub extracted_text: String,
    /// The model's answer, or the fallback string.
    pub response: String,
    pub stats: AnalysisStats,
}

impl AnalysisOutput {
    /// `true` when `response` is the fallback rather than a model answer.
    pub fn is_fallback(&self) -> bool {
        !self.stats.succeeded
    }
}

/// Timing and bookkeeping for one analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub page_count: usize,
    /// Characters (not bytes) of extracted text.
    pub extracted_chars: usize,
    /// Generation attempts made.
    pub attempts: u32,
    pub succeeded: bool,
    pub extraction_duration_ms: u64,
    pub generation_duration_ms: u64,
    pub total_duration_ms: u64,
    pub provider: String,
    pub model: String,
}
