//! # pliego-analyzer
//!
//! Upload a procurement document (*pliego*) as a PDF, extract its text, and
//! have an LLM answer a fixed list of tender questions about it: title,
//! budget, deadlines, required certifications, award criteria and so on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Stage    validate %PDF magic, write to a scoped temp file
//!  ├─ 2. Extract  per-page text via pdfium (spawn_blocking), joined by "\n\n"
//!  ├─ 3. Prompt   fixed Spanish template with the full text embedded
//!  ├─ 4. Generate one LLM call, up to 3 attempts, 1 s apart, fallback string
//!  └─ 5. Render   Markdown answer → HTML (web) or stdout / file (CLI)
//! ```
//!
//! Extraction problems (not a PDF, corrupt, encrypted) are returned as
//! [`AnalysisError`] and no generation is attempted. Generation problems are
//! never errors: after the last failed attempt the answer is
//! [`FALLBACK_RESPONSE`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pliego_analyzer::{Analyzer, AnalyzerConfig, NoopProgressCallback, Secrets};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GENAI_API_KEY from the environment, else from secrets.toml
//!     let secrets = Secrets::load(Path::new("secrets.toml"))?;
//!     let analyzer = Analyzer::from_config(AnalyzerConfig::default(), &secrets)?;
//!
//!     let bytes = std::fs::read("pliego.pdf")?;
//!     let output = analyzer
//!         .analyze_bytes(&bytes, "pliego.pdf", Arc::new(NoopProgressCallback))
//!         .await?;
//!     println!("{}", output.response);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pliego-analyzer` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::Analyzer;
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, Secrets};
pub use error::{AnalysisError, ServiceError};
pub use output::{AnalysisOutput, AnalysisStats};
pub use pipeline::generate::{is_fallback_response, RetryingGenerator, FALLBACK_RESPONSE};
pub use progress::{
    AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, TracingProgressCallback,
};
pub use service::{GenerationService, Reply};
