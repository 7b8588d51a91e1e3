//! Pipeline stages for analysing a pliego.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and the collaborators (pdfium, the LLM service) can be swapped for stubs.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ upload ──▶ extract ──▶ prompt ──▶ generate
//! (path/URL) (tempfile) (pdfium)   (template)  (retry + fallback)
//! ```
//!
//! 1. [`input`]    — CLI only: read a local path or download a URL into memory
//! 2. [`upload`]   — check the `%PDF` magic and stage bytes in a scoped temp file
//! 3. [`extract`]  — per-page text via pdfium on the blocking pool, joined by blank lines
//! 4. [`postprocess`] — deterministic cleanup of page text and answers
//! 5. [`generate`] — bounded retry around one [`crate::service::GenerationService`] call

pub mod extract;
pub mod generate;
pub mod input;
pub mod postprocess;
pub mod upload;
