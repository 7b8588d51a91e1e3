//! Post-processing: deterministic cleanup of extracted text and model answers.
//!
//! pdfium hands back page text with the quirks of whatever produced the PDF:
//! CRLF line endings, runs of trailing spaces from justified layouts, zero-width
//! characters and long stretches of empty lines. Model answers occasionally
//! arrive wrapped in a ```` ```markdown ```` fence, which would render as one
//! big code block.
//!
//! Every rule is a pure `&str → String` pass so each is testable on its own.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean the text of a single page before it is joined with its neighbours.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Drop leading and trailing blank lines
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_start_matches('\n').trim_end().to_string()
}

/// Prepare a model answer for Markdown rendering.
///
/// Unwraps an answer fenced as a whole and normalises line endings. The
/// answer returned by the retry client is left untouched; this is for display.
pub fn clean_answer(input: &str) -> String {
    let s = normalise_line_endings(input);
    strip_markdown_fences(&s)
}

// ── Rule: Strip outer markdown fences ────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule: Normalise line endings ─────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: Trim trailing whitespace per line ──────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule: Collapse excessive blank lines ─────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule: Strip invisible Unicode ────────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}
