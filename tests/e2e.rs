//! End-to-end integration tests for pliego-analyzer.
//!
//! These tests bind the real pdfium library (downloaded on first use) and,
//! where noted, make live LLM API calls. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GENAI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! The live tests analyse `test_cases/pliego.pdf`, or the file named by
//! `PLIEGO_E2E_PDF`. The password tests use `test_cases/cifrado.pdf`, a
//! document encrypted with the user password `pliego`.
//!
//! Set `RUST_LOG=pliego_analyzer=debug` to see the library's logs.

use pdfium_render::prelude::*;
use pliego_analyzer::pipeline::extract::{extract_text, PdfiumBackend};
use pliego_analyzer::pipeline::upload::stage_upload;
use pliego_analyzer::{
    is_fallback_response, server, AnalysisError, Analyzer, AnalyzerConfig, NoopProgressCallback,
    Secrets,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn sample_pdf() -> PathBuf {
    std::env::var_os("PLIEGO_E2E_PDF")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/pliego.pdf"))
}

const ENCRYPTED_PASSWORD: &str = "pliego";

fn encrypted_pdf() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/cifrado.pdf")
}

/// Route library logs to the test harness; repeated calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        init_tracing();
    };
}

/// Skip unless E2E is enabled and the encrypted fixture exists.
macro_rules! e2e_skip_unless_encrypted_fixture {
    () => {{
        e2e_skip_unless_enabled!();
        let p = encrypted_pdf();
        if !p.exists() {
            println!("SKIP — encrypted fixture not found: {}", p.display());
            return;
        }
        std::fs::read(&p).unwrap()
    }};
}

async fn extract_with_password(
    bytes: &[u8],
    password: Option<&str>,
) -> Result<pliego_analyzer::pipeline::extract::ExtractedText, AnalysisError> {
    let staged = stage_upload(bytes, "cifrado.pdf").unwrap();
    extract_text(
        Arc::new(PdfiumBackend::new()),
        &staged,
        password.map(str::to_string),
        Arc::new(NoopProgressCallback),
    )
    .await
}

/// Skip unless E2E is enabled, the sample PDF exists and a key is available.
macro_rules! e2e_skip_unless_live {
    () => {{
        e2e_skip_unless_enabled!();
        let p = sample_pdf();
        if !p.exists() {
            println!("SKIP — sample pliego not found: {}", p.display());
            return;
        }
        let secrets = Secrets::load(Path::new("secrets.toml")).expect("secrets");
        if secrets.api_key().is_none() {
            println!("SKIP — GENAI_API_KEY not set");
            return;
        }
        (p, secrets)
    }};
}

/// Build a small text PDF with one line per page.
fn generated_pdf(lines: &[&str]) -> Vec<u8> {
    let pdfium = pdfium_auto::bind_pdfium_silent().expect("bind pdfium");
    let mut document = pdfium.create_new_pdf().expect("new document");
    let font = document.fonts_mut().helvetica();

    for line in lines {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .expect("page");
        page.objects_mut()
            .create_text_object(
                PdfPoints::new(72.0),
                PdfPoints::new(720.0),
                line,
                font,
                PdfPoints::new(12.0),
            )
            .expect("text object");
    }

    document.save_to_bytes().expect("save")
}

// ── Extraction (pdfium only, no API key) ─────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn pdfium_extracts_pages_in_order() {
    e2e_skip_unless_enabled!();

    let bytes = generated_pdf(&["Expediente 2024/001", "Presupuesto base 500000 EUR"]);
    let staged = stage_upload(&bytes, "generado.pdf").unwrap();

    let extracted = extract_text(
        Arc::new(PdfiumBackend::new()),
        &staged,
        None,
        Arc::new(NoopProgressCallback),
    )
    .await
    .unwrap();

    assert_eq!(extracted.page_count, 2);
    let first = extracted.text.find("Expediente 2024/001").expect("page 1 text");
    let second = extracted.text.find("Presupuesto base").expect("page 2 text");
    assert!(first < second);
    assert!(extracted.text.contains("\n\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn pdfium_rejects_truncated_document() {
    e2e_skip_unless_enabled!();

    let bytes = generated_pdf(&["Pliego"]);
    let truncated = &bytes[..bytes.len() / 3];
    let staged = stage_upload(truncated, "roto.pdf").unwrap();

    let err = extract_text(
        Arc::new(PdfiumBackend::new()),
        &staged,
        None,
        Arc::new(NoopProgressCallback),
    )
    .await
    .unwrap_err();

    assert!(err.is_extraction_error(), "unexpected error: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn encrypted_pdf_without_password_is_reported() {
    let bytes = e2e_skip_unless_encrypted_fixture!();

    let err = extract_with_password(&bytes, None).await.unwrap_err();
    assert!(
        matches!(err, AnalysisError::PasswordRequired { .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn encrypted_pdf_with_wrong_password_is_reported() {
    let bytes = e2e_skip_unless_encrypted_fixture!();

    let err = extract_with_password(&bytes, Some("incorrecta"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, AnalysisError::WrongPassword { .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn encrypted_pdf_opens_with_password() {
    let bytes = e2e_skip_unless_encrypted_fixture!();

    let extracted = extract_with_password(&bytes, Some(ENCRYPTED_PASSWORD))
        .await
        .unwrap();
    assert!(extracted.page_count > 0);
}

// ── Live generation ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn live_analysis_answers_questions() {
    let (pdf, secrets) = e2e_skip_unless_live!();

    let analyzer = Analyzer::from_config(AnalyzerConfig::default(), &secrets).unwrap();
    let output = analyzer
        .analyze_input(pdf.to_str().unwrap(), Arc::new(NoopProgressCallback))
        .await
        .unwrap();

    println!("{}", output.response);
    assert!(output.stats.page_count > 0);
    assert!(output.stats.extracted_chars > 0);
    assert!(!is_fallback_response(&output.response));
    assert!(!output.response.trim().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn live_bad_key_falls_back_after_three_attempts() {
    let (pdf, _) = e2e_skip_unless_live!();

    let config = AnalyzerConfig::builder().retry_delay_ms(10).build().unwrap();
    let analyzer = Analyzer::from_config(config, &Secrets::with_api_key("invalid-key")).unwrap();
    let output = analyzer
        .analyze_input(pdf.to_str().unwrap(), Arc::new(NoopProgressCallback))
        .await
        .unwrap();

    assert!(output.is_fallback());
    assert_eq!(output.stats.attempts, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_binds_ephemeral_port() {
    let (_, secrets) = e2e_skip_unless_live!();

    let analyzer = Arc::new(Analyzer::from_config(AnalyzerConfig::default(), &secrets).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(analyzer)).await.unwrap();
    });

    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[test]
fn missing_credential_is_reported_before_any_request() {
    let err = Analyzer::from_config(AnalyzerConfig::default(), &Secrets::default())
        .err()
        .unwrap();
    assert!(matches!(err, AnalysisError::MissingCredential { .. }));
}
