//! Web surface: upload page, HTML result page, JSON API.
//!
//! ```text
//! GET  /             upload form
//! POST /analyze      multipart "file" → HTML result (422 on unreadable PDF)
//! POST /api/analyze  multipart "file" → JSON AnalysisOutput
//! GET  /health       "ok"
//! ```
//!
//! Requests are independent: each one gets its own staged temp file and its
//! own retry loop, and the only shared state is the read-only [`Analyzer`].

use crate::analyze::Analyzer;
use crate::error::AnalysisError;
use crate::output::AnalysisOutput;
use crate::pipeline::postprocess::clean_answer;
use crate::progress::TracingProgressCallback;
use ammonia::{Builder, UrlRelative};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Extra room on top of the file size for multipart framing.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Characters of extracted text shown in the collapsible preview.
const PREVIEW_CHARS: usize = 3000;

const UPLOAD_FIELD: &str = "file";

/// Build the application router around a shared analyzer.
pub fn router(analyzer: Arc<Analyzer>) -> Router {
    let body_limit = analyzer
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(serve_upload_page))
        .route("/analyze", post(analyze_html))
        .route("/api/analyze", post(analyze_json))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(analyzer)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, analyzer: Arc<Analyzer>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Pliego analyzer listening");
    axum::serve(listener, router(analyzer)).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn serve_upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE_HTML)
}

async fn analyze_html(State(analyzer): State<Arc<Analyzer>>, multipart: Multipart) -> Response {
    match run_analysis(&analyzer, multipart).await {
        Ok(output) => Html(render_result_page(&output)).into_response(),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!("Analysis failed: {}", e);
            }
            (status, Html(render_error_page(&e))).into_response()
        }
    }
}

async fn analyze_json(
    State(analyzer): State<Arc<Analyzer>>,
    multipart: Multipart,
) -> Result<Json<AnalysisOutput>, AnalysisError> {
    run_analysis(&analyzer, multipart).await.map(Json)
}

async fn run_analysis(
    analyzer: &Analyzer,
    multipart: Multipart,
) -> Result<AnalysisOutput, AnalysisError> {
    let (filename, bytes) = read_upload(multipart, analyzer.config().max_upload_bytes).await?;
    let progress = Arc::new(TracingProgressCallback::new(filename.clone()));
    analyzer.analyze_bytes(&bytes, &filename, progress).await
}

/// Pull the `file` field out of the multipart body.
async fn read_upload(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<(String, Vec<u8>), AnalysisError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, max_bytes))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("documento.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error(e, max_bytes))?;
        if bytes.len() > max_bytes {
            return Err(AnalysisError::UploadTooLarge { limit: max_bytes });
        }
        return Ok((filename, bytes.to_vec()));
    }
    Err(AnalysisError::MissingUpload)
}

/// Map a multipart failure, keeping the body-limit rejection distinct.
fn upload_error(e: MultipartError, max_bytes: usize) -> AnalysisError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AnalysisError::UploadTooLarge { limit: max_bytes }
    } else {
        AnalysisError::UploadRead(e.body_text())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Escape text for inclusion in HTML element content or attribute values.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Sanitiser for rendered answers: text markup and links only, links
/// limited to absolute http/https/mailto URLs, no images.
static ANSWER_CLEANER: Lazy<Builder<'static>> = Lazy::new(|| {
    let mut cleaner = Builder::default();
    cleaner.rm_tags(&["img"]);
    cleaner.url_schemes(HashSet::from(["http", "https", "mailto"]));
    cleaner.url_relative(UrlRelative::Deny);
    cleaner
});

/// Render an answer from Markdown to sanitised HTML.
///
/// Raw HTML embedded in the answer is escaped rather than passed through.
/// The answer is shaped by the uploaded document, so the generated HTML is
/// cleaned before it reaches the page.
fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        pulldown_cmark::Event::Html(raw) | pulldown_cmark::Event::InlineHtml(raw) => {
            pulldown_cmark::Event::Text(raw)
        }
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    ANSWER_CLEANER.clean(&out).to_string()
}

fn preview(text: &str) -> (String, bool) {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

fn render_result_page(output: &AnalysisOutput) -> String {
    let (head, truncated) = preview(&output.extracted_text);
    let ellipsis = if truncated { "\n…" } else { "" };
    let answer = render_markdown(&clean_answer(&output.response));

    format!(
        "{head_html}\
<h2>{filename}</h2>\
<p class=\"info\">Texto extraído: ~{chars} caracteres</p>\
<details><summary>Ver texto extraído</summary><pre>{preview}{ellipsis}</pre></details>\
<h2>Análisis</h2>\
<div class=\"answer\">{answer}</div>\
<p><a href=\"/\">Analizar otro pliego</a></p>\
{tail_html}",
        head_html = PAGE_HEAD,
        filename = escape_html(&output.filename),
        chars = output.stats.extracted_chars,
        preview = escape_html(&head),
        ellipsis = ellipsis,
        answer = answer,
        tail_html = PAGE_TAIL,
    )
}

fn render_error_page(error: &AnalysisError) -> String {
    let message = if error.is_extraction_error() {
        format!("Error al procesar el PDF: {error}")
    } else {
        error.to_string()
    };
    format!(
        "{PAGE_HEAD}<p class=\"error\">{}</p><p><a href=\"/\">Volver</a></p>{PAGE_TAIL}",
        escape_html(&message)
    )
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Analizador de Pliegos</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; color: #222; }
h1 { font-size: 1.6rem; }
.info { color: #0b5394; }
.error { color: #b00020; font-weight: 600; }
pre { white-space: pre-wrap; background: #f5f5f5; padding: 1rem; max-height: 24rem; overflow: auto; }
.answer table { border-collapse: collapse; }
.answer td, .answer th { border: 1px solid #ccc; padding: .3rem .5rem; }
</style>
</head>
<body>
<h1>Analizador de Pliegos</h1>
"#;

const PAGE_TAIL: &str = "\n</body>\n</html>\n";

const UPLOAD_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Analizador de Pliegos</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; color: #222; }
#drop { border: 2px dashed #888; border-radius: 8px; padding: 2.5rem; text-align: center; }
#drop.over { border-color: #0b5394; background: #eef4fb; }
button { margin-top: 1rem; padding: .5rem 1.5rem; font-size: 1rem; }
</style>
</head>
<body>
<h1>Analizador de Pliegos</h1>
<p>Sube el pliego en PDF para obtener un resumen de sus puntos clave.</p>
<form id="form" action="/analyze" method="post" enctype="multipart/form-data">
  <div id="drop">
    <p>Arrastra aquí el PDF o selecciónalo</p>
    <input id="file" type="file" name="file" accept="application/pdf" required>
  </div>
  <button type="submit">Analizar</button>
</form>
<script>
const drop = document.getElementById('drop');
const input = document.getElementById('file');
drop.addEventListener('dragover', e => { e.preventDefault(); drop.classList.add('over'); });
drop.addEventListener('dragleave', () => drop.classList.remove('over'));
drop.addEventListener('drop', e => {
  e.preventDefault();
  drop.classList.remove('over');
  if (e.dataTransfer.files.length) { input.files = e.dataTransfer.files; }
});
document.getElementById('form').addEventListener('submit', e => {
  e.submitter.disabled = true;
  e.submitter.textContent = 'Analizando…';
});
</script>
</body>
</html>
"#;
