//! End-to-end analysis: bytes in, answer out.
//!
//! [`Analyzer`] is built once at startup from the configuration and secrets
//! and then shared read-only (behind an `Arc`) by every request. It owns the
//! only long-lived pieces of the system: the generation service with its
//! retry wrapper, and the text-extraction backend.

use crate::config::{AnalyzerConfig, Secrets};
use crate::error::AnalysisError;
use crate::output::{AnalysisOutput, AnalysisStats};
use crate::pipeline::extract::{extract_text, ExtractedText, PageTextBackend, PdfiumBackend};
use crate::pipeline::generate::{Delay, RetryingGenerator};
use crate::pipeline::{input, upload};
use crate::progress::ProgressCallback;
use crate::prompts::{build_analysis_prompt, render_template};
use crate::service::gemini::GeminiService;
use crate::service::llm::ProviderService;
use crate::service::GenerationService;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shared, immutable analysis engine.
pub struct Analyzer {
    config: AnalyzerConfig,
    generator: RetryingGenerator,
    backend: Arc<dyn PageTextBackend>,
}

impl Analyzer {
    /// Assemble an analyzer from explicit collaborators.
    pub fn new(
        config: AnalyzerConfig,
        service: Arc<dyn GenerationService>,
        backend: Arc<dyn PageTextBackend>,
    ) -> Self {
        let generator =
            RetryingGenerator::new(service, Duration::from_millis(config.retry_delay_ms));
        Self {
            config,
            generator,
            backend,
        }
    }

    /// Build the production analyzer: pdfium for extraction and the
    /// configured provider for generation.
    pub fn from_config(config: AnalyzerConfig, secrets: &Secrets) -> Result<Self, AnalysisError> {
        let service = resolve_service(&config, secrets)?;
        info!(
            "Using provider '{}' with model '{}'",
            service.provider(),
            service.model()
        );
        Ok(Self::new(config, service, Arc::new(PdfiumBackend::new())))
    }

    /// Replace the delay used between generation attempts.
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.generator = self.generator.with_delay(delay);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Assemble the prompt for `document_text` with the configured template.
    pub fn build_prompt(&self, document_text: &str) -> String {
        match self.config.prompt_template {
            Some(ref template) => render_template(template, document_text),
            None => build_analysis_prompt(document_text),
        }
    }

    /// Stage `bytes` and extract their text without calling the LLM.
    ///
    /// The temporary copy is removed before this returns, on every path.
    pub async fn extract_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        progress: ProgressCallback,
    ) -> Result<ExtractedText, AnalysisError> {
        let staged = upload::stage_upload(bytes, filename)?;
        extract_text(
            Arc::clone(&self.backend),
            &staged,
            self.config.password.clone(),
            progress,
        )
        .await
    }

    /// Analyse one uploaded document.
    ///
    /// # Errors
    /// Only for problems with the document itself (empty, not a PDF, corrupt,
    /// encrypted) or with the extraction backend. Generation never errors:
    /// when every attempt fails, `output.response` is the fallback string.
    pub async fn analyze_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        progress: ProgressCallback,
    ) -> Result<AnalysisOutput, AnalysisError> {
        let total_start = Instant::now();
        info!("Analysing '{}' ({} bytes)", filename, bytes.len());

        // ── Step 1: Extract text ─────────────────────────────────────────────
        let extraction_start = Instant::now();
        let extracted = self
            .extract_bytes(bytes, filename, Arc::clone(&progress))
            .await?;
        let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;
        let extracted_chars = extracted.text.chars().count();
        info!(
            "Texto extraído: ~{} caracteres ({} pages, {}ms)",
            extracted_chars, extracted.page_count, extraction_duration_ms
        );
        if extracted.text.trim().is_empty() {
            warn!("'{}' has no extractable text layer; the answer will be uninformed", filename);
        }

        // ── Step 2: Build prompt ─────────────────────────────────────────────
        let prompt = self.build_prompt(&extracted.text);

        // ── Step 3: Generate ─────────────────────────────────────────────────
        let generation_start = Instant::now();
        let generation = self
            .generator
            .generate_observed(&prompt, self.config.max_attempts, progress.as_ref())
            .await;
        let generation_duration_ms = generation_start.elapsed().as_millis() as u64;

        let service = self.generator.service();
        let stats = AnalysisStats {
            page_count: extracted.page_count,
            extracted_chars,
            attempts: generation.attempts,
            succeeded: generation.succeeded,
            extraction_duration_ms,
            generation_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            provider: service.provider().to_string(),
            model: service.model().to_string(),
        };

        info!(
            "Analysis of '{}' complete: {} attempt(s), {}, {}ms total",
            filename,
            stats.attempts,
            if stats.succeeded { "answered" } else { "fallback" },
            stats.total_duration_ms
        );

        Ok(AnalysisOutput {
            filename: filename.to_string(),
            extracted_text: extracted.text,
            response: generation.text,
            stats,
        })
    }

    /// Analyse a local PDF path or HTTP/HTTPS URL.
    pub async fn analyze_input(
        &self,
        input_str: impl AsRef<str>,
        progress: ProgressCallback,
    ) -> Result<AnalysisOutput, AnalysisError> {
        let loaded =
            input::load_input(input_str.as_ref(), self.config.download_timeout_secs).await?;
        self.analyze_bytes(&loaded.bytes, &loaded.filename, progress)
            .await
    }

    /// Analyse `input_str` and write the answer to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn analyze_to_file(
        &self,
        input_str: impl AsRef<str>,
        output_path: impl AsRef<Path>,
        progress: ProgressCallback,
    ) -> Result<AnalysisOutput, AnalysisError> {
        let output = self.analyze_input(input_str, progress).await?;
        let path = output_path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AnalysisError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }

        let tmp_path = path.with_extension("md.tmp");
        tokio::fs::write(&tmp_path, ensure_final_newline(&output.response))
            .await
            .map_err(|e| AnalysisError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| AnalysisError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(output)
    }
}

fn ensure_final_newline(s: &str) -> String {
    if s.ends_with('\n') {
        s.to_string()
    } else {
        format!("{s}\n")
    }
}

/// Pick the generation service for `config`.
///
/// `"gemini"` uses the native client with the process credential; every
/// other provider name goes through `edgequake-llm`.
fn resolve_service(
    config: &AnalyzerConfig,
    secrets: &Secrets,
) -> Result<Arc<dyn GenerationService>, AnalysisError> {
    if config.uses_native_gemini() {
        let api_key = secrets.require_api_key()?;
        return Ok(Arc::new(GeminiService::from_config(config, api_key)?));
    }
    Ok(Arc::new(ProviderService::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::pipeline::extract::PageSink;
    use crate::pipeline::generate::FALLBACK_RESPONSE;
    use crate::progress::NoopProgressCallback;
    use crate::prompts::ANALYSIS_QUESTIONS;
    use crate::service::Reply;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FixedPages(Vec<&'static str>);

    impl PageTextBackend for FixedPages {
        fn read_pages(
            &self,
            _path: &Path,
            _password: Option<&str>,
            _filename: &str,
            sink: &mut dyn PageSink,
        ) -> Result<(), AnalysisError> {
            sink.begin(self.0.len());
            for p in &self.0 {
                sink.page(p.to_string());
            }
            Ok(())
        }
    }

    /// Records prompts; answers with a fixed reply.
    struct EchoService {
        reply: Result<Reply, ServiceError>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicU32,
    }

    impl EchoService {
        fn new(reply: Result<Reply, ServiceError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationService for EchoService {
        fn provider(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo-1"
        }
        async fn generate(&self, prompt: &str) -> Result<Reply, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }
    }

    struct NoWait;

    #[async_trait]
    impl Delay for NoWait {
        async fn wait(&self, _duration: Duration) {}
    }

    fn analyzer(service: Arc<EchoService>, pages: Vec<&'static str>) -> Analyzer {
        Analyzer::new(
            AnalyzerConfig::default(),
            service,
            Arc::new(FixedPages(pages)),
        )
        .with_delay(Arc::new(NoWait))
    }

    #[tokio::test]
    async fn prompt_carries_questions_and_full_text() {
        let service = EchoService::new(Ok(Reply::Text("## Nombre\nSoporte".into())));
        let a = analyzer(service.clone(), vec!["Expediente 2024/001", "Importe: 500.000 €"]);

        let out = a
            .analyze_bytes(b"%PDF-1.7", "pliego.pdf", Arc::new(NoopProgressCallback))
            .await
            .unwrap();

        assert_eq!(out.response, "## Nombre\nSoporte");
        assert_eq!(out.extracted_text, "Expediente 2024/001\n\nImporte: 500.000 €");
        assert_eq!(out.stats.page_count, 2);
        assert_eq!(out.stats.attempts, 1);
        assert_eq!(out.stats.provider, "echo");
        assert!(!out.is_fallback());

        let prompts = service.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(&out.extracted_text));
        for q in ANALYSIS_QUESTIONS {
            assert!(prompts[0].contains(q));
        }
    }

    #[tokio::test]
    async fn corrupt_upload_makes_no_generation_attempt() {
        let service = EchoService::new(Ok(Reply::Text("unused".into())));
        let a = analyzer(service.clone(), vec!["never read"]);

        let err = a
            .analyze_bytes(b"this is not a pdf", "roto.pdf", Arc::new(NoopProgressCallback))
            .await
            .unwrap_err();

        assert!(err.is_extraction_error());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_attempts_yield_fallback_output() {
        let service = EchoService::new(Err(ServiceError::Transport("down".into())));
        let a = analyzer(service.clone(), vec!["texto"]);

        let out = a
            .analyze_bytes(b"%PDF-1.4", "pliego.pdf", Arc::new(NoopProgressCallback))
            .await
            .unwrap();

        assert_eq!(out.response, FALLBACK_RESPONSE);
        assert!(out.is_fallback());
        assert_eq!(out.stats.attempts, 3);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn custom_template_is_used() {
        let service = EchoService::new(Ok(Reply::Text("ok".into())));
        let config = AnalyzerConfig::builder()
            .prompt_template("Resume en una línea:\n{document}")
            .build()
            .unwrap();
        let a = Analyzer::new(config, service.clone(), Arc::new(FixedPages(vec!["abc"])));

        a.analyze_bytes(b"%PDF-1.4", "p.pdf", Arc::new(NoopProgressCallback))
            .await
            .unwrap();

        assert_eq!(
            service.prompts.lock().unwrap()[0],
            "Resume en una línea:\nabc"
        );
    }

    #[tokio::test]
    async fn analyze_to_file_writes_answer() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pliego.pdf");
        std::fs::write(&input, b"%PDF-1.7 stub").unwrap();
        let out_path = dir.path().join("out/analisis.md");

        let service = EchoService::new(Ok(Reply::Text("Respuesta".into())));
        let a = analyzer(service, vec!["texto"]);
        a.analyze_to_file(
            input.to_str().unwrap(),
            &out_path,
            Arc::new(NoopProgressCallback),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "Respuesta\n");
        assert!(!out_path.with_extension("md.tmp").exists());
    }

    #[test]
    fn gemini_without_key_is_missing_credential() {
        let err = resolve_service(&AnalyzerConfig::default(), &Secrets::default())
            .err()
            .unwrap();
        assert!(matches!(err, AnalysisError::MissingCredential { .. }));
    }

    #[test]
    fn gemini_with_key_resolves_natively() {
        let service =
            resolve_service(&AnalyzerConfig::default(), &Secrets::with_api_key("k")).unwrap();
        assert_eq!(service.provider(), "gemini");
        assert_eq!(service.model(), "gemini-2.0-flash");
    }
}
