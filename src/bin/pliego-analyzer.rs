//! CLI binary for pliego-analyzer.
//!
//! `serve` runs the web upload form; `analyze` runs one document from the
//! terminal. Both are thin shims that map flags to `AnalyzerConfig`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pliego_analyzer::pipeline::extract::{extract_text, PdfiumBackend};
use pliego_analyzer::pipeline::{input, upload};
use pliego_analyzer::{
    server, AnalysisProgressCallback, Analyzer, AnalyzerConfig, NoopProgressCallback,
    ProgressCallback, Secrets,
};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a page bar during extraction, then a spinner while the
/// model answers, with failed attempts printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Extracting");
        self.bar.set_message("");
    }

    fn on_page_extracted(&self, _page_num: usize, _total_pages: usize, _chars: usize) {
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, total_chars: usize) {
        self.bar.println(format!(
            "{} Texto extraído: ~{} caracteres {}",
            green("✓"),
            bold(&total_chars.to_string()),
            dim(&format!("({total_pages} pages)")),
        ));
    }

    fn on_generation_start(&self, _max_attempts: u32) {
        self.bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        self.bar.set_prefix("Analysing");
        self.bar.set_message("waiting for the model…");
        self.bar.reset_elapsed();
    }

    fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, reason: &str) {
        let msg = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} Attempt {}/{} failed: {}",
            yellow("⚠"),
            attempt,
            max_attempts,
            dim(&msg)
        ));
    }

    fn on_generation_complete(&self, attempts: u32, succeeded: bool) {
        self.bar.finish_and_clear();
        if succeeded {
            eprintln!("{} Answer received ({} attempt(s))", green("✔"), attempts);
        } else {
            eprintln!(
                "{} No usable answer after {} attempt(s)",
                yellow("⚠"),
                attempts
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the upload form on http://127.0.0.1:8080
  pliego-analyzer serve

  # Analyse a local pliego, answer on stdout
  pliego-analyzer analyze pliego.pdf

  # Write the answer to a file
  pliego-analyzer analyze pliego.pdf -o analisis.md

  # Only show the extracted text (no API key needed)
  pliego-analyzer analyze --extract-only pliego.pdf

  # Use another provider through edgequake-llm
  pliego-analyzer analyze --provider openai --model gpt-4.1-mini pliego.pdf

CREDENTIALS:
  The Gemini client reads GENAI_API_KEY from the environment, or from
  secrets.toml (override with --secrets):

      GENAI_API_KEY = "..."

  Other providers read their own variables (OPENAI_API_KEY, ...).

ENVIRONMENT VARIABLES:
  GENAI_API_KEY           Gemini API key
  PLIEGO_PROVIDER         Provider (gemini, openai, anthropic, ollama, auto)
  PLIEGO_MODEL            Model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Analyse procurement documents (pliegos) with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pliego-analyzer",
    version,
    about = "Extract a pliego's text and have an LLM answer the key tender questions",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web upload form.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "PLIEGO_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },

    /// Analyse one local PDF or HTTP/HTTPS URL.
    Analyze {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Write the answer to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output structured JSON (AnalysisOutput) instead of the answer.
        #[arg(long)]
        json: bool,

        /// Print the extracted text and stop; no LLM call.
        #[arg(long)]
        extract_only: bool,

        /// Disable progress bar.
        #[arg(long, env = "PLIEGO_NO_PROGRESS")]
        no_progress: bool,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML file holding GENAI_API_KEY.
    #[arg(long, global = true, env = "PLIEGO_SECRETS", default_value = "secrets.toml")]
    secrets: PathBuf,

    /// LLM provider: gemini, openai, anthropic, ollama, auto.
    #[arg(long, global = true, env = "PLIEGO_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, global = true, env = "PLIEGO_MODEL")]
    model: Option<String>,

    /// Generation attempts before the fallback answer.
    #[arg(long, global = true, env = "PLIEGO_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[arg(long, global = true, env = "PLIEGO_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "PLIEGO_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "PLIEGO_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Per-request LLM timeout in seconds.
    #[arg(long, global = true, env = "PLIEGO_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PLIEGO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted upload in MiB.
    #[arg(long, global = true, env = "PLIEGO_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "PLIEGO_PASSWORD")]
    password: Option<String>,

    /// Text file with a custom prompt; must contain `{document}` once.
    #[arg(long, global = true, env = "PLIEGO_PROMPT_TEMPLATE")]
    prompt_template: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PLIEGO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PLIEGO_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = &cli.common;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar covers what INFO logs would say for `analyze`.
    let bar_active = match cli.command {
        Command::Analyze {
            json, no_progress, ..
        } => !common.quiet && !no_progress && !json,
        Command::Serve { .. } => false,
    };
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || bar_active {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    ensure_pdf_engine(common.quiet)?;

    let config = build_config(common).await?;

    match cli.command {
        Command::Serve { bind } => {
            let secrets = Secrets::load(&common.secrets).context("Failed to load secrets")?;
            let analyzer =
                Analyzer::from_config(config, &secrets).context("Failed to start analyzer")?;
            if !common.quiet {
                eprintln!("{} Listening on {}", green("◆"), bold(&format!("http://{bind}")));
            }
            server::serve(bind, Arc::new(analyzer))
                .await
                .context("Server error")?;
        }
        Command::Analyze {
            input,
            output,
            json,
            extract_only,
            no_progress,
        } => {
            let bar = (!common.quiet && !no_progress && !json).then(CliProgressCallback::new);
            let progress: ProgressCallback = match bar {
                Some(ref cb) => Arc::clone(cb) as ProgressCallback,
                None => Arc::new(NoopProgressCallback),
            };

            if extract_only {
                let text = run_extract_only(&input, &config, progress).await;
                if let Some(cb) = bar {
                    cb.bar.finish_and_clear();
                }
                return write_stdout(&text?);
            }

            let secrets = Secrets::load(&common.secrets).context("Failed to load secrets")?;
            let analyzer =
                Analyzer::from_config(config, &secrets).context("Failed to start analyzer")?;

            let result = if let Some(ref path) = output {
                analyzer.analyze_to_file(&input, path, progress).await
            } else {
                analyzer.analyze_input(&input, progress).await
            };
            let result = result.context("Analysis failed")?;

            if json {
                let rendered =
                    serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
                println!("{rendered}");
            } else if output.is_none() {
                write_stdout(&result.response)?;
            }

            if !common.quiet && !json {
                eprintln!(
                    "   {} pages  /  ~{} chars  /  {} attempt(s)  —  {}ms total{}",
                    result.stats.page_count,
                    result.stats.extracted_chars,
                    result.stats.attempts,
                    result.stats.total_duration_ms,
                    output
                        .as_ref()
                        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                        .unwrap_or_default(),
                );
            }
        }
    }

    Ok(())
}

/// Make sure a pdfium library is available before any work starts.
///
/// On the very first run the library (~30 MB) is downloaded and cached;
/// later startups only do a path check.
fn ensure_pdf_engine(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() || std::env::var_os("PDFIUM_LIB_PATH").is_some() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    // block_in_place keeps the borrowed callback valid without 'static.
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// `--extract-only`: load, stage and extract without building a generation
/// service, so no credential is needed.
async fn run_extract_only(
    input_str: &str,
    config: &AnalyzerConfig,
    progress: ProgressCallback,
) -> Result<String> {
    let loaded = input::load_input(input_str, config.download_timeout_secs)
        .await
        .context("Failed to load input")?;
    let staged = upload::stage_upload(&loaded.bytes, &loaded.filename)?;
    let extracted = extract_text(
        Arc::new(PdfiumBackend::new()),
        &staged,
        config.password.clone(),
        progress,
    )
    .await
    .context("Failed to extract text")?;

    Ok(extracted.text)
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_text(&mut handle, text)
}

/// Write `text`, ensuring a trailing newline.
fn write_text(out: &mut impl Write, text: &str) -> Result<()> {
    out.write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")
            .context("Failed to write to stdout")?;
    }
    Ok(())
}

/// Map CLI args to `AnalyzerConfig`.
async fn build_config(args: &CommonArgs) -> Result<AnalyzerConfig> {
    let mut builder = AnalyzerConfig::builder()
        .max_attempts(args.max_attempts)
        .retry_delay_ms(args.retry_delay_ms)
        .request_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref path) = args.prompt_template {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt template from {:?}", path))?;
        builder = builder.prompt_template(template);
    }

    builder.build().context("Invalid configuration")
}
