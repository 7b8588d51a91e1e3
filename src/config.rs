//! Configuration types for pliego analysis.
//!
//! All behaviour is controlled through [`AnalyzerConfig`], built via its
//! [`AnalyzerConfigBuilder`], plus the [`Secrets`] holding the API
//! credential. Both are read once at process start and never mutated; the
//! [`crate::Analyzer`] that owns them is shared read-only across requests.

use crate::error::AnalysisError;
use crate::prompts::DOCUMENT_PLACEHOLDER;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default secrets file, relative to the working directory.
pub const DEFAULT_SECRETS_PATH: &str = "secrets.toml";

/// Name of the credential, both as TOML key and environment variable.
pub const API_KEY_VAR: &str = "GENAI_API_KEY";

/// Configuration for analysing pliegos.
///
/// # Example
/// ```rust
/// use pliego_analyzer::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .model("gemini-2.0-flash")
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.retry_delay_ms, 1000);
/// ```
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// LLM provider name. Default: `"gemini"`.
    ///
    /// `"gemini"` uses the built-in `generateContent` client with the
    /// credential from [`Secrets`]. `"auto"` lets `edgequake-llm` detect a
    /// provider from the environment. Any other name (`"openai"`,
    /// `"anthropic"`, `"ollama"`, ...) is created through
    /// `edgequake_llm::ProviderFactory`, which reads its own API key variable.
    pub provider_name: String,

    /// Model identifier. Default: `"gemini-2.0-flash"`.
    pub model: String,

    /// Generation attempts per document before returning the fallback. Default: 3.
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds. Default: 1000.
    pub retry_delay_ms: u64,

    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,

    /// Maximum output tokens. `None` leaves the provider default.
    pub max_tokens: Option<usize>,

    /// Timeout applied to each generation HTTP call, in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom prompt template. Must contain exactly one `{document}`.
    pub prompt_template: Option<String>,

    /// Base URL of the Generative Language API.
    pub gemini_base_url: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider_name: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            max_attempts: 3,
            retry_delay_ms: 1000,
            temperature: None,
            max_tokens: None,
            request_timeout_secs: 120,
            download_timeout_secs: 120,
            max_upload_bytes: 50 * 1024 * 1024,
            password: None,
            prompt_template: None,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("prompt_template", &self.prompt_template.is_some())
            .field("gemini_base_url", &self.gemini_base_url)
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
            model_set: false,
        }
    }

    /// Whether the native Gemini client (and therefore `GENAI_API_KEY`) is used.
    pub fn uses_native_gemini(&self) -> bool {
        self.provider_name.eq_ignore_ascii_case("gemini")
    }
}

/// Model used when a provider is chosen without an explicit model.
///
/// Returns `None` for providers with no sensible default (`ollama`, `azure`,
/// OpenAI-compatible endpoints), which must be given a model.
pub fn default_model_for(provider: &str) -> Option<&'static str> {
    match provider.trim().to_ascii_lowercase().as_str() {
        "gemini" => Some("gemini-2.0-flash"),
        "openai" => Some("gpt-4.1-nano"),
        "anthropic" => Some("claude-sonnet-4-20250514"),
        // resolved from EDGEQUAKE_MODEL or provider detection
        "auto" => Some("auto"),
        _ => None,
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
    model_set: bool,
}

impl AnalyzerConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self.model_set = true;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Without an explicit [`model`](Self::model), the provider's default
    /// model is used; providers without one are rejected.
    pub fn build(mut self) -> Result<AnalyzerConfig, AnalysisError> {
        if !self.model_set {
            let provider = self.config.provider_name.as_str();
            let model = default_model_for(provider).ok_or_else(|| {
                AnalysisError::InvalidConfig(format!(
                    "provider '{provider}' has no default model; set one with --model"
                ))
            })?;
            self.config.model = model.to_string();
        }
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if let Some(ref template) = c.prompt_template {
            let count = template.matches(DOCUMENT_PLACEHOLDER).count();
            if count != 1 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "prompt template must contain exactly one {DOCUMENT_PLACEHOLDER}, found {count}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Secrets ──────────────────────────────────────────────────────────────

/// Process-wide secret values, loaded once at startup.
#[derive(Clone, Default)]
pub struct Secrets {
    api_key: Option<String>,
    source: Option<PathBuf>,
}

#[derive(Deserialize)]
struct SecretsFile {
    #[serde(rename = "GENAI_API_KEY")]
    genai_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .finish()
    }
}

impl Secrets {
    /// Secrets holding just the given key.
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            source: None,
        }
    }

    /// Load the credential from `GENAI_API_KEY` or, failing that, from the
    /// TOML file at `path`. A missing file is not an error; an unreadable or
    /// malformed one is.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let env_key = std::env::var(API_KEY_VAR).ok();
        Self::resolve(path, env_key)
    }

    fn resolve(path: &Path, env_key: Option<String>) -> Result<Self, AnalysisError> {
        if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
            tracing::debug!("Using {} from environment", API_KEY_VAR);
            return Ok(Self::with_api_key(key.trim()));
        }

        if !path.exists() {
            tracing::debug!("No secrets file at {}", path.display());
            return Ok(Self {
                api_key: None,
                source: Some(path.to_path_buf()),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| AnalysisError::SecretsUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let parsed: SecretsFile =
            toml::from_str(&raw).map_err(|e| AnalysisError::SecretsUnreadable {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        tracing::debug!("Loaded secrets from {}", path.display());
        Ok(Self {
            api_key: parsed
                .genai_api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            source: Some(path.to_path_buf()),
        })
    }

    /// The API key, if one was configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// The API key, or [`AnalysisError::MissingCredential`].
    pub fn require_api_key(&self) -> Result<&str, AnalysisError> {
        self.api_key().ok_or_else(|| AnalysisError::MissingCredential {
            secrets_path: self
                .source
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_PATH)),
        })
    }
}
