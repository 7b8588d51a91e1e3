//! `edgequake-llm` adapter: any chat provider the library supports.
//!
//! Used for every provider other than the native Gemini client. The provider
//! library already normalises responses into a single completion string, so
//! the shape check here is simply "the completion has non-blank content".

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, ServiceError};
use crate::service::{GenerationService, Reply};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Wraps an `edgequake-llm` provider as a [`GenerationService`].
pub struct ProviderService {
    provider: Arc<dyn LLMProvider>,
    provider_name: String,
    model: String,
    options: CompletionOptions,
}

impl ProviderService {
    /// Wrap an already constructed provider.
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        provider_name: impl Into<String>,
        config: &AnalyzerConfig,
    ) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
            model: config.model.clone(),
            options: build_options(config),
        }
    }

    /// Resolve the provider named in `config`.
    ///
    /// 1. **`"auto"`** with `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` both
    ///    set: that pair is used.
    /// 2. **`"auto"`** otherwise: `ProviderFactory::from_env` scans the known
    ///    API key variables and picks the first available provider.
    /// 3. **Any other name**: `ProviderFactory::create_llm_provider(name, model)`,
    ///    which reads the provider's own key variable (`OPENAI_API_KEY`, ...).
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let name = config.provider_name.trim();

        if !name.eq_ignore_ascii_case("auto") {
            let provider = create_provider(name, &config.model)?;
            return Ok(Self::new(provider, name, config));
        }

        if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                let provider = create_provider(&prov, &model)?;
                let mut service = Self::new(provider, prov, config);
                service.model = model;
                return Ok(service);
            }
        }

        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| AnalysisError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                    Error: {}",
                    e
                ),
            })?;

        let mut service = Self::new(llm_provider, "auto", config);
        service.model = "auto".to_string();
        Ok(service)
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AnalysisError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        AnalysisError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Build `CompletionOptions` from the analyzer config.
fn build_options(config: &AnalyzerConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

/// Shape check for a provider completion.
fn completion_reply(content: String) -> Reply {
    if content.trim().is_empty() {
        Reply::Unusable("completion has no text content".to_string())
    } else {
        Reply::Text(content)
    }
}

#[async_trait]
impl GenerationService for ProviderService {
    fn provider(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Reply, ServiceError> {
        let messages = vec![ChatMessage::user(prompt)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ServiceError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.provider_name, response.prompt_tokens, response.completion_tokens
        );

        Ok(completion_reply(response.content))
    }
}
