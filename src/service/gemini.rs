//! Native client for the Generative Language `generateContent` endpoint.
//!
//! Gemini is called directly over HTTP rather than through a provider
//! abstraction so the raw payload is available for the shape check: a reply
//! only counts when its first candidate carries content parts with text.
//! Prompt-level blocks (`promptFeedback.blockReason`) and empty candidates
//! come back as HTTP 200, which is exactly the "well-formed but unusable"
//! case the retry loop must not mistake for success.

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, ServiceError};
use crate::service::{GenerationService, Reply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Error bodies longer than this are cut before being logged.
const MAX_ERROR_BODY: usize = 500;

/// `generateContent` adapter.
pub struct GeminiService {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    generation_config: Option<GenerationConfig>,
}

impl std::fmt::Debug for GeminiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiService")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GeminiService {
    /// Build a client from the analyzer configuration and the process credential.
    pub fn from_config(config: &AnalyzerConfig, api_key: &str) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AnalysisError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: format!("HTTP client could not be built: {e}"),
            })?;

        let generation_config = if config.temperature.is_some() || config.max_tokens.is_some() {
            Some(GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
            })
        } else {
            None
        };

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.gemini_base_url.trim_end_matches('/'),
                config.model
            ),
            generation_config,
        })
    }
}

#[async_trait]
impl GenerationService for GeminiService {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Reply, ServiceError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: self.generation_config.clone(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: truncate(&raw, MAX_ERROR_BODY),
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&raw).map_err(|e| ServiceError::Decode(e.to_string()))?;

        if let Some(ref usage) = parsed.usage_metadata {
            debug!(
                "gemini usage: {} prompt tokens, {} candidate tokens",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        Ok(candidate_text(&parsed))
    }
}

/// Apply the shape check to a decoded response.
///
/// Text parts of the first candidate are concatenated; a candidate with no
/// parts, or parts with no text, is unusable.
fn candidate_text(response: &GenerateContentResponse) -> Reply {
    let Some(candidate) = response.candidates.first() else {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
            .map(|r| format!("no candidates (prompt blocked: {r})"))
            .unwrap_or_else(|| "no candidates in response".to_string());
        return Reply::Unusable(reason);
    };

    let finish = candidate.finish_reason.as_deref().unwrap_or("unknown");

    let parts = match candidate.content {
        Some(ref content) if !content.parts.is_empty() => &content.parts,
        _ => {
            return Reply::Unusable(format!(
                "candidate has no content parts (finish reason: {finish})"
            ))
        }
    };

    let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if text.trim().is_empty() {
        return Reply::Unusable(format!(
            "candidate content has no text (finish reason: {finish})"
        ));
    }

    Reply::Text(text)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}\u{2026}")
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn decode(v: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(v).unwrap()
    }

    fn service_for(server: &MockServer) -> GeminiService {
        let config = AnalyzerConfig::builder()
            .gemini_base_url(server.uri())
            .request_timeout_secs(5)
            .build()
            .unwrap();
        GeminiService::from_config(&config, "test-key").unwrap()
    }

    #[test]
    fn shape_first_candidate_text() {
        let r = decode(json!({
            "candidates": [
                {"content": {"parts": [{"text": "## Nombre\n"}, {"text": "Soporte"}], "role": "model"},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }));
        assert_eq!(candidate_text(&r), Reply::Text("## Nombre\nSoporte".into()));
    }

    #[test]
    fn shape_no_candidates() {
        let r = decode(json!({"candidates": []}));
        assert!(matches!(candidate_text(&r), Reply::Unusable(_)));
    }

    #[test]
    fn shape_prompt_blocked_reason_reported() {
        let r = decode(json!({"promptFeedback": {"blockReason": "SAFETY"}}));
        match candidate_text(&r) {
            Reply::Unusable(reason) => assert!(reason.contains("SAFETY"), "got: {reason}"),
            other => panic!("expected unusable, got {other:?}"),
        }
    }

    #[test]
    fn shape_candidate_without_parts() {
        let r = decode(json!({"candidates": [{"finishReason": "MAX_TOKENS", "content": {"role": "model"}}]}));
        match candidate_text(&r) {
            Reply::Unusable(reason) => assert!(reason.contains("MAX_TOKENS"), "got: {reason}"),
            other => panic!("expected unusable, got {other:?}"),
        }
    }

    #[test]
    fn shape_parts_without_text() {
        let r = decode(json!({"candidates": [{"content": {"parts": [{"inlineData": {}}]}}]}));
        assert!(matches!(candidate_text(&r), Reply::Unusable(_)));
    }

    #[test]
    fn request_serialises_camel_case() {
        let req = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: Some("hola".into()),
                }],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.2),
                max_output_tokens: None,
            }),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hola");
        assert!(v["generationConfig"]["temperature"].is_number());
        assert!(v["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn truncate_long_bodies() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc\u{2026}");
    }

    #[tokio::test]
    async fn success_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Analiza esto"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "  Resultado  "}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = service_for(&server).generate("Analiza esto").await.unwrap();
        assert_eq!(reply, Reply::Text("  Resultado  ".into()));
    }

    #[tokio::test]
    async fn http_error_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = service_for(&server).generate("x").await.unwrap_err();
        match err {
            ServiceError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let err = service_for(&server).generate("x").await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
    }

    #[tokio::test]
    async fn empty_candidates_are_unusable_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let reply = service_for(&server).generate("x").await.unwrap();
        assert!(matches!(reply, Reply::Unusable(_)));
    }

    #[test]
    fn debug_hides_key() {
        let config = AnalyzerConfig::default();
        let svc = GeminiService::from_config(&config, "secret-key").unwrap();
        assert!(!format!("{svc:?}").contains("secret-key"));
        assert_eq!(svc.provider(), "gemini");
        assert_eq!(svc.model(), "gemini-2.0-flash");
    }
}
