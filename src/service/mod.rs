//! Remote text-generation services.
//!
//! A [`GenerationService`] performs exactly one request per call. It does not
//! retry; that policy lives in [`crate::pipeline::generate`]. What each
//! adapter does own is the *shape check*: deciding whether a reply that
//! arrived without a transport error actually contains usable text.
//!
//! | Adapter | Backend | Shape check |
//! |---------|---------|-------------|
//! | [`gemini::GeminiService`] | Generative Language `generateContent` | first candidate has a text part |
//! | [`llm::ProviderService`]  | any `edgequake-llm` provider | non-blank completion content |

pub mod gemini;
pub mod llm;

use crate::error::ServiceError;
use async_trait::async_trait;

/// Outcome of one successful round-trip to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The reply had the expected shape; this is its text, untrimmed.
    Text(String),
    /// The reply arrived but carried no usable text (no candidates, empty
    /// content, blocked by a safety filter, ...). The string says why.
    Unusable(String),
}

/// One remote "generate text from prompt" call.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Short provider label for logs and stats (e.g. `"gemini"`).
    fn provider(&self) -> &str;

    /// Model identifier the service sends requests to.
    fn model(&self) -> &str;

    /// Send `prompt` once.
    async fn generate(&self, prompt: &str) -> Result<Reply, ServiceError>;
}
