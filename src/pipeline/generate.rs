//! Bounded-retry generation: the one call in the pipeline allowed to fail.
//!
//! ## Retry Strategy
//!
//! A fixed number of attempts (3 by default) with a fixed delay (1 s) between
//! them. No exponential backoff and no jitter: this runs once per user upload,
//! not under fan-out load, so the only goal is riding out a short blip
//! without making the user wait long.
//!
//! An attempt fails when the service errors *or* when its reply does not pass
//! the adapter's shape check ([`Reply::Unusable`]). After the last failed
//! attempt the caller receives [`FALLBACK_RESPONSE`] as an ordinary string;
//! nothing is ever propagated as an error. Check
//! [`Generation::succeeded`] or [`is_fallback_response`] to tell them apart.

use crate::progress::{AnalysisProgressCallback, NoopProgressCallback};
use crate::service::{GenerationService, Reply};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Returned verbatim when every attempt fails.
pub const FALLBACK_RESPONSE: &str =
    "No se pudo generar una respuesta. Por favor, intenta con otro documento.";

/// Whether `text` is the fallback literal.
pub fn is_fallback_response(text: &str) -> bool {
    text == FALLBACK_RESPONSE
}

/// Waits between attempts. Injected so tests run without wall-clock sleeps.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Production delay: `tokio::time::sleep`.
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of [`RetryingGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    /// Trimmed answer text, or [`FALLBACK_RESPONSE`].
    pub text: String,
    /// Attempts actually made.
    pub attempts: u32,
    /// `false` means `text` is the fallback.
    pub succeeded: bool,
}

impl Generation {
    pub fn is_fallback(&self) -> bool {
        !self.succeeded
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Wraps a [`GenerationService`] with the bounded retry loop.
pub struct RetryingGenerator {
    service: Arc<dyn GenerationService>,
    delay: Arc<dyn Delay>,
    retry_delay: Duration,
}

impl RetryingGenerator {
    /// Retry `service` with `retry_delay` between attempts, sleeping on Tokio's timer.
    pub fn new(service: Arc<dyn GenerationService>, retry_delay: Duration) -> Self {
        Self {
            service,
            delay: Arc::new(TokioDelay),
            retry_delay,
        }
    }

    /// Replace the delay implementation.
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn service(&self) -> &Arc<dyn GenerationService> {
        &self.service
    }

    /// Generate an answer for `prompt` with up to `max_attempts` attempts.
    ///
    /// `max_attempts` below 1 is treated as 1.
    pub async fn generate(&self, prompt: &str, max_attempts: u32) -> Generation {
        self.generate_observed(prompt, max_attempts, &NoopProgressCallback)
            .await
    }

    /// Like [`generate`](Self::generate), reporting each failed attempt to `progress`.
    pub async fn generate_observed(
        &self,
        prompt: &str,
        max_attempts: u32,
        progress: &dyn AnalysisProgressCallback,
    ) -> Generation {
        let max_attempts = max_attempts.max(1);
        progress.on_generation_start(max_attempts);

        for attempt in 1..=max_attempts {
            debug!(
                "Generation attempt {}/{} via {} ({})",
                attempt,
                max_attempts,
                self.service.provider(),
                self.service.model()
            );

            let failure = match self.service.generate(prompt).await {
                Ok(Reply::Text(text)) => {
                    progress.on_generation_complete(attempt, true);
                    return Generation {
                        text: text.trim().to_string(),
                        attempts: attempt,
                        succeeded: true,
                    };
                }
                Ok(Reply::Unusable(reason)) => format!("unusable response: {reason}"),
                Err(e) => e.to_string(),
            };

            warn!(
                "Generation attempt {}/{} failed: {}",
                attempt, max_attempts, failure
            );
            progress.on_attempt_failed(attempt, max_attempts, &failure);

            if attempt < max_attempts {
                self.delay.wait(self.retry_delay).await;
            }
        }

        progress.on_generation_complete(max_attempts, false);
        Generation {
            text: FALLBACK_RESPONSE.to_string(),
            attempts: max_attempts,
            succeeded: false,
        }
    }
}
