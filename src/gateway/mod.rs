//! Model gateway: one hosted chat-completion endpoint behind a bounded
//! timeout and a bounded retry budget.

pub mod error;
pub mod openai_compat;
pub mod types;

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use openai_compat::{ChatProvider, OpenAiCompatAdapter};

pub use error::{ErrorContext, ProviderError};
pub use types::*;

/// The remote capability every chain talks to: role-tagged messages in,
/// a text completion out.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn complete(&self, messages: Vec<Message>) -> Result<ChatResponse, ProviderError>;
}

/// Sampling settings applied to every request.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

pub struct ProviderGateway {
    adapter: OpenAiCompatAdapter,
    model: ModelConfig,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl ChatGateway for ProviderGateway {
    async fn complete(&self, messages: Vec<Message>) -> Result<ChatResponse, ProviderError> {
        let req = ChatRequest::new(self.model.model.clone(), messages)
            .temperature(self.model.temperature)
            .max_tokens(self.model.max_tokens);
        self.chat(&req).await
    }
}

impl ProviderGateway {
    pub fn with_config(
        adapter: OpenAiCompatAdapter,
        model: ModelConfig,
        config: GatewayConfig,
    ) -> Self {
        Self {
            adapter,
            model,
            config,
        }
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.adapter.chat(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }

                    let delay = retry_delay(&err, self.config.retry_base_delay, attempt);
                    debug!(
                        model = %req.model,
                        attempt,
                        code = err.code(),
                        ?delay,
                        "retrying chat completion"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Exponential backoff, stretched to the endpoint's `Retry-After` hint when
/// that is longer.
fn retry_delay(err: &ProviderError, base: Duration, attempt: u32) -> Duration {
    let backoff = backoff_delay(base, attempt);
    err.retry_after().map_or(backoff, |hint| hint.max(backoff))
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, 9), Duration::from_millis(3200));
    }

    #[test]
    fn rate_limit_hint_extends_backoff() {
        let base = Duration::from_millis(100);
        let limited = ProviderError::from_status(
            429,
            "slow down",
            Duration::from_secs(2),
            ErrorContext::from_status(429),
        );
        assert_eq!(retry_delay(&limited, base, 0), Duration::from_secs(2));
        assert_eq!(
            retry_delay(&limited, Duration::from_secs(1), 2),
            Duration::from_secs(4)
        );

        let unavailable = ProviderError::unavailable("HTTP 503");
        assert_eq!(retry_delay(&unavailable, base, 1), Duration::from_millis(200));
    }
}
