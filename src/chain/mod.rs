//! Persona chains: one system prompt bound to the shared model gateway.
//!
//! `Chain::invoke` runs the whole per-message pipeline:
//! 1. Build `[system, user]` messages (context folded into the user turn).
//! 2. Call the gateway. This is the only suspension point.
//! 3. Tidy the completion and validate it for the persona.
//! 4. Record metrics and wrap everything in an [`InvocationResult`].
//!
//! Failures never escape: they come back as envelopes with `success: false`.

pub mod metrics;
pub mod validator;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChainError;
use crate::gateway::{ChatGateway, ChatResponse, FinishReason, Message};
use crate::persona::Persona;

pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use validator::{validate, ValidationReport};

/// Free-form key/value context attached to a chat request.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Uniform result of every chat pathway, including failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,
    pub response: Option<String>,
    pub persona_type: String,
    pub error: Option<String>,
    pub validation: Option<ValidationReport>,
    pub duration_seconds: f64,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl InvocationResult {
    pub fn succeeded(persona: Persona, validation: ValidationReport, duration_seconds: f64) -> Self {
        Self {
            success: true,
            response: Some(validation.formatted_response.clone()),
            persona_type: persona.as_str().to_string(),
            error: None,
            validation: Some(validation),
            duration_seconds,
            timestamp: now_rfc3339(),
        }
    }

    pub fn failed(
        persona_type: impl Into<String>,
        error: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            success: false,
            response: None,
            persona_type: persona_type.into(),
            error: Some(error.into()),
            validation: None,
            duration_seconds,
            timestamp: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Clone)]
pub struct ChainOptions {
    /// Fold request context into the user turn as a `Context:` block.
    pub include_context: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            include_context: true,
        }
    }
}

pub struct Chain {
    persona: Persona,
    system_prompt: String,
    gateway: Arc<dyn ChatGateway>,
    options: ChainOptions,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("persona", &self.persona)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Chain {
    pub fn new(
        persona: Persona,
        system_prompt: impl Into<String>,
        gateway: Arc<dyn ChatGateway>,
        options: ChainOptions,
    ) -> Self {
        Self {
            persona,
            system_prompt: system_prompt.into(),
            gateway,
            options,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// This chain's counters; zeroed if it has never been invoked.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.persona).unwrap_or_default()
    }

    pub async fn invoke(&self, user_input: &str, context: Option<&Context>) -> InvocationResult {
        let start = Instant::now();
        let messages = self.build_messages(user_input, context);
        let outcome = self
            .gateway
            .complete(messages)
            .await
            .map_err(ChainError::from);
        self.finish(start, outcome)
    }

    /// Same pipeline as [`Chain::invoke`], driven to completion on a private
    /// current-thread runtime. Calling it from inside an async runtime is a
    /// usage error and yields a failure envelope.
    pub fn invoke_blocking(&self, user_input: &str, context: Option<&Context>) -> InvocationResult {
        let start = Instant::now();
        let messages = self.build_messages(user_input, context);
        let outcome = match blocking_runtime() {
            Ok(rt) => rt
                .block_on(self.gateway.complete(messages))
                .map_err(ChainError::from),
            Err(err) => Err(err),
        };
        self.finish(start, outcome)
    }

    pub fn build_messages(&self, user_input: &str, context: Option<&Context>) -> Vec<Message> {
        let user = match context {
            Some(ctx) if self.options.include_context && !ctx.is_empty() => {
                format!("{user_input}\n\n{}", render_context(ctx))
            }
            _ => user_input.to_string(),
        };
        vec![Message::system(&self.system_prompt), Message::user(user)]
    }

    fn finish(&self, start: Instant, outcome: Result<ChatResponse, ChainError>) -> InvocationResult {
        match outcome {
            Ok(resp) => {
                debug!(
                    persona = %self.persona,
                    input_tokens = resp.input_tokens,
                    output_tokens = resp.output_tokens,
                    upstream_ms = resp.latency.as_millis() as u64,
                    finish_reason = ?resp.finish_reason,
                    "completion received"
                );
                if resp.finish_reason == FinishReason::Length {
                    warn!(persona = %self.persona, "completion cut off at max_tokens");
                }
                let formatted = format_response(&resp.content);
                let validation = validate(&formatted, self.persona);
                let duration = start.elapsed().as_secs_f64();
                self.metrics.record(self.persona, duration, true);
                InvocationResult::succeeded(self.persona, validation, duration)
            }
            Err(err) => {
                let duration = start.elapsed().as_secs_f64();
                self.metrics.record(self.persona, duration, false);
                warn!(
                    persona = %self.persona,
                    error = %err,
                    request_id = err.request_id(),
                    "chain invocation failed"
                );
                InvocationResult::failed(self.persona.as_str(), err.to_string(), duration)
            }
        }
    }
}

fn blocking_runtime() -> Result<tokio::runtime::Runtime, ChainError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(ChainError::config(
            "invoke_blocking called from within an async runtime; use invoke instead",
        ));
    }
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ChainError::config(format!("failed to start blocking runtime: {e}")))
}

/// Trim and make sure the text ends like a sentence.
pub fn format_response(raw: &str) -> String {
    let mut cleaned = raw.trim().to_string();
    if !cleaned.is_empty() && !cleaned.ends_with(['.', '!', '?']) {
        cleaned.push('.');
    }
    cleaned
}

fn render_context(ctx: &Context) -> String {
    let mut entries: Vec<(&String, &serde_json::Value)> = ctx.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::from("Context:");
    for (key, value) in entries {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("\n- {key}: {value}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ErrorContext, ProviderError};
    use serde_json::json;

    struct EchoGateway;

    #[async_trait::async_trait]
    impl ChatGateway for EchoGateway {
        async fn complete(&self, messages: Vec<Message>) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse::text(messages[1].content.clone()))
        }
    }

    fn chain(options: ChainOptions) -> Chain {
        Chain::new(Persona::Career, "You are a coach.", Arc::new(EchoGateway), options)
    }

    #[test]
    fn format_appends_period_only_when_needed() {
        assert_eq!(format_response("  Hello there  "), "Hello there.");
        assert_eq!(format_response("Done!"), "Done!");
        assert_eq!(format_response("Really?\n"), "Really?");
        assert_eq!(format_response("Fine."), "Fine.");
        assert_eq!(format_response("   "), "");
    }

    #[test]
    fn messages_are_system_then_user() {
        let msgs = chain(ChainOptions::default()).build_messages("How do I negotiate?", None);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0], Message::system("You are a coach."));
        assert_eq!(msgs[1], Message::user("How do I negotiate?"));
    }

    #[test]
    fn context_is_rendered_sorted_into_user_turn() {
        let ctx = json!({"session_id": "abc", "attempt": 2})
            .as_object()
            .cloned()
            .unwrap();
        let msgs = chain(ChainOptions::default()).build_messages("Hi", Some(&ctx));
        assert_eq!(
            msgs[1].content,
            "Hi\n\nContext:\n- attempt: 2\n- session_id: abc"
        );
    }

    #[test]
    fn context_can_be_switched_off() {
        let ctx = json!({"user_id": "1"}).as_object().cloned().unwrap();
        let msgs = chain(ChainOptions {
            include_context: false,
        })
        .build_messages("Hi", Some(&ctx));
        assert_eq!(msgs[1].content, "Hi");
    }

    #[test]
    fn blocking_invoke_runs_pipeline_outside_runtime() {
        let chain = chain(ChainOptions::default());
        let result = chain.invoke_blocking("tell me about resumes", None);

        assert!(result.success);
        assert_eq!(result.response.as_deref(), Some("tell me about resumes."));
        assert_eq!(chain.metrics().total_invocations, 1);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
        (out, logs)
    }

    struct CutOffGateway;

    #[async_trait::async_trait]
    impl ChatGateway for CutOffGateway {
        async fn complete(&self, _messages: Vec<Message>) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "Start with a one page resume and".to_string(),
                input_tokens: 12,
                output_tokens: 7,
                latency: std::time::Duration::from_millis(40),
                finish_reason: FinishReason::Length,
            })
        }
    }

    struct BadGatewayWithId;

    #[async_trait::async_trait]
    impl ChatGateway for BadGatewayWithId {
        async fn complete(&self, _messages: Vec<Message>) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::from_status(
                502,
                "HTTP 502",
                std::time::Duration::ZERO,
                ErrorContext::from_status(502).with_request_id(Some("req-9".to_string())),
            ))
        }
    }

    #[test]
    fn completion_usage_is_logged_and_cut_off_is_flagged() {
        let chain = Chain::new(
            Persona::Career,
            "You are a coach.",
            Arc::new(CutOffGateway),
            ChainOptions::default(),
        );
        let (result, logs) = capture_logs(|| chain.invoke_blocking("resume tips", None));

        assert!(result.success);
        assert!(logs.contains("input_tokens=12"), "{logs}");
        assert!(logs.contains("output_tokens=7"), "{logs}");
        assert!(logs.contains("upstream_ms=40"), "{logs}");
        assert!(logs.contains("finish_reason=Length"), "{logs}");
        assert!(logs.contains("completion cut off at max_tokens"), "{logs}");
    }

    #[test]
    fn failure_log_carries_endpoint_request_id() {
        let chain = Chain::new(
            Persona::Legal,
            "You are a legal guide.",
            Arc::new(BadGatewayWithId),
            ChainOptions::default(),
        );
        let (result, logs) = capture_logs(|| chain.invoke_blocking("Can I break my lease?", None));

        assert!(!result.success);
        assert!(result.error.unwrap().contains("HTTP 502"));
        assert!(logs.contains("chain invocation failed"), "{logs}");
        assert!(logs.contains("req-9"), "{logs}");
    }

    #[tokio::test]
    async fn blocking_invoke_inside_runtime_is_a_failure_envelope() {
        let chain = chain(ChainOptions::default());
        let result = chain.invoke_blocking("hi", None);

        assert!(!result.success);
        assert!(result.error.unwrap().contains("async runtime"));
        let metrics = chain.metrics();
        assert_eq!(metrics.total_invocations, 1);
        assert_eq!(metrics.successful_invocations, 0);
    }
}
