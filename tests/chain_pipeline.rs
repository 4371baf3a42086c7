use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use persona_router::gateway::{ChatGateway, ChatResponse, Message, ProviderError};
use persona_router::{Chain, ChainOptions, Persona};

const DISCLAIMER_ISSUE: &str = "Missing professional consultation disclaimer";

/// Sleeps, then returns a fixed completion.
struct SlowReply {
    delay: Duration,
    reply: String,
}

#[async_trait]
impl ChatGateway for SlowReply {
    async fn complete(&self, _messages: Vec<Message>) -> Result<ChatResponse, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(ChatResponse::text(self.reply.clone()))
    }
}

/// Fails every call with a retryable upstream error.
struct Unavailable;

#[async_trait]
impl ChatGateway for Unavailable {
    async fn complete(&self, _messages: Vec<Message>) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::unavailable("HTTP 503"))
    }
}

fn chain_with(persona: Persona, gateway: impl ChatGateway + 'static) -> Chain {
    Chain::new(
        persona,
        format!("You are the {} assistant.", persona.display_name()),
        Arc::new(gateway),
        ChainOptions::default(),
    )
}

#[tokio::test]
async fn medical_reply_without_disclaimer_succeeds_with_advisory_issue() {
    let chain = chain_with(
        Persona::Medical,
        SlowReply {
            delay: Duration::from_millis(20),
            reply: "See a doctor if it persists".to_string(),
        },
    );

    let result = chain.invoke("I have a headache", None).await;

    assert!(result.success);
    assert_eq!(result.persona_type, "medical");
    assert_eq!(
        result.response.as_deref(),
        Some("See a doctor if it persists.")
    );
    assert!(result.error.is_none());
    assert!(result.duration_seconds > 0.0);
    assert!(!result.timestamp.is_empty());

    let validation = result.validation.expect("successful result carries validation");
    assert!(validation.is_valid);
    assert_eq!(validation.issues, vec![DISCLAIMER_ISSUE.to_string()]);

    let metrics = chain.metrics();
    assert_eq!(metrics.total_invocations, 1);
    assert_eq!(metrics.successful_invocations, 1);
    assert!(metrics.last_invocation.is_some());
}

#[tokio::test]
async fn same_reply_for_non_sensitive_persona_has_no_disclaimer_issue() {
    let chain = chain_with(
        Persona::Career,
        SlowReply {
            delay: Duration::ZERO,
            reply: "See a doctor if it persists".to_string(),
        },
    );

    let result = chain.invoke("I have a headache", None).await;
    let validation = result.validation.unwrap();
    assert!(validation.issues.is_empty());
}

#[tokio::test]
async fn upstream_failure_becomes_envelope_and_counts_as_failed() {
    let chain = chain_with(Persona::Legal, Unavailable);

    let result = chain.invoke("Can my landlord evict me?", None).await;

    assert!(!result.success);
    assert_eq!(result.persona_type, "legal");
    assert!(result.response.is_none());
    assert!(result.validation.is_none());
    assert!(result.error.unwrap().contains("HTTP 503"));

    let metrics = chain.metrics();
    assert_eq!(metrics.total_invocations, 1);
    assert_eq!(metrics.successful_invocations, 0);
}

#[tokio::test]
async fn metrics_average_tracks_every_invocation() {
    let chain = chain_with(
        Persona::Finance,
        SlowReply {
            delay: Duration::from_millis(5),
            reply: "Pay yourself first!".to_string(),
        },
    );

    let mut durations = Vec::new();
    for _ in 0..4 {
        let result = chain.invoke("How do I save?", None).await;
        assert!(result.success);
        durations.push(result.duration_seconds);
    }

    let metrics = chain.metrics();
    let sum: f64 = durations.iter().sum();
    assert_eq!(metrics.total_invocations, 4);
    assert_eq!(metrics.successful_invocations, 4);
    assert!((metrics.total_duration_seconds - sum).abs() < 1e-9);
    assert!((metrics.average_duration_seconds - sum / 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn concurrent_invocations_lose_no_metric_updates() {
    let chain = Arc::new(chain_with(
        Persona::Developer,
        SlowReply {
            delay: Duration::from_millis(2),
            reply: "Use a borrow, not a clone".to_string(),
        },
    ));

    let mut handles = Vec::new();
    for i in 0..32 {
        let chain = Arc::clone(&chain);
        handles.push(tokio::spawn(async move {
            chain.invoke(&format!("question {i}"), None).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    let metrics = chain.metrics();
    assert_eq!(metrics.total_invocations, 32);
    assert_eq!(metrics.successful_invocations, 32);
    assert!(
        (metrics.average_duration_seconds - metrics.total_duration_seconds / 32.0).abs() < 1e-12
    );
}

#[tokio::test]
async fn overlong_reply_is_truncated_in_the_envelope() {
    let chain = chain_with(
        Persona::Entertainment,
        SlowReply {
            delay: Duration::ZERO,
            reply: "word ".repeat(600),
        },
    );

    let result = chain.invoke("Recommend a movie", None).await;
    let response = result.response.unwrap();

    assert!(response.ends_with("... [Response truncated for length]"));
    assert!(response.chars().count() <= 2000);
    assert!(result
        .validation
        .unwrap()
        .issues
        .contains(&"Response too long".to_string()));
}
