//! Error taxonomy for the chain layer.

use crate::gateway::ProviderError;
use crate::persona::Persona;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Requested persona is not part of the closed set (or not carried by
    /// the prompt store). Surfaced to the caller, never retried.
    #[error("Unknown persona type: {persona_type}. Available types: {available}")]
    UnknownPersonaType {
        persona_type: String,
        available: String,
    },

    /// The model endpoint failed: timeout, bad response, exhausted retries.
    #[error("upstream error: {0}")]
    Upstream(#[from] ProviderError),

    /// A batch item without a persona or a message.
    #[error("Missing personaType or userInput")]
    MalformedBatchEntry,

    #[error("configuration error: {0}")]
    Config(String),
}

impl ChainError {
    pub fn unknown_persona(persona_type: impl Into<String>) -> Self {
        Self::unknown_persona_among(persona_type, &Persona::ALL)
    }

    /// Unknown persona relative to a narrower set, e.g. what a prompt store
    /// was configured with.
    pub fn unknown_persona_among(persona_type: impl Into<String>, available: &[Persona]) -> Self {
        let available = available
            .iter()
            .map(Persona::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self::UnknownPersonaType {
            persona_type: persona_type.into(),
            available,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Endpoint request id, when the failure came back from the endpoint.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Upstream(err) => err.request_id(),
            _ => None,
        }
    }
}
