//! Process configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ChainError;
use crate::gateway::openai_compat::{OpenAiCompatAdapter, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::gateway::{GatewayConfig, ModelConfig, ProviderGateway};
use crate::prompts::StaticPromptStore;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: ModelConfig,
    pub timeout: Duration,
    pub gateway: GatewayConfig,
    /// JSON file of prompt overrides, see [`crate::prompts::PromptOverrides`].
    pub prompts_path: Option<PathBuf>,
}

impl RouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: ModelConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            gateway: GatewayConfig::default(),
            prompts_path: None,
        }
    }

    pub fn from_env() -> Result<Self, ChainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ChainError> {
        let api_key = lookup("GROQ_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ChainError::config("GROQ_API_KEY not set"))?;

        let mut config = Self::new(api_key);

        if let Some(url) = lookup("GROQ_BASE_URL") {
            config.base_url = url;
        }
        if let Some(model) = lookup("GROQ_MODEL") {
            config.model.model = model;
        }
        if let Some(t) = parse_var::<f32>(&lookup, "LLM_TEMPERATURE")? {
            if !(0.0..=2.0).contains(&t) {
                return Err(ChainError::config("LLM_TEMPERATURE must be in [0, 2]"));
            }
            config.model.temperature = t;
        }
        if let Some(n) = parse_var::<u32>(&lookup, "LLM_MAX_TOKENS")? {
            if n == 0 {
                return Err(ChainError::config("LLM_MAX_TOKENS must be >= 1"));
            }
            config.model.max_tokens = n;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LLM_TIMEOUT_SECONDS")? {
            if secs == 0 {
                return Err(ChainError::config("LLM_TIMEOUT_SECONDS must be >= 1"));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "LLM_MAX_RETRIES")? {
            config.gateway.max_retries = retries;
        }
        config.prompts_path = lookup("PERSONA_PROMPTS_PATH").map(PathBuf::from);

        Ok(config)
    }

    pub fn build_gateway(&self) -> Result<Arc<ProviderGateway>, ChainError> {
        let adapter = OpenAiCompatAdapter::with_config(&self.api_key, &self.base_url, self.timeout)
            .map_err(|e| ChainError::config(e.to_string()))?;
        Ok(Arc::new(ProviderGateway::with_config(
            adapter,
            self.model.clone(),
            self.gateway.clone(),
        )))
    }

    pub fn build_prompt_store(&self) -> Result<Arc<StaticPromptStore>, ChainError> {
        let store = match &self.prompts_path {
            Some(path) => StaticPromptStore::load_from_path(path)?,
            None => StaticPromptStore::default(),
        };
        Ok(Arc::new(store))
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ChainError>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ChainError::config(format!("invalid {key}={raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = RouterConfig::from_lookup(lookup_from(&[("GROQ_API_KEY", "gsk-test")])).unwrap();
        assert_eq!(config.api_key, "gsk-test");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model.model, "llama-3.1-8b-instant");
        assert!((config.model.temperature - 0.7).abs() < 1e-6);
        assert_eq!(config.model.max_tokens, 1000);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.gateway.max_retries, 2);
        assert!(config.prompts_path.is_none());
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = RouterConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = RouterConfig::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "gsk-test"),
            ("GROQ_MODEL", "llama-3.3-70b-versatile"),
            ("LLM_TEMPERATURE", "0.2"),
            ("LLM_MAX_TOKENS", "512"),
            ("LLM_TIMEOUT_SECONDS", "10"),
            ("LLM_MAX_RETRIES", "0"),
            ("PERSONA_PROMPTS_PATH", "/etc/prompts.json"),
        ]))
        .unwrap();

        assert_eq!(config.model.model, "llama-3.3-70b-versatile");
        assert!((config.model.temperature - 0.2).abs() < 1e-6);
        assert_eq!(config.model.max_tokens, 512);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.gateway.max_retries, 0);
        assert_eq!(config.prompts_path, Some(PathBuf::from("/etc/prompts.json")));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        for (key, value) in [
            ("LLM_TEMPERATURE", "warm"),
            ("LLM_TEMPERATURE", "3.5"),
            ("LLM_MAX_TOKENS", "0"),
            ("LLM_TIMEOUT_SECONDS", "-1"),
            ("LLM_MAX_RETRIES", "many"),
        ] {
            let result =
                RouterConfig::from_lookup(lookup_from(&[("GROQ_API_KEY", "k"), (key, value)]));
            assert!(result.is_err(), "{key}={value} should be rejected");
        }
    }
}
