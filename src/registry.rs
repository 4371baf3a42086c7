//! Chain registry and concurrent batch dispatch.
//!
//! The registry is an explicitly constructed object: callers inject the
//! gateway and prompt store, so tests can swap either for a stub.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chain::{Chain, ChainOptions, Context, InvocationResult, MetricsSnapshot};
use crate::error::ChainError;
use crate::gateway::ChatGateway;
use crate::persona::Persona;
use crate::prompts::PromptStore;

/// Message sent to every registered persona by [`ChainRegistry::test_all`].
pub const SELF_TEST_MESSAGE: &str = "Hello, this is a test message. Can you respond?";

/// One item of a batch. Fields are optional so malformed entries can be
/// reported per item instead of rejecting the whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default, alias = "personaType")]
    pub persona_type: Option<String>,
    #[serde(default, alias = "userInput")]
    pub user_input: Option<String>,
    #[serde(default)]
    pub context: Option<Context>,
}

impl BatchRequest {
    pub fn new(persona_type: impl Into<String>, user_input: impl Into<String>) -> Self {
        Self {
            persona_type: Some(persona_type.into()),
            user_input: Some(user_input.into()),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }
}

/// Aggregate view of a finished batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub responses: Vec<InvocationResult>,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub total_duration_seconds: f64,
}

impl BatchSummary {
    pub fn from_results(responses: Vec<InvocationResult>) -> Self {
        let successful_requests = responses.iter().filter(|r| r.success).count();
        let total_duration_seconds = responses.iter().map(|r| r.duration_seconds).sum();
        Self {
            total_requests: responses.len(),
            successful_requests,
            total_duration_seconds,
            responses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Personas the prompt store can serve.
    pub total_registered: usize,
    /// Of those, how many have a live chain.
    pub available_count: usize,
    pub health_percentage: f64,
    pub status: OverallStatus,
    pub persona_types: Vec<String>,
}

enum Pending {
    Ready(InvocationResult),
    Running(JoinHandle<InvocationResult>),
}

pub struct ChainRegistry {
    gateway: Arc<dyn ChatGateway>,
    prompts: Arc<dyn PromptStore>,
    options: ChainOptions,
    chains: RwLock<HashMap<Persona, Arc<Chain>>>,
}

impl ChainRegistry {
    pub fn new(gateway: Arc<dyn ChatGateway>, prompts: Arc<dyn PromptStore>) -> Self {
        Self::with_options(gateway, prompts, ChainOptions::default())
    }

    pub fn with_options(
        gateway: Arc<dyn ChatGateway>,
        prompts: Arc<dyn PromptStore>,
        options: ChainOptions,
    ) -> Self {
        Self {
            gateway,
            prompts,
            options,
            chains: RwLock::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Chain lifecycle
    // =========================================================================

    /// Existing chain for `persona`, or a new one built from the prompt store.
    ///
    /// Creation is double-checked under the write lock, so concurrent first
    /// use builds exactly one chain and fetches the prompt once.
    pub fn get_or_create(&self, persona: Persona) -> Result<Arc<Chain>, ChainError> {
        if let Some(chain) = self.read().get(&persona) {
            return Ok(Arc::clone(chain));
        }

        let mut chains = self.write();
        if let Some(chain) = chains.get(&persona) {
            return Ok(Arc::clone(chain));
        }

        let prompt = self.prompts.prompt(persona)?;
        let chain = Arc::new(Chain::new(
            persona,
            prompt,
            Arc::clone(&self.gateway),
            self.options.clone(),
        ));
        chains.insert(persona, Arc::clone(&chain));
        info!(%persona, "created chain");
        Ok(chain)
    }

    pub fn get(&self, persona: Persona) -> Option<Arc<Chain>> {
        self.read().get(&persona).cloned()
    }

    /// Drop the chain (and its metrics). Returns whether it existed.
    pub fn remove(&self, persona: Persona) -> bool {
        let removed = self.write().remove(&persona).is_some();
        if removed {
            info!(%persona, "removed chain");
        }
        removed
    }

    /// Active personas, in table order.
    pub fn list(&self) -> Vec<Persona> {
        let mut personas: Vec<Persona> = self.read().keys().copied().collect();
        personas.sort();
        personas
    }

    /// Create a chain for every persona the prompt store serves. Individual
    /// failures are logged and skipped; returns how many chains are active.
    pub fn preload(&self) -> usize {
        let personas = self.prompts.personas();
        for persona in &personas {
            if let Err(err) = self.get_or_create(*persona) {
                warn!(%persona, error = %err, "failed to initialize chain");
            }
        }
        let active = self.read().len();
        info!(active, total = personas.len(), "preloaded chains");
        active
    }

    // =========================================================================
    // Chat entry points
    // =========================================================================

    pub async fn chat(
        &self,
        persona_type: &str,
        user_input: &str,
        context: Option<&Context>,
    ) -> InvocationResult {
        match self.resolve(persona_type) {
            Ok(chain) => chain.invoke(user_input, context).await,
            Err(result) => result,
        }
    }

    /// Blocking twin of [`ChainRegistry::chat`]. Must not be called from
    /// inside an async runtime.
    pub fn chat_blocking(
        &self,
        persona_type: &str,
        user_input: &str,
        context: Option<&Context>,
    ) -> InvocationResult {
        match self.resolve(persona_type) {
            Ok(chain) => chain.invoke_blocking(user_input, context),
            Err(result) => result,
        }
    }

    /// Run every request concurrently and return one result per request, in
    /// request order. Malformed entries and unknown personas fail locally
    /// without reaching the model.
    pub async fn batch_chat(&self, requests: Vec<BatchRequest>) -> Vec<InvocationResult> {
        let pending: Vec<Pending> = requests
            .into_iter()
            .map(|req| self.dispatch(req))
            .collect();

        // Every task is already running; join_all only fixes the output order.
        join_all(pending.into_iter().map(|item| async move {
            match item {
                Pending::Ready(result) => result,
                Pending::Running(handle) => handle.await.unwrap_or_else(|err| {
                    warn!(error = %err, "batch task did not complete");
                    InvocationResult::failed("unknown", err.to_string(), 0.0)
                }),
            }
        }))
        .await
    }

    /// Send a fixed message to every active persona and report which answered.
    /// Keyed by the persona asked, so a task that died still shows up as
    /// `false` under its own name.
    pub async fn test_all(&self) -> BTreeMap<String, bool> {
        let personas = self.list();
        let requests: Vec<BatchRequest> = personas
            .iter()
            .map(|p| BatchRequest::new(p.as_str(), SELF_TEST_MESSAGE))
            .collect();

        let results = self.batch_chat(requests).await;
        personas
            .iter()
            .zip(results)
            .map(|(persona, result)| {
                if result.success {
                    info!(%persona, "self-test passed");
                } else {
                    warn!(
                        %persona,
                        error = result.error.as_deref().unwrap_or("unknown error"),
                        "self-test failed"
                    );
                }
                (persona.as_str().to_string(), result.success)
            })
            .collect()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Metrics keyed by persona slug: one persona if given, else all active.
    pub fn metrics_snapshot(&self, persona: Option<Persona>) -> BTreeMap<String, MetricsSnapshot> {
        let chains = self.read();
        chains
            .iter()
            .filter(|(p, _)| persona.map_or(true, |wanted| **p == wanted))
            .map(|(p, chain)| (p.as_str().to_string(), chain.metrics()))
            .collect()
    }

    pub fn health_status(&self) -> HealthStatus {
        let known = self.prompts.personas();
        let active = self.list();
        let available_count = known.iter().filter(|p| active.contains(p)).count();
        let total_registered = known.len();

        let health_percentage = if total_registered > 0 {
            available_count as f64 / total_registered as f64 * 100.0
        } else {
            0.0
        };
        let status = if available_count == total_registered {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };

        HealthStatus {
            total_registered,
            available_count,
            health_percentage,
            status,
            persona_types: active.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn resolve(&self, persona_type: &str) -> Result<Arc<Chain>, InvocationResult> {
        persona_type
            .parse::<Persona>()
            .and_then(|persona| self.get_or_create(persona))
            .map_err(|err| {
                warn!(persona = persona_type, error = %err, "cannot resolve chain");
                InvocationResult::failed(persona_type, err.to_string(), 0.0)
            })
    }

    fn dispatch(&self, req: BatchRequest) -> Pending {
        let persona_type = req.persona_type.filter(|s| !s.is_empty());
        let user_input = req.user_input.filter(|s| !s.is_empty());

        let (persona_type, user_input) = match (persona_type, user_input) {
            (Some(p), Some(u)) => (p, u),
            (p, _) => {
                return Pending::Ready(InvocationResult::failed(
                    p.unwrap_or_else(|| "unknown".to_string()),
                    ChainError::MalformedBatchEntry.to_string(),
                    0.0,
                ))
            }
        };

        let chain = match self.resolve(&persona_type) {
            Ok(chain) => chain,
            Err(result) => return Pending::Ready(result),
        };

        let context = req.context;
        Pending::Running(tokio::spawn(async move {
            chain.invoke(&user_input, context.as_ref()).await
        }))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Persona, Arc<Chain>>> {
        self.chains.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Persona, Arc<Chain>>> {
        self.chains.write().unwrap_or_else(|p| p.into_inner())
    }
}
