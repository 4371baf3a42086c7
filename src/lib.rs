#![forbid(unsafe_code)]

//! # persona-router
//!
//! Routes chat messages to one of a closed set of personas (medical, legal,
//! finance, ...). Each persona is a [`Chain`]: a fixed system prompt bound to
//! a shared model gateway. Every call comes back as a uniform
//! [`InvocationResult`] carrying the validated response, advisory quality
//! issues, and timing, whether the call succeeded or not.
//!
//! The [`ChainRegistry`] creates chains lazily, tracks per-persona metrics,
//! and fans batches out concurrently while keeping results in request order.

pub mod chain;
pub mod config;
pub mod error;
pub mod gateway;
pub mod persona;
pub mod prompts;
pub mod registry;

pub use chain::{Chain, ChainOptions, Context, InvocationResult, MetricsSnapshot, ValidationReport};
pub use config::RouterConfig;
pub use error::ChainError;
pub use gateway::{ChatGateway, ProviderError, ProviderGateway};
pub use persona::Persona;
pub use prompts::{PromptStore, StaticPromptStore};
pub use registry::{BatchRequest, BatchSummary, ChainRegistry, HealthStatus, OverallStatus};
