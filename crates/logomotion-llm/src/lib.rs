//! # logomotion-llm
//!
//! Remote collaborators for the generation pipeline.
//!
//! - `HttpCollaborator` forwards requests to an analysis/codegen HTTP service.
//! - `AnthropicProvider` calls the Anthropic Messages API directly and shapes the model's
//!   text into the same reply bodies.
//!
//! Both implement `AnalysisService` and `CodegenService` from `logomotion-core`.

use logomotion_core::GenerationOrchestrator;
use std::sync::Arc;
use thiserror::Error;

pub mod parse;
pub mod prompts;
pub mod providers;

pub use providers::anthropic::{AnthropicConfig, AnthropicProvider};
pub use providers::http::HttpCollaborator;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Could not parse model output: {0}")]
    Parse(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Builds an orchestrator against `endpoint` if given, else against the Anthropic API
/// configured from the environment.
pub fn create_orchestrator(endpoint: Option<&str>) -> LlmResult<GenerationOrchestrator> {
    match endpoint {
        Some(url) => {
            let http = Arc::new(HttpCollaborator::new(url)?);
            Ok(GenerationOrchestrator::new(http.clone(), http))
        }
        None => {
            let provider = Arc::new(AnthropicProvider::new(AnthropicConfig::from_env()?));
            Ok(GenerationOrchestrator::new(provider.clone(), provider))
        }
    }
}
