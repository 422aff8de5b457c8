use crate::parse::{extract_code, extract_json};
use crate::prompts::{analysis_prompt, codegen_prompt};
use crate::{LlmError, LlmResult};
use async_trait::async_trait;
use logomotion_core::orchestrator::{AnalysisService, CodegenService, CollaboratorReply};
use logomotion_schema::{Analysis, AnalyzeRequest, CodegenRequest};
use serde_json::json;
use tracing::{error, info, instrument, warn};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub analysis_max_tokens: u32,
    pub codegen_max_tokens: u32,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            analysis_max_tokens: 2500,
            codegen_max_tokens: 2000,
        }
    }

    /// Reads `ANTHROPIC_API_KEY` (or `CLAUDE_API_KEY`) and `LOGOMOTION_MODEL`.
    pub fn from_env() -> LlmResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LlmResult<Self> {
        let api_key = ["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"]
            .iter()
            .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                LlmError::ConfigError(
                    "API key not configured. Set ANTHROPIC_API_KEY or CLAUDE_API_KEY.".to_string(),
                )
            })?;
        let mut config = Self::new(api_key);
        if let Some(model) = lookup("LOGOMOTION_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model;
        }
        Ok(config)
    }
}

/// Calls the Messages API and reshapes the model's text into collaborator replies.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    #[instrument(skip(self, prompt), fields(model = %self.config.model))]
    async fn complete(&self, prompt: String, max_tokens: u32) -> LlmResult<String> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            error!(%status, "Anthropic API error: {}", error_text);
            return Err(LlmError::ProviderError(format!("Anthropic API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response.json().await?;
        let text = response_json
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find_map(|b| b.get("text").and_then(|t| t.as_str()))
            })
            .ok_or_else(|| LlmError::Parse("no text content in response".to_string()))?;
        info!(chars = text.len(), "Model replied");
        Ok(text.to_string())
    }
}

fn failure(message: impl Into<String>) -> CollaboratorReply {
    CollaboratorReply::new(500, json!({ "error": message.into() }).to_string())
}

/// Shapes model text into an analysis reply body.
pub fn analysis_reply(text: &str) -> CollaboratorReply {
    match serde_json::from_str::<Analysis>(extract_json(text)) {
        Ok(analysis) => CollaboratorReply::new(200, json!({ "analysis": analysis }).to_string()),
        Err(e) => {
            warn!(error = %e, "Model analysis was not valid JSON");
            failure("Failed to parse model response")
        }
    }
}

/// Shapes model text into a code-generation reply body.
pub fn codegen_reply(text: &str) -> CollaboratorReply {
    let reply = extract_code(text);
    CollaboratorReply::new(
        200,
        json!({
            "animationCode": reply.code,
            "conceptDescription": reply.concept.unwrap_or_default(),
        })
        .to_string(),
    )
}

#[async_trait]
impl AnalysisService for AnthropicProvider {
    async fn analyze(&self, request: AnalyzeRequest) -> anyhow::Result<CollaboratorReply> {
        if request.elements.is_empty() {
            return Ok(CollaboratorReply::new(
                400,
                json!({ "error": "Invalid or missing elements in request body" }).to_string(),
            ));
        }
        let prompt = analysis_prompt(&request.elements);
        Ok(match self.complete(prompt, self.config.analysis_max_tokens).await {
            Ok(text) => analysis_reply(&text),
            Err(e) => failure(e.to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[async_trait]
impl CodegenService for AnthropicProvider {
    async fn generate(&self, request: CodegenRequest) -> anyhow::Result<CollaboratorReply> {
        let prompt = codegen_prompt(&request.analysis, &request.elements);
        Ok(match self.complete(prompt, self.config.codegen_max_tokens).await {
            Ok(text) => codegen_reply(&text),
            Err(e) => failure(e.to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
