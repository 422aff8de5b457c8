use crate::{LlmError, LlmResult};
use async_trait::async_trait;
use logomotion_core::orchestrator::{AnalysisService, CodegenService, CollaboratorReply};
use logomotion_schema::{AnalyzeRequest, CodegenRequest};
use serde::Serialize;
use tracing::{debug, instrument};

pub const ANALYZE_PATH: &str = "api/analyze-svg";
pub const GENERATE_PATH: &str = "api/generate-animation";

/// Posts collaborator requests as JSON to an HTTP service and hands back status and body.
pub struct HttpCollaborator {
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl HttpCollaborator {
    pub fn new(base_url: &str) -> LlmResult<Self> {
        let mut url = reqwest::Url::parse(base_url)
            .map_err(|e| LlmError::ConfigError(format!("invalid endpoint '{}': {}", base_url, e)))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            base_url: url,
            client: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self, path: &str) -> LlmResult<reqwest::Url> {
        self.base_url
            .join(path)
            .map_err(|e| LlmError::ConfigError(e.to_string()))
    }

    #[instrument(skip(self, body))]
    async fn post(&self, path: &str, body: &impl Serialize) -> anyhow::Result<CollaboratorReply> {
        let url = self.endpoint(path)?;
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        debug!(status, bytes = text.len(), "Collaborator replied");
        Ok(CollaboratorReply::new(status, text))
    }
}

#[async_trait]
impl AnalysisService for HttpCollaborator {
    async fn analyze(&self, request: AnalyzeRequest) -> anyhow::Result<CollaboratorReply> {
        self.post(ANALYZE_PATH, &request).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl CodegenService for HttpCollaborator {
    async fn generate(&self, request: CodegenRequest) -> anyhow::Result<CollaboratorReply> {
        self.post(GENERATE_PATH, &request).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
