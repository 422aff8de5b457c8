//! # Orchestrator Module
//!
//! Sequences the remote analysis and code-generation calls.
//!
//! ## Responsibilities
//! - **Collaborators**: `AnalysisService` / `CodegenService` return HTTP-style replies.
//! - **Reply Rules**: Non-2xx is a failure whatever the body; a 2xx without a usable payload
//!   is a failure too.
//! - **Staleness**: `RequestTracker` marks responses that a newer request superseded.

use crate::errors::GenerationError;
use async_trait::async_trait;
use logomotion_schema::{
    Analysis, AnalyzeRequest, AnalyzeResponse, CodegenRequest, CodegenResponse, SceneElement,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Status and raw body of one collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorReply {
    pub status: u16,
    pub body: String,
}

impl CollaboratorReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 reply carrying `payload` as JSON.
    pub fn json(payload: &impl Serialize) -> anyhow::Result<Self> {
        Ok(Self::new(200, serde_json::to_string(payload)?))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body's `error` field, else a generic status message.
    fn failure_message(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("request failed with status {}", self.status))
    }
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: AnalyzeRequest) -> anyhow::Result<CollaboratorReply>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait CodegenService: Send + Sync {
    async fn generate(&self, request: CodegenRequest) -> anyhow::Result<CollaboratorReply>;

    fn name(&self) -> &'static str;
}

/// Request-generation counter. Only the newest ticket is current.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    latest: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Generated animation source plus the optional concept text that came with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub source: String,
    pub concept_description: Option<String>,
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    analysis: Arc<dyn AnalysisService>,
    codegen: Arc<dyn CodegenService>,
    tracker: RequestTracker,
}

impl GenerationOrchestrator {
    pub fn new(analysis: Arc<dyn AnalysisService>, codegen: Arc<dyn CodegenService>) -> Self {
        Self {
            analysis,
            codegen,
            tracker: RequestTracker::new(),
        }
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    #[instrument(skip_all, fields(service = self.analysis.name(), elements = elements.len()))]
    pub async fn analyze(&self, elements: &[SceneElement]) -> Result<Analysis, GenerationError> {
        let ticket = self.tracker.begin();
        let reply = self
            .analysis
            .analyze(AnalyzeRequest {
                elements: elements.to_vec(),
            })
            .await
            .map_err(|e| GenerationError::AnalysisRequest(format!("{e:#}")))?;

        if !self.tracker.is_current(ticket) {
            debug!("Discarding superseded analysis response");
            return Err(GenerationError::Superseded);
        }
        if !reply.is_success() {
            return Err(GenerationError::AnalysisRequest(reply.failure_message()));
        }

        let response: AnalyzeResponse = serde_json::from_str(&reply.body)
            .map_err(|e| GenerationError::AnalysisRequest(format!("malformed response: {e}")))?;
        let analysis = response.analysis.ok_or_else(|| {
            GenerationError::AnalysisRequest(
                response
                    .error
                    .unwrap_or_else(|| "response has no analysis".to_string()),
            )
        })?;

        let unknown = analysis.unknown_ids(elements);
        if !unknown.is_empty() {
            warn!(?unknown, "Analysis references ids that are not in the scene");
        }
        info!(
            analyzed = analysis.elements.len(),
            groupings = analysis.groupings.len(),
            "Analysis complete"
        );
        Ok(analysis)
    }

    #[instrument(skip_all, fields(service = self.codegen.name()))]
    pub async fn generate_code(
        &self,
        analysis: &Analysis,
        elements: &[SceneElement],
    ) -> Result<GeneratedCode, GenerationError> {
        let ticket = self.tracker.begin();
        let reply = self
            .codegen
            .generate(CodegenRequest {
                analysis: analysis.clone(),
                elements: elements.to_vec(),
            })
            .await
            .map_err(|e| GenerationError::CodegenRequest(format!("{e:#}")))?;

        if !self.tracker.is_current(ticket) {
            debug!("Discarding superseded codegen response");
            return Err(GenerationError::Superseded);
        }
        if !reply.is_success() {
            return Err(GenerationError::CodegenRequest(reply.failure_message()));
        }

        let response: CodegenResponse = serde_json::from_str(&reply.body)
            .map_err(|e| GenerationError::CodegenRequest(format!("malformed response: {e}")))?;
        let source = response
            .animation_code
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::CodegenRequest(
                    response
                        .error
                        .unwrap_or_else(|| "response contained no animation code".to_string()),
                )
            })?;

        info!(bytes = source.len(), "Animation code generated");
        Ok(GeneratedCode {
            source,
            concept_description: response.concept_description.filter(|c| !c.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logomotion_schema::{Category, ElementAnalysis};
    use std::sync::Mutex;

    struct Canned(Mutex<Vec<CollaboratorReply>>);

    impl Canned {
        fn new(replies: Vec<CollaboratorReply>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(replies)))
        }

        fn next(&self) -> anyhow::Result<CollaboratorReply> {
            let mut replies = self.0.lock().unwrap();
            if replies.is_empty() {
                anyhow::bail!("connection refused");
            }
            Ok(replies.remove(0))
        }
    }

    #[async_trait]
    impl AnalysisService for Canned {
        async fn analyze(&self, _request: AnalyzeRequest) -> anyhow::Result<CollaboratorReply> {
            self.next()
        }
        fn name(&self) -> &'static str {
            "canned"
        }
    }

    #[async_trait]
    impl CodegenService for Canned {
        async fn generate(&self, _request: CodegenRequest) -> anyhow::Result<CollaboratorReply> {
            self.next()
        }
        fn name(&self) -> &'static str {
            "canned"
        }
    }

    fn elements() -> Vec<SceneElement> {
        vec![SceneElement {
            id: "layer-1".into(),
            name: "mark".into(),
            content: "<svg/>".into(),
        }]
    }

    fn analysis() -> Analysis {
        Analysis {
            elements: vec![ElementAnalysis {
                id: "layer-1".into(),
                category: Category::Primary,
                description: "a bird".into(),
                animation_suggestion: "fly in".into(),
            }],
            groupings: vec![],
            concept_description: "Bird rises".into(),
        }
    }

    fn orchestrator(replies: Vec<CollaboratorReply>) -> GenerationOrchestrator {
        let canned = Canned::new(replies);
        GenerationOrchestrator::new(canned.clone(), canned)
    }

    #[tokio::test]
    async fn analysis_parses_successful_replies() {
        let body = serde_json::json!({ "analysis": analysis() }).to_string();
        let result = orchestrator(vec![CollaboratorReply::new(200, body)])
            .analyze(&elements())
            .await
            .unwrap();
        assert_eq!(result, analysis());
    }

    #[tokio::test]
    async fn non_success_status_fails_whatever_the_body() {
        let body = serde_json::json!({ "analysis": analysis() }).to_string();
        let err = orchestrator(vec![CollaboratorReply::new(502, body)])
            .analyze(&elements())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::AnalysisRequest("request failed with status 502".into())
        );

        let err = orchestrator(vec![CollaboratorReply::new(500, r#"{"error":"Failed to analyze SVG"}"#)])
            .analyze(&elements())
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::AnalysisRequest("Failed to analyze SVG".into()));
    }

    #[tokio::test]
    async fn success_without_payload_fails() {
        let err = orchestrator(vec![CollaboratorReply::new(200, "{}")])
            .analyze(&elements())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::AnalysisRequest(_)));

        let err = orchestrator(vec![CollaboratorReply::new(200, "not json")])
            .analyze(&elements())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::AnalysisRequest(m) if m.contains("malformed")));
    }

    #[tokio::test]
    async fn empty_code_is_a_codegen_failure() {
        let err = orchestrator(vec![CollaboratorReply::new(200, r#"{"animationCode":"  "}"#)])
            .generate_code(&analysis(), &elements())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::CodegenRequest(_)));
    }

    #[tokio::test]
    async fn code_and_concept_are_returned() {
        let body = r#"{"animationCode":"anime::timeline()","conceptDescription":"Rise"}"#;
        let code = orchestrator(vec![CollaboratorReply::new(200, body)])
            .generate_code(&analysis(), &elements())
            .await
            .unwrap();
        assert_eq!(code.source, "anime::timeline()");
        assert_eq!(code.concept_description.as_deref(), Some("Rise"));
    }

    #[tokio::test]
    async fn transport_errors_surface() {
        let err = orchestrator(vec![])
            .generate_code(&analysis(), &elements())
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::CodegenRequest("connection refused".into()));
    }

    #[test]
    fn newer_tickets_supersede_older_ones() {
        let tracker = RequestTracker::new();
        let first = tracker.begin();
        assert!(tracker.is_current(first));
        let second = tracker.begin();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }
}
