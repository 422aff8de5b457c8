#![allow(dead_code)]

use async_trait::async_trait;
use logomotion::engine::export::{ExportObserver, ExportState, TruncationNotice};
use logomotion::engine::orchestrator::{AnalysisService, CodegenService, CollaboratorReply};
use logomotion::engine::{Notice, Notifier};
use logomotion::schema::{AnalyzeRequest, CodegenRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Four top-level shapes, none with an id.
pub const FOUR_LAYER_LOGO: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="80" height="40" viewBox="0 0 80 40">
  <rect x="2" y="2" width="16" height="16" fill="#e63946"/>
  <circle cx="30" cy="10" r="8" fill="#457b9d"/>
  <ellipse cx="50" cy="10" rx="8" ry="5" fill="#2a9d8f"/>
  <path d="M62 2 L78 2 L70 18 Z" fill="#f4a261"/>
</svg>"##;

#[derive(Default)]
pub struct Inbox(pub Mutex<Vec<Notice>>);

impl Notifier for Inbox {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

impl Inbox {
    pub fn titles(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|n| n.title.clone()).collect()
    }
}

#[derive(Default)]
pub struct Recorder {
    pub frames: Mutex<Vec<(usize, f64)>>,
    pub states: Mutex<Vec<ExportState>>,
    pub notices: Mutex<Vec<TruncationNotice>>,
}

impl ExportObserver for Recorder {
    fn state_changed(&self, state: ExportState) {
        self.states.lock().unwrap().push(state);
    }
    fn frame_composited(&self, index: usize, timestamp_ms: f64) {
        self.frames.lock().unwrap().push((index, timestamp_ms));
    }
    fn truncated(&self, notice: &TruncationNotice) {
        self.notices.lock().unwrap().push(*notice);
    }
}

/// Collaborator with fixed replies that counts its calls.
pub struct FixedCollaborator {
    pub analysis: CollaboratorReply,
    pub codegen: CollaboratorReply,
    pub codegen_calls: AtomicUsize,
}

impl FixedCollaborator {
    pub fn new(analysis: CollaboratorReply, codegen: CollaboratorReply) -> Self {
        Self {
            analysis,
            codegen,
            codegen_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnalysisService for FixedCollaborator {
    async fn analyze(&self, _request: AnalyzeRequest) -> anyhow::Result<CollaboratorReply> {
        Ok(self.analysis.clone())
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

#[async_trait]
impl CodegenService for FixedCollaborator {
    async fn generate(&self, _request: CodegenRequest) -> anyhow::Result<CollaboratorReply> {
        self.codegen_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.codegen.clone())
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}
