//! # Studio Module
//!
//! The session controller. Owns the Scene Mount, the current Timeline and the background
//! track, and exposes every user-facing operation.
//!
//! ## Responsibilities
//! - **Pipeline**: upload, analyze, generate, execute.
//! - **Editing**: apply edited source, replay, default animation, overlay.
//! - **Media**: import and remove the background track.
//! - **Output**: export, preview rendering.
//!
//! Every operation reports its outcome through the `Notifier` and records failures as the
//! last error. No failure leaves the session unusable.

use crate::compositor::{FrameCompositor, ResvgSnapshotter, Snapshotter};
use crate::config::StudioConfig;
use crate::errors::{ExportError, GenerationError, StudioError};
use crate::export::{
    EncoderRegistry, ExportArtifact, ExportEncoder, ExportInput, ExportObserver, ExportState,
    ExportVariant, TruncationNotice,
};
use crate::gate::OperationGate;
use crate::media::{seek_with_timeout, MediaTrack, ThreadedTrack};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::orchestrator::GenerationOrchestrator;
use crate::sandbox::Sandbox;
use crate::scene::{lock_scene, Extractor, SceneMount, SvgExtractor};
use crate::scripting::ScriptLimits;
use crate::timeline::{AnimeRoot, TimelineHandle};
use crate::types::OverlayTransform;
use logomotion_schema::{Analysis, Extraction, SceneElement};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::Pixmap;
use tracing::{debug, info, instrument};

/// Elements animated by the built-in test animation.
pub const DEFAULT_ANIMATION_TARGETS: &str = "path, circle, rect, ellipse, polygon, polyline, line, text";

/// Staggered fade and slide-in over every shape element.
pub fn default_animation_source() -> String {
    format!(
        r#"let tl = anime::timeline(#{{ easing: "easeOutQuad", duration: 500 }});
tl.add(#{{
    targets: "{}",
    opacity: [0, 1],
    translateY: [10, 0],
    delay: anime::stagger(100)
}});
tl
"#,
        DEFAULT_ANIMATION_TARGETS
    )
}

/// Forwards export callbacks and turns the truncation notice into a user notice.
struct NoticeBridge<'a> {
    inner: &'a dyn ExportObserver,
    notifier: &'a dyn Notifier,
}

impl ExportObserver for NoticeBridge<'_> {
    fn state_changed(&self, state: ExportState) {
        self.inner.state_changed(state);
    }

    fn progress(&self, percent: Option<u32>) {
        self.inner.progress(percent);
    }

    fn frame_composited(&self, index: usize, timestamp_ms: f64) {
        self.inner.frame_composited(index, timestamp_ms);
    }

    fn truncated(&self, notice: &TruncationNotice) {
        self.notifier
            .notify(Notice::info("Duration Mismatch", notice.message()));
        self.inner.truncated(notice);
    }
}

pub struct Studio {
    config: StudioConfig,
    extractor: Arc<dyn Extractor>,
    orchestrator: Option<GenerationOrchestrator>,
    snapshotter: Arc<dyn Snapshotter>,
    notifier: Arc<dyn Notifier>,
    sandbox: Sandbox,
    exporter: ExportEncoder,
    gate: OperationGate,
    mount: SceneMount,
    root: AnimeRoot,
    current: Option<TimelineHandle>,
    media: Option<Box<dyn MediaTrack>>,
    preview: Option<FrameCompositor>,
    extraction: Option<Extraction>,
    analysis: Option<Analysis>,
    source: Option<String>,
    last_error: Option<String>,
}

impl Studio {
    pub fn new(config: StudioConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(ResvgSnapshotter::new()),
            EncoderRegistry::default(),
        )
    }

    /// A studio with an explicit rasterizer and encoder set.
    pub fn with_parts(
        config: StudioConfig,
        snapshotter: Arc<dyn Snapshotter>,
        registry: EncoderRegistry,
    ) -> Self {
        let gate = OperationGate::new();
        let mount = SceneMount::new().with_viewport(config.viewport);
        let root = AnimeRoot::new(mount.container().cloned().unwrap_or_default());
        let exporter = ExportEncoder::new(&config, registry, snapshotter.clone(), gate.clone());
        let sandbox = Sandbox::new(ScriptLimits {
            max_operations: config.max_script_operations,
            ..Default::default()
        });
        Self {
            config,
            extractor: Arc::new(SvgExtractor),
            orchestrator: None,
            snapshotter,
            notifier: Arc::new(TracingNotifier),
            sandbox,
            exporter,
            gate,
            mount,
            root,
            current: None,
            media: None,
            preview: None,
            extraction: None,
            analysis: None,
            source: None,
            last_error: None,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: GenerationOrchestrator) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn gate(&self) -> &OperationGate {
        &self.gate
    }

    pub fn mount(&self) -> &SceneMount {
        &self.mount
    }

    pub fn adapter_root(&self) -> &AnimeRoot {
        &self.root
    }

    pub fn current_timeline(&self) -> Option<&TimelineHandle> {
        self.current.as_ref()
    }

    pub fn extraction(&self) -> Option<&Extraction> {
        self.extraction.as_ref()
    }

    pub fn elements(&self) -> &[SceneElement] {
        self.extraction
            .as_ref()
            .map(|e| e.elements.as_slice())
            .unwrap_or_default()
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    /// The animation source shown in the editor.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn media(&self) -> Option<&dyn MediaTrack> {
        self.media.as_deref()
    }

    pub fn export_state(&self) -> ExportState {
        self.exporter.state()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn report<T, E: Display>(&mut self, title: &str, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                let message = e.to_string();
                self.notifier.notify(Notice::error(title, message.clone()));
                self.last_error = Some(message);
            }
        }
        result
    }

    fn report_studio<T>(&mut self, result: Result<T, StudioError>) -> Result<T, StudioError> {
        let title = result.as_ref().err().map(StudioError::title).unwrap_or("");
        self.report(title, result)
    }

    /// Extracts layers from `document` and mounts the annotated result.
    ///
    /// A new document discards the previous analysis, source and Timeline.
    #[instrument(skip_all, fields(bytes = document.len()))]
    pub fn upload(&mut self, document: &str) -> Result<Extraction, StudioError> {
        let result = self.upload_inner(document);
        self.report_studio(result)
    }

    fn upload_inner(&mut self, document: &str) -> Result<Extraction, StudioError> {
        let _permit = self.gate.try_begin_execution()?;
        let extraction = self.extractor.extract(document)?;
        if !self
            .mount
            .reset(&extraction.annotated_document, &mut self.current)
        {
            return Err(StudioError::Extraction(
                "annotated document could not be mounted".to_string(),
            ));
        }
        self.preview = None;
        self.analysis = None;
        self.source = None;
        self.extraction = Some(extraction.clone());
        info!(elements = extraction.elements.len(), "Document uploaded");
        self.notifier.notify(Notice::success(
            "Uploaded",
            format!("Found {} layers", extraction.elements.len()),
        ));
        Ok(extraction)
    }

    /// Requests a semantic analysis of the uploaded layers.
    ///
    /// On failure the previous analysis is kept.
    pub async fn analyze(&mut self) -> Result<Analysis, StudioError> {
        let result = self.analyze_inner().await;
        self.report_studio(result)
    }

    async fn analyze_inner(&mut self) -> Result<Analysis, StudioError> {
        let _permit = self
            .gate
            .try_begin_generation()
            .map_err(|_| GenerationError::Busy)?;
        let orchestrator = self.orchestrator.clone().ok_or_else(|| {
            GenerationError::AnalysisRequest("no analysis service is configured".to_string())
        })?;
        let elements = self
            .extraction
            .as_ref()
            .map(|e| e.elements.clone())
            .ok_or(GenerationError::NoDocument)?;

        let analysis = orchestrator.analyze(&elements).await?;
        self.analysis = Some(analysis.clone());
        self.notifier.notify(Notice::success(
            "Analysis Complete",
            format!("Analyzed {} elements", analysis.elements.len()),
        ));
        Ok(analysis)
    }

    /// Edits the concept carried into the next generation.
    pub fn set_concept_description(&mut self, concept: &str) -> Result<(), StudioError> {
        let result = match self.analysis.as_mut() {
            Some(analysis) => {
                analysis.concept_description = concept.to_string();
                Ok(())
            }
            None => Err(GenerationError::NoAnalysis.into()),
        };
        self.report_studio(result)
    }

    /// Generates animation source from the current analysis and runs it.
    ///
    /// A failed request clears the stale source and never reaches the sandbox.
    pub async fn generate(&mut self) -> Result<TimelineHandle, StudioError> {
        let result = self.generate_inner().await;
        self.report_studio(result)
    }

    async fn generate_inner(&mut self) -> Result<TimelineHandle, StudioError> {
        let _permit = self
            .gate
            .try_begin_generation()
            .map_err(|_| GenerationError::Busy)?;
        let orchestrator = self.orchestrator.clone().ok_or_else(|| {
            GenerationError::CodegenRequest("no code generation service is configured".to_string())
        })?;
        let elements = self
            .extraction
            .as_ref()
            .map(|e| e.elements.clone())
            .ok_or(GenerationError::NoDocument)?;
        let analysis = self.analysis.clone().ok_or(GenerationError::NoAnalysis)?;

        let code = match orchestrator.generate_code(&analysis, &elements).await {
            Ok(code) => code,
            Err(e) => {
                self.source = None;
                return Err(e.into());
            }
        };
        if let (Some(concept), Some(current)) = (code.concept_description, self.analysis.as_mut()) {
            current.concept_description = concept;
        }
        self.source = Some(code.source.clone());
        self.notifier
            .notify(Notice::success("Generated", "Animation code ready."));

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
        Ok(self.execute_source(&code.source).await?)
    }

    /// Runs edited source in place of the current animation.
    pub async fn apply_source(&mut self, source: &str) -> Result<TimelineHandle, StudioError> {
        let result = self.apply_source_inner(source).await;
        let result = self.report_studio(result);
        if result.is_ok() {
            self.notifier
                .notify(Notice::success("Applied", "Code changes applied."));
        }
        result
    }

    async fn apply_source_inner(&mut self, source: &str) -> Result<TimelineHandle, StudioError> {
        if source.trim().is_empty() {
            return Err(StudioError::NothingToRun("there is no code to apply"));
        }
        let _permit = self.gate.try_begin_execution()?;
        self.source = Some(source.to_string());
        Ok(self.execute_source(source).await?)
    }

    /// Re-runs the current source from a fresh scene.
    pub async fn replay(&mut self) -> Result<TimelineHandle, StudioError> {
        let result = match self.source.clone() {
            Some(source) => match self.gate.try_begin_execution() {
                Ok(_permit) => self.execute_source(&source).await.map_err(StudioError::from),
                Err(busy) => Err(busy.into()),
            },
            None => Err(StudioError::NothingToRun("no animation has been generated")),
        };
        self.report_studio(result)
    }

    /// Plays the built-in fade/slide-in over every shape.
    pub async fn run_default_animation(&mut self) -> Result<TimelineHandle, StudioError> {
        let source = default_animation_source();
        let result = match self.gate.try_begin_execution() {
            Ok(_permit) => self.execute_source(&source).await.map_err(StudioError::from),
            Err(busy) => Err(busy.into()),
        };
        self.report_studio(result)
    }

    async fn execute_source(&mut self, source: &str) -> Result<TimelineHandle, crate::errors::ExecutionError> {
        let timeline = self
            .sandbox
            .execute_fresh(
                source,
                &mut self.mount,
                &self.root,
                &mut self.current,
                self.config.settle_attempts,
            )
            .await?;
        if self.mount.addressable_ids().is_empty() {
            self.notifier.notify(Notice::warning(
                "Warning",
                "No SVG elements found to animate",
            ));
        }
        Ok(timeline)
    }

    /// Positions the scene over the background. Values are clamped to their ranges.
    pub fn set_overlay(&mut self, scale: f32, offset_x: i32, offset_y: i32) -> OverlayTransform {
        let overlay = OverlayTransform::new(scale, offset_x, offset_y);
        self.mount.set_overlay(overlay);
        debug!(?overlay, "Overlay updated");
        overlay
    }

    /// Replaces the background track.
    pub fn import_media(&mut self, track: Box<dyn MediaTrack>) {
        if let Some(mut previous) = self.media.take() {
            previous.pause();
        }
        info!(track = track.label(), duration_secs = track.duration_secs(), "Background media imported");
        self.notifier.notify(Notice::success(
            "Video Imported",
            format!("{} ({:.1}s)", track.label(), track.duration_secs()),
        ));
        self.media = Some(track);
    }

    /// Opens an image, GIF or video file as the background track.
    pub async fn import_media_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let opened = ThreadedTrack::open(path, self.config.still_media_secs()).await;
        let track = self.report("Import Error", opened.map_err(|e| format!("{e:#}")));
        match track {
            Ok(track) => {
                self.import_media(Box::new(track));
                Ok(())
            }
            Err(message) => Err(anyhow::anyhow!(message)),
        }
    }

    pub fn remove_media(&mut self) {
        if let Some(mut track) = self.media.take() {
            track.pause();
            info!(track = track.label(), "Background media removed");
        }
    }

    /// Exports the current Timeline. Truncation and outcome are reported as notices.
    pub async fn export(
        &mut self,
        variant: ExportVariant,
        observer: &dyn ExportObserver,
    ) -> Result<ExportArtifact, ExportError> {
        let input = ExportInput {
            variant,
            timeline: self.current.as_ref(),
            scene: self.mount.container(),
            dimensions: self.mount.measure(),
            overlay: self.mount.overlay(),
            media: self.media.as_mut().map(|m| m.as_mut() as &mut dyn MediaTrack),
        };
        let bridge = NoticeBridge {
            inner: observer,
            notifier: self.notifier.as_ref(),
        };
        let result = self.exporter.run(input, &bridge).await;
        let result = self.report("Export Error", result);
        if let Ok(artifact) = &result {
            self.notifier.notify(Notice::success(
                "Export Complete",
                format!("{} ({} frames)", artifact.file_name, artifact.frame_count),
            ));
        }
        result
    }

    /// Progresses a playing Timeline, and the background clock with it.
    pub async fn advance(&mut self, delta_ms: f64) -> anyhow::Result<()> {
        let Some(timeline) = self.current.as_ref() else {
            return Ok(());
        };
        if !timeline.is_playing() {
            return Ok(());
        }
        timeline.advance(delta_ms);
        if let Some(media) = self.media.as_deref_mut() {
            let target = media.current_time_secs() + delta_ms / 1000.0;
            seek_with_timeout(media, target, self.config.seek_timeout()).await?;
        }
        Ok(())
    }

    /// Composites the current state of the scene and background.
    pub fn render_preview(&mut self) -> anyhow::Result<Pixmap> {
        let (width, height) = self.mount.measure();
        let reuse = self
            .preview
            .as_ref()
            .is_some_and(|p| p.width() == width && p.height() == height);
        if !reuse {
            self.preview = Some(FrameCompositor::new(
                self.snapshotter.clone(),
                width,
                height,
                self.config.background_color(),
            )?);
        }
        let (Some(compositor), Some(scene)) = (self.preview.as_mut(), self.mount.container()) else {
            anyhow::bail!("scene container is not mounted");
        };
        let graph = lock_scene(scene);
        let frame = self.media.as_deref().and_then(|m| m.current_frame());
        let surface = compositor.composite(&graph, frame, self.mount.overlay())?;
        Ok(surface.clone())
    }

    /// Pauses, seeks both clocks to `ms` and composites.
    pub async fn preview_at(&mut self, ms: f64) -> anyhow::Result<Pixmap> {
        if let Some(timeline) = self.current.as_ref() {
            timeline.pause();
            timeline.seek(ms);
        }
        if let Some(media) = self.media.as_deref_mut() {
            media.pause();
            seek_with_timeout(media, ms / 1000.0, self.config.seek_timeout()).await?;
        }
        tokio::task::yield_now().await;
        self.render_preview()
    }
}
