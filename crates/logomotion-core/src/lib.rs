//! # Logomotion Engine
//!
//! `logomotion-core` turns a layered SVG into a live, scriptable scene, runs generated
//! animation code against it in a sandbox, and exports the result frame by frame.
//!
//! ## Core Features
//!
//! *   **Scene Mount**: A single mutable copy of the annotated document, reset between runs.
//! *   **Sandboxed Scripting**: Animation code is Rhai, evaluated in a fresh engine per run with
//!     an `anime` module that builds Timelines.
//! *   **Timeline Capture**: Timelines are recovered whether the script returns one or not.
//! *   **Frame-Accurate Export**: Every frame is seeked, composited over an optional background
//!     track, and streamed into a GIF or (with `video-rs`) MP4 encoder.
//!
//! ## Usage
//!
//! The entry point is the [`Studio`] session controller.
//!
//! ```rust,no_run
//! use logomotion_core::{Studio, StudioConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut studio = Studio::new(StudioConfig::default());
//! studio.upload(r#"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="64">
//!     <circle id="dot" cx="32" cy="32" r="10"/></svg>"#)?;
//! studio.run_default_animation().await?;
//! # Ok(())
//! # }
//! ```

/// Colors, animated values and the overlay transform.
pub mod types;

/// Error taxonomy for every stage.
pub mod errors;

/// Scene graph, selectors, extraction and the mount.
pub mod scene;

/// Easing functions and value interpolation.
pub mod animation;

/// Timelines, the adapter root and capture hooks.
pub mod timeline;

/// Session tunables.
pub mod config;

/// Rhai bindings.
pub mod scripting;

/// Wrapper stripping, shape classification and sandboxed execution.
pub mod sandbox;

/// Background media tracks and frame sources.
pub mod media;

/// Scene rasterization and frame compositing.
pub mod compositor;

/// Frame-accurate export.
pub mod export;

pub mod gate;
pub mod notify;
pub mod orchestrator;
pub mod studio;

pub use compositor::{FrameCompositor, ResvgSnapshotter, Snapshotter};
pub use config::StudioConfig;
pub use errors::{
    ExecutionError, ExportError, ExportPrecondition, ExtractionError, GenerationError,
    MediaError, StudioError,
};
pub use export::{ExportArtifact, ExportObserver, ExportState, ExportVariant, NullObserver};
pub use gate::{OperationGate, OperationPermit};
pub use media::{FrameSequence, MediaTrack, ThreadedTrack, VideoFrame};
pub use notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use orchestrator::{
    AnalysisService, CodegenService, CollaboratorReply, GeneratedCode, GenerationOrchestrator,
};
pub use sandbox::Sandbox;
pub use scene::{Extractor, SceneMount, SvgExtractor};
pub use studio::Studio;
pub use timeline::{AnimeRoot, TimelineHandle};
