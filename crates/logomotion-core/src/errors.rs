use crate::gate::GateBusy;
use std::fmt;
use thiserror::Error;

/// The uploaded document could not be turned into a scene.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("SVG parsing error: {0}")]
    Malformed(#[from] roxmltree::Error),
    #[error("No SVG element found (root is <{0}>)")]
    NotSvg(String),
    #[error("Document is empty")]
    Empty,
}

/// A call to the analysis or code-generation collaborator failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Analysis failed: {0}")]
    AnalysisRequest(String),
    #[error("Code generation failed: {0}")]
    CodegenRequest(String),
    #[error("An export is in progress")]
    Busy,
    #[error("Request was superseded by a newer one")]
    Superseded,
    #[error("No document has been uploaded")]
    NoDocument,
    #[error("No analysis available")]
    NoAnalysis,
}

/// Why a sandboxed run did not produce a Timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// The script raised an error (parse, runtime or budget).
    Thrown,
    /// The script finished cleanly but neither returned nor constructed a Timeline.
    NoTimelineProduced,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionErrorKind::Thrown => f.write_str("Animation execution error"),
            ExecutionErrorKind::NoTimelineProduced => f.write_str("No timeline produced"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn thrown(message: impl Into<String>) -> Self {
        Self {
            kind: ExecutionErrorKind::Thrown,
            message: message.into(),
        }
    }

    pub fn no_timeline() -> Self {
        Self {
            kind: ExecutionErrorKind::NoTimelineProduced,
            message: "the script neither returned nor constructed a timeline".to_string(),
        }
    }
}

/// Failure of the secondary media track.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Media seek to {target_secs:.3}s timed out")]
    SeekTimeout { target_secs: f64 },
    #[error("Media decoder error: {0}")]
    Decoder(String),
    #[error("Media track is not ready to play")]
    NotReady,
}

/// Failure while rasterizing or compositing a frame.
#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("Failed to create a {0}x{1} surface")]
    SurfaceFailure(u32, u32),
    #[error("Scene could not be rendered: {0}")]
    Render(#[from] usvg::Error),
    #[error("Scene container is not mounted")]
    NotMounted,
    #[error("Media frame {width}x{height} with {bytes} bytes cannot be drawn")]
    InvalidMediaFrame { width: u32, height: u32, bytes: usize },
}

/// A precondition for leaving the `Idle` export state was not met.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportPrecondition {
    #[error("no animation timeline is loaded")]
    MissingTimeline,
    #[error("timeline duration {0}ms is not a positive finite number")]
    InvalidTimelineDuration(f64),
    #[error("export target has zero size ({0}x{1})")]
    ZeroDimensions(u32, u32),
    #[error("no supported video encoder is available (tried {0})")]
    UnsupportedEncoder(String),
    #[error("no background video is loaded")]
    MissingMedia,
    #[error("background video duration {0}s is not a positive finite number")]
    InvalidMediaDuration(f64),
    #[error("background video is not ready to play")]
    MediaNotReady,
}

/// The step of the recording loop that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Prepare,
    TimelineSeek,
    MediaSeek,
    Settle,
    Capture,
    Encode,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Prepare => "prepare",
            FrameStage::TimelineSeek => "timeline seek",
            FrameStage::MediaSeek => "media seek",
            FrameStage::Settle => "settle",
            FrameStage::Capture => "capture",
            FrameStage::Encode => "encode",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Cannot export: {0}")]
    Precondition(#[from] ExportPrecondition),
    #[error("Export failed at frame {frame_index} ({stage}): {message}")]
    Frame {
        stage: FrameStage,
        frame_index: usize,
        message: String,
    },
    #[error("Encoder produced no data")]
    NoDataProduced,
    #[error("Encoder failed: {0}")]
    Encoder(String),
    #[error("Another generation or export is in progress")]
    Busy,
}

/// Any failure at a studio operation boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StudioError {
    #[error("Could not read document: {0}")]
    Extraction(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Busy: {0}")]
    Busy(#[from] GateBusy),
    #[error("Nothing to run: {0}")]
    NothingToRun(&'static str),
}

impl From<ExtractionError> for StudioError {
    fn from(e: ExtractionError) -> Self {
        StudioError::Extraction(e.to_string())
    }
}

impl StudioError {
    /// Short heading for the user-facing notice.
    pub fn title(&self) -> &'static str {
        match self {
            StudioError::Extraction(_) => "Upload Error",
            StudioError::Generation(GenerationError::AnalysisRequest(_)) => "Analysis Error",
            StudioError::Generation(_) => "Generation Error",
            StudioError::Execution(_) => "Execution Error",
            StudioError::Export(_) => "Export Error",
            StudioError::Busy(_) => "Busy",
            StudioError::NothingToRun(_) => "No Code",
        }
    }
}
