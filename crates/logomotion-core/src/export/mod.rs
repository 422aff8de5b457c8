//! # Export Module
//!
//! Frame-accurate export of the current Timeline, optionally over a background track.
//!
//! ## Responsibilities
//! - **Frame Mapping**: `frame_timestamps` maps frame indices to clamped timestamps.
//! - **Encoding**: `encoder` holds the streaming backends and capability probe.
//! - **Job**: `ExportEncoder::run` drives `Idle -> Preparing -> Recording -> Finalizing`.
//!
//! ## Key Types
//! - `ExportVariant`: Animation-only or composited output.
//! - `ExportObserver`: State, progress and per-frame callbacks.
//! - `ExportArtifact`: The assembled file.

pub mod encoder;
mod job;

pub use encoder::{
    ChunkSink, ContainerFormat, EncoderFactory, EncoderRegistry, FrameEncoder, GifEncoderFactory,
};
#[cfg(feature = "video-rs")]
pub use encoder::Mp4EncoderFactory;
pub use job::{ExportEncoder, ExportInput};

use anyhow::Context;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Preparing,
    Recording,
    Finalizing,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportVariant {
    /// The scene over a flat background colour.
    AnimationOnly,
    /// The scene over the background media track.
    Composited,
}

impl ExportVariant {
    pub fn file_stem(&self) -> &'static str {
        match self {
            ExportVariant::AnimationOnly => "animation-only",
            ExportVariant::Composited => "composited-animation",
        }
    }

    pub fn file_name(&self, format: ContainerFormat) -> String {
        format!("{}.{}", self.file_stem(), format.extension())
    }
}

/// Which stream was cut short to fit the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncatedStream {
    Animation,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncationNotice {
    pub truncated: TruncatedStream,
    pub timeline_ms: f64,
    pub media_ms: f64,
    pub effective_ms: f64,
}

impl TruncationNotice {
    pub fn message(&self) -> String {
        match self.truncated {
            TruncatedStream::Animation => format!(
                "Animation ({:.0}ms) is longer than the video ({:.0}ms); exporting the first {:.0}ms",
                self.timeline_ms, self.media_ms, self.effective_ms
            ),
            TruncatedStream::Media => format!(
                "Video ({:.0}ms) is longer than the animation ({:.0}ms); exporting the first {:.0}ms",
                self.media_ms, self.timeline_ms, self.effective_ms
            ),
        }
    }
}

/// Callbacks from a running export. All methods default to no-ops.
pub trait ExportObserver: Send + Sync {
    fn state_changed(&self, _state: ExportState) {}

    /// Percentage in `0..=100`, or `None` when the indicator is cleared.
    fn progress(&self, _percent: Option<u32>) {}

    /// Called after frame `index` has been drawn and handed to the encoder.
    fn frame_composited(&self, _index: usize, _timestamp_ms: f64) {}

    fn truncated(&self, _notice: &TruncationNotice) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ExportObserver for NullObserver {}

/// `ceil(D * fps / 1000)`.
pub fn total_frames(effective_ms: f64, fps: u32) -> usize {
    (effective_ms * fps as f64 / 1000.0).ceil().max(0.0) as usize
}

/// Timestamps for frames `0..=total_frames`, each `f * 1000 / fps` clamped to `effective_ms`.
///
/// The final entry is exactly `effective_ms`.
pub fn frame_timestamps(effective_ms: f64, fps: u32) -> Vec<f64> {
    let fps = fps.max(1);
    let frame_delay = 1000.0 / fps as f64;
    (0..=total_frames(effective_ms, fps))
        .map(|f| (f as f64 * frame_delay).min(effective_ms))
        .collect()
}

/// The finished file, ready to be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    pub effective_duration_ms: f64,
}

impl ExportArtifact {
    /// Writes the file into `dir` under its variant name.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}
