//! # Encoder Backends
//!
//! Streaming frame encoders and the capability probe that picks one.
//!
//! ## Responsibilities
//! - **ChunkSink**: Collects the encoder's output chunks in arrival order.
//! - **FrameEncoder**: Push frames, then `finish` (flush) or `abort` (discard).
//! - **EncoderRegistry**: Preference-ordered factories; MP4 first, GIF as the fallback.

use crate::errors::ExportPrecondition;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Mp4,
    Gif,
}

impl ContainerFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Gif => "gif",
        }
    }
}

/// Shared writer that records each `write` call as one chunk.
#[derive(Clone, Debug, Default)]
pub struct ChunkSink {
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ChunkSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.lock().push(chunk);
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.lock().len()
    }

    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for ChunkSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A started encoding session.
pub trait FrameEncoder: Send {
    fn format(&self) -> ContainerFormat;

    /// `false` once the encoder has stopped accepting frames.
    fn is_active(&self) -> bool;

    /// Appends one straight-alpha RGBA frame presented at `timestamp_ms`.
    fn push_frame(&mut self, rgba: &[u8], timestamp_ms: f64) -> anyhow::Result<()>;

    /// Flushes all pending output into the sink.
    fn finish(self: Box<Self>) -> anyhow::Result<()>;

    /// Stops without producing a usable file.
    fn abort(self: Box<Self>);
}

/// Creates encoders of one container format.
pub trait EncoderFactory: Send + Sync {
    fn format(&self) -> ContainerFormat;

    fn name(&self) -> &'static str;

    /// Whether this host can actually produce the format.
    fn is_supported(&self) -> bool;

    fn create(
        &self,
        width: u32,
        height: u32,
        fps: u32,
        sink: ChunkSink,
    ) -> anyhow::Result<Box<dyn FrameEncoder>>;
}

/// Preference-ordered list of encoder factories.
#[derive(Clone)]
pub struct EncoderRegistry {
    factories: Vec<Arc<dyn EncoderFactory>>,
}

impl EncoderRegistry {
    pub fn new(factories: Vec<Arc<dyn EncoderFactory>>) -> Self {
        Self { factories }
    }

    /// Formats this host supports, best first.
    pub fn probe(&self) -> Vec<ContainerFormat> {
        self.factories
            .iter()
            .filter(|f| f.is_supported())
            .map(|f| f.format())
            .collect()
    }

    /// First supported factory, or the capability error naming everything tried.
    pub fn select(&self) -> Result<Arc<dyn EncoderFactory>, ExportPrecondition> {
        for factory in &self.factories {
            if factory.is_supported() {
                info!(encoder = factory.name(), mime = factory.format().mime_type(), "Selected encoder");
                return Ok(factory.clone());
            }
            debug!(encoder = factory.name(), "Encoder not supported on this host");
        }
        let tried: Vec<&str> = self.factories.iter().map(|f| f.name()).collect();
        Err(ExportPrecondition::UnsupportedEncoder(if tried.is_empty() {
            "none".to_string()
        } else {
            tried.join(", ")
        }))
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut factories: Vec<Arc<dyn EncoderFactory>> = Vec::new();
        #[cfg(feature = "video-rs")]
        factories.push(Arc::new(Mp4EncoderFactory));
        factories.push(Arc::new(GifEncoderFactory));
        Self::new(factories)
    }
}

impl std::fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|e| e.name()))
            .finish()
    }
}

/// Animated GIF through the `image` crate. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct GifEncoderFactory;

impl EncoderFactory for GifEncoderFactory {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Gif
    }

    fn name(&self) -> &'static str {
        "gif"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn create(
        &self,
        width: u32,
        height: u32,
        fps: u32,
        sink: ChunkSink,
    ) -> anyhow::Result<Box<dyn FrameEncoder>> {
        let mut encoder = GifEncoder::new_with_speed(sink, 10);
        encoder.set_repeat(Repeat::Infinite)?;
        Ok(Box::new(GifEncoderBackend {
            encoder: Some(encoder),
            width,
            height,
            frame_ms: 1000.0 / fps.max(1) as f64,
            pending: None,
        }))
    }
}

/// Frames are held back by one so each gets the delay up to its successor.
pub struct GifEncoderBackend {
    encoder: Option<GifEncoder<ChunkSink>>,
    width: u32,
    height: u32,
    frame_ms: f64,
    pending: Option<(RgbaImage, f64)>,
}

impl GifEncoderBackend {
    /// Writes a frame shown from `start_ms` until `end_ms`.
    ///
    /// GIF delays are stored in hundredths of a second. Both ends are rounded on the
    /// cumulative clock so the per-frame rounding error never accumulates.
    fn write(&mut self, image: RgbaImage, start_ms: f64, end_ms: f64) -> anyhow::Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("GIF encoder already closed"))?;
        let centis = ((end_ms / 10.0).round() - (start_ms / 10.0).round()).max(1.0) as u32;
        let delay = Delay::from_numer_denom_ms(centis * 10, 1);
        encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
        Ok(())
    }
}

impl FrameEncoder for GifEncoderBackend {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Gif
    }

    fn is_active(&self) -> bool {
        self.encoder.is_some()
    }

    fn push_frame(&mut self, rgba: &[u8], timestamp_ms: f64) -> anyhow::Result<()> {
        let image = RgbaImage::from_raw(self.width, self.height, rgba.to_vec())
            .ok_or_else(|| anyhow::anyhow!("frame buffer does not match {}x{}", self.width, self.height))?;
        if let Some((previous, at)) = self.pending.take() {
            self.write(previous, at, timestamp_ms)?;
        }
        self.pending = Some((image, timestamp_ms));
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> anyhow::Result<()> {
        if let Some((last, at)) = self.pending.take() {
            let end = at + self.frame_ms;
            self.write(last, at, end)?;
        }
        // Dropping the encoder writes the trailer.
        drop(self.encoder.take());
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        self.pending = None;
        self.encoder = None;
    }
}

#[cfg(feature = "video-rs")]
pub use mp4::{Mp4EncoderBackend, Mp4EncoderFactory};

#[cfg(feature = "video-rs")]
mod mp4 {
    use super::*;
    use anyhow::Context;
    use ndarray::Array3;
    use std::io::Read;
    use video_rs::encode::{Encoder, Settings};
    use video_rs::Time;

    /// H.264 in MP4 through FFmpeg.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Mp4EncoderFactory;

    impl EncoderFactory for Mp4EncoderFactory {
        fn format(&self) -> ContainerFormat {
            ContainerFormat::Mp4
        }

        fn name(&self) -> &'static str {
            "mp4 (h264)"
        }

        fn is_supported(&self) -> bool {
            video_rs::init().is_ok()
        }

        fn create(
            &self,
            width: u32,
            height: u32,
            _fps: u32,
            sink: ChunkSink,
        ) -> anyhow::Result<Box<dyn FrameEncoder>> {
            // FFmpeg muxes to a seekable file; its bytes are streamed into the sink on finish.
            let file = tempfile::Builder::new().suffix(".mp4").tempfile()?;
            let settings = Settings::preset_h264_yuv420p(width as usize, height as usize, false);
            let encoder = Encoder::new(file.path().to_path_buf(), settings).context("Failed to start H.264 encoder")?;
            Ok(Box::new(Mp4EncoderBackend {
                encoder: Some(encoder),
                file,
                width: width as usize,
                height: height as usize,
                sink,
            }))
        }
    }

    pub struct Mp4EncoderBackend {
        encoder: Option<Encoder>,
        file: tempfile::NamedTempFile,
        width: usize,
        height: usize,
        sink: ChunkSink,
    }

    impl FrameEncoder for Mp4EncoderBackend {
        fn format(&self) -> ContainerFormat {
            ContainerFormat::Mp4
        }

        fn is_active(&self) -> bool {
            self.encoder.is_some()
        }

        fn push_frame(&mut self, rgba: &[u8], timestamp_ms: f64) -> anyhow::Result<()> {
            let encoder = self
                .encoder
                .as_mut()
                .context("MP4 encoder already closed")?;
            let rgb: Vec<u8> = rgba
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let frame = Array3::from_shape_vec((self.height, self.width, 3), rgb)?;
            encoder.encode(&frame, Time::from_secs_f64(timestamp_ms / 1000.0))?;
            Ok(())
        }

        fn finish(mut self: Box<Self>) -> anyhow::Result<()> {
            if let Some(mut encoder) = self.encoder.take() {
                encoder.finish()?;
            }
            let mut reader = self.file.reopen()?;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                self.sink.push(buf[..n].to_vec());
            }
            Ok(())
        }

        fn abort(mut self: Box<Self>) {
            self.encoder = None;
        }
    }
}
