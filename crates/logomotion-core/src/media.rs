//! # Media Module
//!
//! The optional background track composited under the scene during export.
//!
//! ## Responsibilities
//! - **MediaTrack**: Independently clocked track with an awaitable seek.
//! - **FrameSource**: Blocking frame providers (image sequences, FFmpeg video).
//! - **ThreadedTrack**: Serves a `FrameSource` from a decoder thread.
//!
//! Seeks complete when the requested frame has been decoded. Callers bound the wait with
//! `seek_with_timeout`.

use crate::errors::MediaError;
use anyhow::Context;
use async_trait::async_trait;
use crossbeam_channel::{unbounded, Sender};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tiny_skia::{IntSize, Pixmap};
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

/// One decoded frame, straight (non-premultiplied) RGBA.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl VideoFrame {
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        Self {
            width,
            height,
            rgba: rgba.repeat(pixels),
        }
    }

    /// Premultiplied copy suitable for drawing.
    pub fn to_pixmap(&self) -> Option<Pixmap> {
        let size = IntSize::from_wh(self.width, self.height)?;
        if self.rgba.len() != (self.width as usize) * (self.height as usize) * 4 {
            return None;
        }
        let mut data = self.rgba.clone();
        for px in data.chunks_exact_mut(4) {
            let a = px[3] as u16;
            if a < 255 {
                for c in &mut px[..3] {
                    *c = ((*c as u16 * a + 127) / 255) as u8;
                }
            }
        }
        Pixmap::from_vec(data, size)
    }
}

/// An independently clocked background track.
#[async_trait]
pub trait MediaTrack: Send {
    /// Total length in seconds. Non-finite or non-positive means unknown.
    fn duration_secs(&self) -> f64;

    /// Whether enough data is loaded to present frames.
    fn can_play(&self) -> bool;

    fn current_time_secs(&self) -> f64;

    fn pause(&mut self);

    /// Sets the clock and resolves once the frame for `secs` is presentable.
    async fn seek(&mut self, secs: f64) -> Result<(), MediaError>;

    /// The frame for the current clock position.
    fn current_frame(&self) -> Option<&VideoFrame>;

    fn label(&self) -> &str {
        "media"
    }
}

/// Seeks `track` and fails with `SeekTimeout` if completion takes longer than `timeout`.
pub async fn seek_with_timeout(
    track: &mut (dyn MediaTrack + '_),
    secs: f64,
    timeout: Duration,
) -> Result<(), MediaError> {
    match tokio::time::timeout(timeout, track.seek(secs)).await {
        Ok(result) => result,
        Err(_) => Err(MediaError::SeekTimeout { target_secs: secs }),
    }
}

/// Blocking frame provider run on a decoder thread.
pub trait FrameSource {
    fn duration_secs(&self) -> f64;

    fn frame_at(&mut self, secs: f64) -> anyhow::Result<VideoFrame>;
}

/// Frames with start times, as decoded from still images or animated GIFs.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    frames: Vec<(f64, VideoFrame)>,
    duration: f64,
}

impl FrameSequence {
    /// Evenly spaced frames at `fps`.
    pub fn from_frames(frames: Vec<VideoFrame>, fps: f64) -> Self {
        let step = 1.0 / fps.max(f64::EPSILON);
        let duration = frames.len() as f64 * step;
        Self {
            frames: frames
                .into_iter()
                .enumerate()
                .map(|(i, f)| (i as f64 * step, f))
                .collect(),
            duration,
        }
    }

    /// A single image held for `duration_secs`.
    pub fn still(frame: VideoFrame, duration_secs: f64) -> Self {
        Self {
            frames: vec![(0.0, frame)],
            duration: duration_secs,
        }
    }

    pub fn open_still(path: &Path, duration_secs: f64) -> anyhow::Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to open image {}", path.display()))?
            .to_rgba8();
        Ok(Self::still(VideoFrame::from_image(image), duration_secs))
    }

    /// Every frame of an animated GIF with its own delay.
    pub fn open_gif(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let decoder = GifDecoder::new(BufReader::new(file))?;
        let mut frames = Vec::new();
        let mut start = 0.0;
        for frame in decoder.into_frames().collect_frames()? {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay_secs = if denom == 0 {
                0.1
            } else {
                numer as f64 / denom as f64 / 1000.0
            };
            frames.push((start, VideoFrame::from_image(frame.into_buffer())));
            // Zero delays play at the browser minimum.
            start += if delay_secs <= 0.0 { 0.1 } else { delay_secs };
        }
        if frames.is_empty() {
            anyhow::bail!("{} contains no frames", path.display());
        }
        Ok(Self {
            frames,
            duration: start,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for FrameSequence {
    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn frame_at(&mut self, secs: f64) -> anyhow::Result<VideoFrame> {
        let index = self
            .frames
            .partition_point(|(start, _)| *start <= secs)
            .saturating_sub(1);
        self.frames
            .get(index)
            .map(|(_, frame)| frame.clone())
            .context("Frame sequence is empty")
    }
}

#[cfg(feature = "video-rs")]
mod ffmpeg {
    use super::*;
    use std::path::PathBuf;

    /// A video file decoded with FFmpeg.
    pub struct VideoFileSource {
        decoder: video_rs::Decoder,
        duration: f64,
        current_time: f64,
        last_frame: Option<(f64, VideoFrame)>,
    }

    impl VideoFileSource {
        pub fn open(path: PathBuf) -> anyhow::Result<Self> {
            video_rs::init().map_err(|e| anyhow::anyhow!("FFmpeg init failed: {e}"))?;
            let decoder = video_rs::Decoder::new(path.clone())
                .with_context(|| format!("Failed to open video {}", path.display()))?;
            let duration = decoder
                .duration()
                .map(|t| t.as_secs_f64())
                .unwrap_or(f64::NAN);
            Ok(Self {
                decoder,
                duration,
                current_time: -1.0,
                last_frame: None,
            })
        }
    }

    impl FrameSource for VideoFileSource {
        fn duration_secs(&self) -> f64 {
            self.duration
        }

        fn frame_at(&mut self, target: f64) -> anyhow::Result<VideoFrame> {
            if let Some((t, frame)) = &self.last_frame {
                if (t - target).abs() < 0.001 {
                    return Ok(frame.clone());
                }
            }
            if target < self.current_time || target - self.current_time > 1.0 {
                self.decoder.seek((target * 1000.0) as i64)?;
                self.current_time = target - 0.1;
            }

            for _ in 0..200 {
                let Ok((time, frame)) = self.decoder.decode() else {
                    break;
                };
                let t = time.as_secs_f64();
                self.current_time = t;
                if t < target - 0.01 {
                    continue;
                }
                let shape = frame.shape().to_vec();
                if shape.len() != 3 || shape[2] < 3 {
                    continue;
                }
                let (h, w, channels) = (shape[0] as u32, shape[1] as u32, shape[2]);
                let (bytes, _) = frame.into_raw_vec_and_offset();
                let rgba = if channels == 3 {
                    let mut rgba = Vec::with_capacity((w * h * 4) as usize);
                    for chunk in bytes.chunks(3) {
                        rgba.extend_from_slice(chunk);
                        rgba.push(255);
                    }
                    rgba
                } else {
                    bytes
                };
                let decoded = VideoFrame {
                    width: w,
                    height: h,
                    rgba,
                };
                self.last_frame = Some((t, decoded.clone()));
                return Ok(decoded);
            }

            // Past the end: hold the final frame.
            self.last_frame
                .as_ref()
                .map(|(_, f)| f.clone())
                .with_context(|| format!("Could not decode frame at {target}s"))
        }
    }
}

#[cfg(feature = "video-rs")]
pub use ffmpeg::VideoFileSource;

enum TrackCommand {
    Seek {
        secs: f64,
        reply: oneshot::Sender<Result<VideoFrame, String>>,
    },
}

/// A `MediaTrack` backed by a `FrameSource` on its own decoder thread.
#[derive(Debug)]
pub struct ThreadedTrack {
    label: String,
    cmd_tx: Sender<TrackCommand>,
    duration: f64,
    current_time: f64,
    frame: Option<VideoFrame>,
    failed: bool,
}

impl ThreadedTrack {
    /// Runs `source` on a decoder thread and decodes the first frame.
    pub async fn start<S>(label: impl Into<String>, source: S) -> Result<Self, MediaError>
    where
        S: FrameSource + Send + 'static,
    {
        Self::start_with(label, move || Ok(source)).await
    }

    /// Builds the source on the decoder thread itself, for decoders that cannot move
    /// between threads.
    pub async fn start_with<S, F>(label: impl Into<String>, make: F) -> Result<Self, MediaError>
    where
        S: FrameSource,
        F: FnOnce() -> anyhow::Result<S> + Send + 'static,
    {
        let label = label.into();
        let (cmd_tx, cmd_rx) = unbounded::<TrackCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<f64, String>>();

        thread::spawn(move || {
            let mut source = match make() {
                Ok(source) => source,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{e:#}")));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(source.duration_secs()));

            while let Ok(TrackCommand::Seek { mut secs, mut reply }) = cmd_rx.recv() {
                // Only the newest pending seek is decoded; older callers see a dropped reply.
                while let Ok(TrackCommand::Seek { secs: s, reply: r }) = cmd_rx.try_recv() {
                    secs = s;
                    reply = r;
                }
                let result = source.frame_at(secs).map_err(|e| format!("{e:#}"));
                let _ = reply.send(result);
            }
        });

        let duration = match ready_rx.await {
            Ok(Ok(duration)) => duration,
            Ok(Err(message)) => return Err(MediaError::Decoder(message)),
            Err(_) => return Err(MediaError::Decoder("decoder thread exited".to_string())),
        };

        let mut track = Self {
            label,
            cmd_tx,
            duration,
            current_time: 0.0,
            frame: None,
            failed: false,
        };
        track.seek(0.0).await?;
        debug!(track = %track.label, duration_secs = duration, "Media track ready");
        Ok(track)
    }

    /// Opens an image, GIF, or (with the `video-rs` feature) a video file.
    pub async fn open(path: &Path, still_duration_secs: f64) -> anyhow::Result<Self> {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let track = match extension.as_str() {
            "gif" => Self::start(label, FrameSequence::open_gif(path)?).await?,
            "png" | "jpg" | "jpeg" | "webp" | "bmp" => {
                Self::start(label, FrameSequence::open_still(path, still_duration_secs)?).await?
            }
            #[cfg(feature = "video-rs")]
            _ => {
                let path = path.to_path_buf();
                Self::start_with(label, move || VideoFileSource::open(path)).await?
            }
            #[cfg(not(feature = "video-rs"))]
            other => anyhow::bail!(
                "Unsupported media type '.{}' (video files need the video-rs feature)",
                other
            ),
        };
        Ok(track)
    }
}

#[async_trait]
impl MediaTrack for ThreadedTrack {
    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn can_play(&self) -> bool {
        !self.failed && self.frame.is_some()
    }

    fn current_time_secs(&self) -> f64 {
        self.current_time
    }

    fn pause(&mut self) {}

    #[instrument(level = "trace", skip(self), fields(track = %self.label))]
    async fn seek(&mut self, secs: f64) -> Result<(), MediaError> {
        let target = if self.duration.is_finite() && self.duration > 0.0 {
            secs.clamp(0.0, self.duration)
        } else {
            secs.max(0.0)
        };
        self.current_time = target;

        let (reply, response) = oneshot::channel();
        if self.cmd_tx.send(TrackCommand::Seek { secs: target, reply }).is_err() {
            self.failed = true;
            return Err(MediaError::Decoder("decoder thread has stopped".to_string()));
        }
        match response.await {
            Ok(Ok(frame)) => {
                self.frame = Some(frame);
                self.failed = false;
                Ok(())
            }
            Ok(Err(message)) => {
                warn!(track = %self.label, %message, "Media decode failed");
                self.failed = true;
                Err(MediaError::Decoder(message))
            }
            Err(_) => {
                debug!(track = %self.label, "Seek superseded before completion");
                Err(MediaError::Decoder("seek superseded".to_string()))
            }
        }
    }

    fn current_frame(&self) -> Option<&VideoFrame> {
        self.frame.as_ref()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
