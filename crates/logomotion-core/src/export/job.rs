use super::{
    frame_timestamps, ChunkSink, EncoderRegistry, ExportArtifact, ExportObserver, ExportState,
    ExportVariant, FrameEncoder, TruncatedStream, TruncationNotice,
};
use crate::compositor::{FrameCompositor, Snapshotter};
use crate::config::StudioConfig;
use crate::errors::{ExportError, ExportPrecondition, FrameStage};
use crate::gate::OperationGate;
use crate::media::{seek_with_timeout, MediaTrack};
use crate::scene::{lock_scene, SceneHandle};
use crate::timeline::TimelineHandle;
use crate::types::{Color, OverlayTransform};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Everything one export reads from the session.
pub struct ExportInput<'a> {
    pub variant: ExportVariant,
    pub timeline: Option<&'a TimelineHandle>,
    pub scene: Option<&'a SceneHandle>,
    /// Measured size of the scene container.
    pub dimensions: (u32, u32),
    pub overlay: OverlayTransform,
    /// Only used by the composited variant.
    pub media: Option<&'a mut dyn MediaTrack>,
}

/// Drives the `Idle -> Preparing -> Recording -> Finalizing` state machine.
pub struct ExportEncoder {
    registry: EncoderRegistry,
    snapshotter: Arc<dyn Snapshotter>,
    gate: OperationGate,
    fps: u32,
    seek_timeout: Duration,
    truncation_threshold_ms: f64,
    background: Color,
    state: ExportState,
}

struct Recording<'a> {
    timeline: &'a TimelineHandle,
    scene: &'a SceneHandle,
    media: Option<&'a mut dyn MediaTrack>,
    overlay: OverlayTransform,
    compositor: FrameCompositor,
    encoder: Box<dyn FrameEncoder>,
}

fn frame_error(stage: FrameStage, frame_index: usize, message: impl ToString) -> ExportError {
    ExportError::Frame {
        stage,
        frame_index,
        message: message.to_string(),
    }
}

impl ExportEncoder {
    pub fn new(
        config: &StudioConfig,
        registry: EncoderRegistry,
        snapshotter: Arc<dyn Snapshotter>,
        gate: OperationGate,
    ) -> Self {
        Self {
            registry,
            snapshotter,
            gate,
            fps: config.fps.max(1),
            seek_timeout: config.seek_timeout(),
            truncation_threshold_ms: config.truncation_threshold_ms,
            background: config.background_color(),
            state: ExportState::Idle,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn registry(&self) -> &EncoderRegistry {
        &self.registry
    }

    fn set_state(&mut self, state: ExportState, observer: &dyn ExportObserver) {
        debug!(from = ?self.state, to = ?state, "Export state");
        self.state = state;
        observer.state_changed(state);
    }

    /// Runs one export to completion.
    ///
    /// Preconditions fail before any frame work. Any later failure stops the encoder and
    /// discards its output. Both clocks are back at 0 and the state is `Idle` on return.
    #[instrument(level = "info", skip_all, fields(variant = ?input.variant, fps = self.fps))]
    pub async fn run(
        &mut self,
        input: ExportInput<'_>,
        observer: &dyn ExportObserver,
    ) -> Result<ExportArtifact, ExportError> {
        let _permit = self.gate.try_begin_export().map_err(|busy| {
            warn!(%busy, "Export rejected");
            ExportError::Busy
        })?;

        let ExportInput {
            variant,
            timeline,
            scene,
            dimensions: (width, height),
            overlay,
            media,
        } = input;

        // Preconditions.
        let timeline = timeline.ok_or(ExportPrecondition::MissingTimeline)?;
        let timeline_ms = timeline.duration_ms();
        if !(timeline_ms.is_finite() && timeline_ms > 0.0) {
            return Err(ExportPrecondition::InvalidTimelineDuration(timeline_ms).into());
        }
        let scene = match scene {
            Some(scene) if width > 0 && height > 0 => scene,
            _ => return Err(ExportPrecondition::ZeroDimensions(width, height).into()),
        };
        let media = match variant {
            ExportVariant::AnimationOnly => None,
            ExportVariant::Composited => {
                let media = media.ok_or(ExportPrecondition::MissingMedia)?;
                let secs = media.duration_secs();
                if !(secs.is_finite() && secs > 0.0) {
                    return Err(ExportPrecondition::InvalidMediaDuration(secs).into());
                }
                if !media.can_play() {
                    return Err(ExportPrecondition::MediaNotReady.into());
                }
                Some(media)
            }
        };
        let factory = self.registry.select()?;

        self.set_state(ExportState::Preparing, observer);
        let mut media = media;
        let prepared = self
            .prepare(timeline, media.as_deref_mut(), timeline_ms, observer)
            .await;
        let effective_ms = match prepared {
            Ok(ms) => ms,
            Err(e) => return Err(self.fail(e, timeline, media, observer).await),
        };

        let compositor = match FrameCompositor::new(self.snapshotter.clone(), width, height, self.background) {
            Ok(c) => c,
            Err(e) => {
                let e = frame_error(FrameStage::Prepare, 0, e);
                return Err(self.fail(e, timeline, media, observer).await);
            }
        };
        let sink = ChunkSink::new();
        let encoder = match factory.create(width, height, self.fps, sink.clone()) {
            Ok(encoder) => encoder,
            Err(e) => {
                let e = ExportError::Encoder(format!("{e:#}"));
                return Err(self.fail(e, timeline, media, observer).await);
            }
        };
        let format = encoder.format();

        let mut recording = Recording {
            timeline,
            scene,
            media,
            overlay,
            compositor,
            encoder,
        };

        self.set_state(ExportState::Recording, observer);
        let timestamps = frame_timestamps(effective_ms, self.fps);
        let total = timestamps.len() - 1;
        info!(effective_ms, total_frames = total, width, height, "Recording");

        let mut frames = 0;
        for (index, &t_ms) in timestamps.iter().enumerate() {
            if !recording.encoder.is_active() {
                debug!(index, "Encoder stopped accepting frames");
                break;
            }
            if let Err(e) = self.record_frame(&mut recording, index, t_ms).await {
                warn!(error = %e, "Export aborted");
                recording.encoder.abort();
                sink.clear();
                return Err(self.fail(e, timeline, recording.media, observer).await);
            }
            frames += 1;
            observer.frame_composited(index, t_ms);
            observer.progress(Some((100.0 * index as f64 / total.max(1) as f64).round() as u32));
        }

        self.set_state(ExportState::Finalizing, observer);
        let finished = recording.encoder.finish();
        let chunks = sink.take();
        let result = match finished {
            Err(e) => Err(ExportError::Encoder(format!("{e:#}"))),
            Ok(()) if chunks.is_empty() => Err(ExportError::NoDataProduced),
            Ok(()) => Ok(ExportArtifact {
                file_name: variant.file_name(format),
                mime_type: format.mime_type(),
                bytes: chunks.concat(),
                frame_count: frames,
                effective_duration_ms: effective_ms,
            }),
        };

        match result {
            Ok(artifact) => {
                self.teardown(timeline, recording.media, observer).await;
                self.set_state(ExportState::Idle, observer);
                info!(
                    file = %artifact.file_name,
                    bytes = artifact.bytes.len(),
                    frames = artifact.frame_count,
                    "Export finished"
                );
                Ok(artifact)
            }
            Err(e) => Err(self.fail(e, timeline, recording.media, observer).await),
        }
    }

    /// Pauses and rewinds both clocks, then settles and measures the exportable window.
    async fn prepare(
        &self,
        timeline: &TimelineHandle,
        media: Option<&mut (dyn MediaTrack + '_)>,
        timeline_ms: f64,
        observer: &dyn ExportObserver,
    ) -> Result<f64, ExportError> {
        timeline.pause();
        timeline.seek(0.0);

        let mut effective_ms = timeline_ms;
        if let Some(media) = media {
            media.pause();
            seek_with_timeout(media, 0.0, self.seek_timeout)
                .await
                .map_err(|e| frame_error(FrameStage::Prepare, 0, e))?;

            let media_ms = media.duration_secs() * 1000.0;
            effective_ms = timeline_ms.min(media_ms);
            if (timeline_ms - media_ms).abs() > self.truncation_threshold_ms {
                let notice = TruncationNotice {
                    truncated: if timeline_ms > media_ms {
                        TruncatedStream::Animation
                    } else {
                        TruncatedStream::Media
                    },
                    timeline_ms,
                    media_ms,
                    effective_ms,
                };
                info!(timeline_ms, media_ms, effective_ms, "{}", notice.message());
                observer.truncated(&notice);
            }
        }

        tokio::task::yield_now().await;
        Ok(effective_ms)
    }

    async fn record_frame(
        &self,
        rec: &mut Recording<'_>,
        index: usize,
        t_ms: f64,
    ) -> Result<(), ExportError> {
        rec.timeline.seek(t_ms);

        if let Some(media) = rec.media.as_deref_mut() {
            seek_with_timeout(media, t_ms / 1000.0, self.seek_timeout)
                .await
                .map_err(|e| frame_error(FrameStage::MediaSeek, index, e))?;
        }

        tokio::task::yield_now().await;

        let frame = rec.media.as_deref().and_then(|m| m.current_frame());
        if rec.media.is_some() && frame.is_none() {
            return Err(frame_error(FrameStage::Capture, index, "background video has no frame"));
        }
        {
            let graph = lock_scene(rec.scene);
            rec.compositor
                .composite(&graph, frame, rec.overlay)
                .map_err(|e| frame_error(FrameStage::Capture, index, e))?;
        }

        let rgba = rec.compositor.rgba();
        rec.encoder
            .push_frame(&rgba, t_ms)
            .map_err(|e| frame_error(FrameStage::Encode, index, format!("{e:#}")))?;
        debug!(index, t_ms, "Frame recorded");
        Ok(())
    }

    async fn fail(
        &mut self,
        error: ExportError,
        timeline: &TimelineHandle,
        media: Option<&mut (dyn MediaTrack + '_)>,
        observer: &dyn ExportObserver,
    ) -> ExportError {
        self.set_state(ExportState::Failed, observer);
        self.teardown(timeline, media, observer).await;
        self.set_state(ExportState::Idle, observer);
        error
    }

    /// Rewinds both clocks and clears progress. Runs on success and failure alike.
    async fn teardown(
        &self,
        timeline: &TimelineHandle,
        media: Option<&mut (dyn MediaTrack + '_)>,
        observer: &dyn ExportObserver,
    ) {
        timeline.pause();
        timeline.seek(0.0);
        if let Some(media) = media {
            media.pause();
            if let Err(e) = seek_with_timeout(media, 0.0, self.seek_timeout).await {
                warn!(error = %e, "Could not rewind background video after export");
            }
        }
        observer.progress(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::ResvgSnapshotter;
    use crate::errors::MediaError;
    use crate::export::{GifEncoderFactory, NullObserver};
    use crate::media::{FrameSource, ThreadedTrack, VideoFrame};
    use crate::scene::SceneGraph;
    use crate::timeline::{Offset, StepParams, TimelineParams};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const DOC: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16">
        <rect id="layer-1" width="8" height="8" fill="red"/></svg>"#;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(usize, f64)>>,
        states: Mutex<Vec<ExportState>>,
        progress: Mutex<Vec<Option<u32>>>,
        notices: Mutex<Vec<TruncationNotice>>,
    }

    impl ExportObserver for Recorder {
        fn state_changed(&self, state: ExportState) {
            self.states.lock().unwrap().push(state);
        }
        fn progress(&self, percent: Option<u32>) {
            self.progress.lock().unwrap().push(percent);
        }
        fn frame_composited(&self, index: usize, timestamp_ms: f64) {
            self.frames.lock().unwrap().push((index, timestamp_ms));
        }
        fn truncated(&self, notice: &TruncationNotice) {
            self.notices.lock().unwrap().push(*notice);
        }
    }

    /// In-memory track. Seeks to non-zero targets can stall or sleep.
    struct FakeTrack {
        duration: f64,
        time: f64,
        frame: VideoFrame,
        stall: bool,
        latency: Option<Duration>,
    }

    impl FakeTrack {
        fn new(duration: f64) -> Self {
            Self {
                duration,
                time: 0.0,
                frame: VideoFrame::solid(16, 16, [0, 0, 255, 255]),
                stall: false,
                latency: None,
            }
        }
    }

    #[async_trait]
    impl MediaTrack for FakeTrack {
        fn duration_secs(&self) -> f64 {
            self.duration
        }
        fn can_play(&self) -> bool {
            true
        }
        fn current_time_secs(&self) -> f64 {
            self.time
        }
        fn pause(&mut self) {}
        async fn seek(&mut self, secs: f64) -> Result<(), MediaError> {
            if self.stall && secs > 0.0 {
                std::future::pending::<()>().await;
            }
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.time = secs.min(self.duration);
            Ok(())
        }
        fn current_frame(&self) -> Option<&VideoFrame> {
            Some(&self.frame)
        }
    }

    fn scene() -> SceneHandle {
        Arc::new(Mutex::new(SceneGraph::parse(DOC).unwrap()))
    }

    fn timeline(scene: &SceneHandle, duration_ms: f64) -> TimelineHandle {
        let tl = TimelineHandle::new(scene.clone(), TimelineParams::default());
        tl.add(
            StepParams {
                duration: Some(duration_ms),
                ..Default::default()
            },
            Offset::After,
        )
        .unwrap();
        tl
    }

    fn encoder(gate: OperationGate) -> ExportEncoder {
        let config = StudioConfig {
            seek_timeout_ms: 50,
            ..Default::default()
        };
        ExportEncoder::new(
            &config,
            EncoderRegistry::new(vec![Arc::new(GifEncoderFactory)]),
            Arc::new(ResvgSnapshotter::without_fonts()),
            gate,
        )
    }

    fn input<'a>(
        variant: ExportVariant,
        timeline: &'a TimelineHandle,
        scene: &'a SceneHandle,
        media: Option<&'a mut dyn MediaTrack>,
    ) -> ExportInput<'a> {
        ExportInput {
            variant,
            timeline: Some(timeline),
            scene: Some(scene),
            dimensions: (16, 16),
            overlay: OverlayTransform::default(),
            media,
        }
    }

    #[tokio::test]
    async fn one_second_exports_thirty_one_frames_ending_on_the_duration() {
        let scene = scene();
        let tl = timeline(&scene, 1000.0);
        let observer = Recorder::default();
        let mut job = encoder(OperationGate::new());

        let artifact = job
            .run(input(ExportVariant::AnimationOnly, &tl, &scene, None), &observer)
            .await
            .unwrap();

        let frames = observer.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 31);
        assert_eq!(frames.last().copied(), Some((30, 1000.0)));
        assert_eq!(artifact.frame_count, 31);
        assert_eq!(artifact.file_name, "animation-only.gif");
        assert_eq!(artifact.mime_type, "image/gif");
        assert!(artifact.bytes.starts_with(b"GIF89a"));
        assert_eq!(
            *observer.states.lock().unwrap(),
            vec![
                ExportState::Preparing,
                ExportState::Recording,
                ExportState::Finalizing,
                ExportState::Idle
            ]
        );
        assert_eq!(observer.progress.lock().unwrap().last(), Some(&None));
        assert_eq!(tl.current_time_ms(), 0.0);
        assert_eq!(job.state(), ExportState::Idle);
    }

    #[tokio::test]
    async fn composited_export_truncates_to_the_shorter_stream() {
        let scene = scene();
        let tl = timeline(&scene, 2000.0);
        let mut media = FakeTrack::new(1.5);
        let observer = Recorder::default();
        let mut job = encoder(OperationGate::new());

        let artifact = job
            .run(
                input(ExportVariant::Composited, &tl, &scene, Some(&mut media)),
                &observer,
            )
            .await
            .unwrap();

        assert_eq!(artifact.effective_duration_ms, 1500.0);
        assert_eq!(artifact.file_name, "composited-animation.gif");
        let notices = observer.notices.lock().unwrap().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].truncated, TruncatedStream::Animation);
        let frames = observer.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 46);
        assert_eq!(frames.last().unwrap().1, 1500.0);
        assert_eq!(media.current_time_secs(), 0.0);
    }

    #[tokio::test]
    async fn small_mismatches_raise_no_notice() {
        let scene = scene();
        let tl = timeline(&scene, 1000.0);
        let mut media = FakeTrack::new(0.98);
        let observer = Recorder::default();

        encoder(OperationGate::new())
            .run(
                input(ExportVariant::Composited, &tl, &scene, Some(&mut media)),
                &observer,
            )
            .await
            .unwrap();
        assert!(observer.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stalled_media_fails_the_frame_and_rewinds_both_clocks() {
        let scene = scene();
        let tl = timeline(&scene, 500.0);
        let mut media = FakeTrack::new(1.0);
        media.stall = true;
        let observer = Recorder::default();
        let mut job = encoder(OperationGate::new());

        let err = job
            .run(
                input(ExportVariant::Composited, &tl, &scene, Some(&mut media)),
                &observer,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExportError::Frame {
                stage: FrameStage::MediaSeek,
                frame_index: 1,
                ..
            }
        ));
        assert_eq!(tl.current_time_ms(), 0.0);
        assert_eq!(job.state(), ExportState::Idle);
        let states = observer.states.lock().unwrap().clone();
        assert!(states.contains(&ExportState::Failed));
        assert_eq!(states.last(), Some(&ExportState::Idle));
        assert_eq!(observer.progress.lock().unwrap().last(), Some(&None));
    }

    /// Decodes fine at the start of the clip and errors from `fail_from` onward.
    struct BrokenClip {
        fail_from: f64,
    }

    impl FrameSource for BrokenClip {
        fn duration_secs(&self) -> f64 {
            1.0
        }

        fn frame_at(&mut self, secs: f64) -> anyhow::Result<VideoFrame> {
            if secs >= self.fail_from {
                anyhow::bail!("corrupt packet at {secs:.3}s");
            }
            Ok(VideoFrame::solid(16, 16, [0, 128, 0, 255]))
        }
    }

    #[tokio::test]
    async fn decoder_errors_mid_export_fail_that_frame() {
        let scene = scene();
        let tl = timeline(&scene, 1000.0);
        let mut media = ThreadedTrack::start("broken.mp4", BrokenClip { fail_from: 0.15 })
            .await
            .unwrap();
        let observer = Recorder::default();
        let mut job = encoder(OperationGate::new());

        let result = job
            .run(
                input(ExportVariant::Composited, &tl, &scene, Some(&mut media)),
                &observer,
            )
            .await;

        // Frame 5 is the first at or past 150ms on a 30fps clock.
        match result {
            Err(ExportError::Frame {
                stage: FrameStage::MediaSeek,
                frame_index,
                message,
            }) => {
                assert_eq!(frame_index, 5);
                assert!(message.contains("corrupt packet"));
            }
            other => panic!("unexpected export result: {other:?}"),
        }
        assert_eq!(observer.frames.lock().unwrap().len(), 5);
        assert_eq!(tl.current_time_ms(), 0.0);
        assert_eq!(media.current_time_secs(), 0.0);
        assert_eq!(job.state(), ExportState::Idle);
        assert_eq!(
            observer.states.lock().unwrap().last(),
            Some(&ExportState::Idle)
        );
    }

    #[tokio::test]
    async fn undrawable_media_frames_fail_capture() {
        let scene = scene();
        let tl = timeline(&scene, 500.0);
        let mut media = FakeTrack::new(1.0);
        media.frame = VideoFrame {
            width: 16,
            height: 16,
            rgba: Vec::new(),
        };
        let mut job = encoder(OperationGate::new());

        let err = job
            .run(
                input(ExportVariant::Composited, &tl, &scene, Some(&mut media)),
                &NullObserver,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Frame {
                stage: FrameStage::Capture,
                frame_index: 0,
                ..
            }
        ));
        assert_eq!(job.state(), ExportState::Idle);
    }

    #[tokio::test]
    async fn preconditions_fail_before_any_frame_work() {
        let scene = scene();
        let tl = timeline(&scene, 1000.0);
        let observer = Recorder::default();
        let mut job = encoder(OperationGate::new());

        let missing = ExportInput {
            timeline: None,
            ..input(ExportVariant::AnimationOnly, &tl, &scene, None)
        };
        assert_eq!(
            job.run(missing, &observer).await.unwrap_err(),
            ExportError::Precondition(ExportPrecondition::MissingTimeline)
        );

        let zero = ExportInput {
            dimensions: (0, 16),
            ..input(ExportVariant::AnimationOnly, &tl, &scene, None)
        };
        assert_eq!(
            job.run(zero, &observer).await.unwrap_err(),
            ExportError::Precondition(ExportPrecondition::ZeroDimensions(0, 16))
        );

        let no_media = input(ExportVariant::Composited, &tl, &scene, None);
        assert_eq!(
            job.run(no_media, &observer).await.unwrap_err(),
            ExportError::Precondition(ExportPrecondition::MissingMedia)
        );

        let mut endless = FakeTrack::new(f64::INFINITY);
        let endless_input = input(ExportVariant::Composited, &tl, &scene, Some(&mut endless));
        assert!(matches!(
            job.run(endless_input, &observer).await.unwrap_err(),
            ExportError::Precondition(ExportPrecondition::InvalidMediaDuration(_))
        ));

        let empty = timeline(&scene, 0.0);
        assert_eq!(
            job.run(input(ExportVariant::AnimationOnly, &empty, &scene, None), &observer)
                .await
                .unwrap_err(),
            ExportError::Precondition(ExportPrecondition::InvalidTimelineDuration(0.0))
        );

        assert!(observer.frames.lock().unwrap().is_empty());
        assert!(observer.states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_encoders_are_a_capability_error() {
        let scene = scene();
        let tl = timeline(&scene, 100.0);
        let mut job = ExportEncoder::new(
            &StudioConfig::default(),
            EncoderRegistry::new(vec![]),
            Arc::new(ResvgSnapshotter::without_fonts()),
            OperationGate::new(),
        );
        let err = job
            .run(input(ExportVariant::AnimationOnly, &tl, &scene, None), &NullObserver)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Precondition(ExportPrecondition::UnsupportedEncoder(_))
        ));
    }

    #[tokio::test]
    async fn exports_hold_the_gate_for_their_whole_run() {
        let scene = scene();
        let tl = timeline(&scene, 300.0);
        let mut media = FakeTrack::new(1.0);
        media.latency = Some(Duration::from_millis(2));
        let gate = OperationGate::new();
        let mut job = encoder(gate.clone());

        let held = gate.try_begin_generation().unwrap();
        let err = job
            .run(input(ExportVariant::AnimationOnly, &tl, &scene, None), &NullObserver)
            .await
            .unwrap_err();
        assert_eq!(err, ExportError::Busy);
        drop(held);

        let probe = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            (
                gate.try_begin_generation().is_err(),
                gate.try_begin_execution().is_err(),
            )
        };
        let (result, (generation_blocked, execution_blocked)) = tokio::join!(
            job.run(
                input(ExportVariant::Composited, &tl, &scene, Some(&mut media)),
                &NullObserver
            ),
            probe
        );
        assert!(result.is_ok());
        assert!(generation_blocked);
        assert!(execution_blocked);
        assert!(gate.active().is_none());
    }
}
