mod common;

use common::{Inbox, Recorder, FOUR_LAYER_LOGO};
use logomotion::engine::export::{
    frame_timestamps, EncoderRegistry, ExportState, GifEncoderFactory, NullObserver,
    TruncatedStream,
};
use logomotion::engine::media::{FrameSequence, ThreadedTrack, VideoFrame};
use logomotion::engine::{ExportPrecondition, NoticeLevel, ResvgSnapshotter};
use logomotion::{ExportError, ExportVariant, Studio, StudioConfig};
use std::sync::Arc;

const ONE_SECOND: &str = r##"
let tl = anime::timeline(#{ duration: 1000, easing: "linear" });
tl.add(#{ targets: "rect, circle", translateX: [0, 20] });
tl
"##;

const TWO_SECONDS: &str = r##"
let tl = anime::timeline(#{ duration: 2000 });
tl.add(#{ targets: "*", opacity: [0, 1] });
"##;

fn studio(inbox: Arc<Inbox>) -> Studio {
    Studio::with_parts(
        StudioConfig {
            settle_delay_ms: 0,
            ..Default::default()
        },
        Arc::new(ResvgSnapshotter::without_fonts()),
        EncoderRegistry::new(vec![Arc::new(GifEncoderFactory)]),
    )
    .with_notifier(inbox)
}

async fn background(secs: f64) -> ThreadedTrack {
    let frame = VideoFrame::solid(80, 40, [10, 200, 10, 255]);
    ThreadedTrack::start("backdrop", FrameSequence::still(frame, secs))
        .await
        .unwrap()
}

#[tokio::test]
async fn animation_only_export_steps_through_thirty_one_frames() {
    let mut studio = studio(Arc::new(Inbox::default()));
    studio.upload(FOUR_LAYER_LOGO).unwrap();
    let timeline = studio.apply_source(ONE_SECOND).await.unwrap();
    assert_eq!(timeline.duration_ms(), 1000.0);

    let recorder = Recorder::default();
    let artifact = studio
        .export(ExportVariant::AnimationOnly, &recorder)
        .await
        .unwrap();

    let frames = recorder.frames.lock().unwrap().clone();
    assert_eq!(frames.len(), 31);
    assert_eq!(frames.first(), Some(&(0, 0.0)));
    assert_eq!(frames.last(), Some(&(30, 1000.0)));
    assert_eq!(artifact.frame_count, 31);
    assert!(!artifact.bytes.is_empty());

    assert_eq!(studio.export_state(), ExportState::Idle);
    assert_eq!(timeline.current_time_ms(), 0.0);
    assert!(!timeline.is_playing());

    let dir = tempfile::tempdir().unwrap();
    let path = artifact.save_to(dir.path()).unwrap();
    assert!(path.ends_with("animation-only.gif"));
    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (80, 40));
}

#[tokio::test]
async fn composited_export_stops_at_the_shorter_video() {
    let inbox = Arc::new(Inbox::default());
    let mut studio = studio(inbox.clone());
    studio.upload(FOUR_LAYER_LOGO).unwrap();
    studio.apply_source(TWO_SECONDS).await.unwrap();
    studio.import_media(Box::new(background(1.5).await));

    let recorder = Recorder::default();
    let artifact = studio
        .export(ExportVariant::Composited, &recorder)
        .await
        .unwrap();

    assert_eq!(artifact.effective_duration_ms, 1500.0);
    assert_eq!(artifact.file_name, "composited-animation.gif");
    assert_eq!(recorder.frames.lock().unwrap().last().unwrap().1, 1500.0);

    let notices = recorder.notices.lock().unwrap().clone();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].truncated, TruncatedStream::Animation);
    assert_eq!(notices[0].effective_ms, 1500.0);
    let info = inbox
        .0
        .lock()
        .unwrap()
        .iter()
        .any(|n| n.level == NoticeLevel::Info && n.message.contains("1500ms"));
    assert!(info);
    assert_eq!(studio.media().unwrap().current_time_secs(), 0.0);
}

#[tokio::test]
async fn composited_export_needs_a_background() {
    let mut studio = studio(Arc::new(Inbox::default()));
    studio.upload(FOUR_LAYER_LOGO).unwrap();
    studio.apply_source(ONE_SECOND).await.unwrap();

    let err = studio
        .export(ExportVariant::Composited, &NullObserver)
        .await
        .unwrap_err();
    assert_eq!(err, ExportError::Precondition(ExportPrecondition::MissingMedia));
    assert!(studio.last_error().is_some());

    studio.import_media(Box::new(background(2.0).await));
    studio.remove_media();
    assert!(studio.media().is_none());
}

#[tokio::test]
async fn background_files_import_as_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backdrop.png");
    image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]))
        .save(&path)
        .unwrap();

    let mut studio = studio(Arc::new(Inbox::default()));
    studio.import_media_file(&path).await.unwrap();
    let media = studio.media().unwrap();
    assert_eq!(media.label(), "backdrop.png");
    assert_eq!(media.duration_secs(), studio.config().still_media_secs());

    assert!(studio
        .import_media_file(&dir.path().join("missing.gif"))
        .await
        .is_err());
    assert!(studio.last_error().is_some());
}

#[test]
fn last_frame_lands_exactly_on_the_effective_duration() {
    for fps in [24, 25, 30, 60] {
        for d in [0.5, 1.0, 41.7, 999.9, 1000.0, 1500.0, 3333.3] {
            let ts = frame_timestamps(d, fps);
            assert_eq!(*ts.last().unwrap(), d, "fps {fps}, duration {d}");
            assert!(ts.iter().all(|&t| t <= d));
        }
    }
}
