mod common;

use common::{Recorder, FOUR_LAYER_LOGO};
use logomotion::engine::errors::ExecutionErrorKind;
use logomotion::engine::export::{
    EncoderRegistry, ExportEncoder, ExportInput, GifEncoderFactory, NullObserver,
};
use logomotion::engine::scene::{Extractor, SceneGraph, SceneMount, SvgExtractor};
use logomotion::engine::types::OverlayTransform;
use logomotion::engine::{AnimeRoot, OperationGate, ResvgSnapshotter, Sandbox};
use logomotion::{ExportError, ExportVariant, StudioConfig};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const FUNCTION_ONLY: &str = r##"
fn foo() {
    let tl = anime::timeline(#{ duration: 300 });
    tl.add(#{ targets: "#layer-1", opacity: [0, 1] });
    tl
}
"##;

const FUNCTION_CALLED: &str = r##"
fn foo() {
    let tl = anime::timeline(#{ duration: 300 });
    tl.add(#{ targets: "#layer-2", scale: [0.5, 1] });
    return tl;
}
foo();
"##;

const RAW: &str = r##"
let tl = anime::timeline(#{ duration: 300 });
tl.add(#{ targets: "#layer-3", translateX: [-10, 0] });
"##;

const SYNTAX_ERROR: &str = "fn foo( { anime::timeline(";
const NO_TIMELINE: &str = "let x = 40 + 2;";
const THROWS_AFTER_CAPTURE: &str = r#"let tl = anime::timeline(); throw "late failure";"#;

fn mounted() -> (SceneMount, AnimeRoot) {
    let extraction = SvgExtractor.extract(FOUR_LAYER_LOGO).unwrap();
    let mut mount = SceneMount::new();
    assert!(mount.reset(&extraction.annotated_document, &mut None));
    let root = AnimeRoot::new(mount.container().cloned().unwrap());
    (mount, root)
}

#[test]
fn resetting_twice_yields_the_same_ids() {
    let extraction = SvgExtractor.extract(FOUR_LAYER_LOGO).unwrap();
    let mut mount = SceneMount::new();
    let mut current = None;

    assert!(mount.reset(&extraction.annotated_document, &mut current));
    let first = mount.addressable_ids();
    assert!(mount.reset(&extraction.annotated_document, &mut current));
    assert_eq!(mount.addressable_ids(), first);
    assert_eq!(mount.generation(), 2);
}

#[test]
fn extracted_ids_survive_a_reparse_of_the_annotated_document() {
    let documents = [
        FOUR_LAYER_LOGO,
        r#"<svg xmlns="http://www.w3.org/2000/svg"><g id="layer-2"><path d="M0 0"/></g><circle r="1"/><text>Acme</text></svg>"#,
        r#"<svg xmlns="http://www.w3.org/2000/svg"><circle r="4"/></svg>"#,
    ];
    for document in documents {
        let extraction = SvgExtractor.extract(document).unwrap();
        let listed: BTreeSet<String> = extraction.elements.iter().map(|e| e.id.clone()).collect();
        assert_eq!(listed.len(), extraction.elements.len(), "ids must be unique");

        let reparsed = SceneGraph::parse(&extraction.annotated_document).unwrap();
        for id in &listed {
            assert!(reparsed.find_by_id(id).is_some(), "{id} missing from annotated document");
        }

        let again = SvgExtractor.extract(&extraction.annotated_document).unwrap();
        let relisted: BTreeSet<String> = again.elements.iter().map(|e| e.id.clone()).collect();
        assert_eq!(relisted, listed);
    }
}

#[test]
fn every_source_shape_returns_a_timeline_or_a_typed_error() {
    let sandbox = Sandbox::default();
    for source in [FUNCTION_ONLY, FUNCTION_CALLED, RAW] {
        let (_mount, root) = mounted();
        let mut current = None;
        let timeline = sandbox.execute(source, &root, &mut current).unwrap();
        assert_eq!(timeline.duration_ms(), 300.0);
        assert!(timeline.is_playing());
    }

    for (source, kind) in [
        (SYNTAX_ERROR, ExecutionErrorKind::Thrown),
        (NO_TIMELINE, ExecutionErrorKind::NoTimelineProduced),
        (THROWS_AFTER_CAPTURE, ExecutionErrorKind::Thrown),
    ] {
        let (_mount, root) = mounted();
        let err = sandbox.execute(source, &root, &mut None).unwrap_err();
        assert_eq!(err.kind, kind, "{source}");
    }
}

#[test]
fn construction_entry_point_is_restored_after_every_run() {
    let sandbox = Sandbox::default();
    let (_mount, root) = mounted();
    let original = root.timeline_factory();

    for source in [FUNCTION_ONLY, FUNCTION_CALLED, RAW, SYNTAX_ERROR, NO_TIMELINE, THROWS_AFTER_CAPTURE] {
        let _ = sandbox.execute(source, &root, &mut None);
        assert!(Arc::ptr_eq(&original, &root.timeline_factory()), "{source}");
    }
}

#[test]
fn returned_timeline_wins_over_a_captured_one() {
    let source = r##"
let tl = anime::timeline(#{ duration: 200 });
tl.add(#{ targets: "#layer-1", opacity: [0, 1] });
let decoy = anime::timeline(#{ duration: 900 });
decoy.add(#{ targets: "#layer-2", opacity: [0, 1] });
tl
"##;
    let (_mount, root) = mounted();
    let timeline = Sandbox::default().execute(source, &root, &mut None).unwrap();
    assert_eq!(timeline.duration_ms(), 200.0);
}

#[tokio::test]
async fn a_running_export_rejects_a_second_export() {
    let scene = Arc::new(Mutex::new(
        SceneGraph::parse(&SvgExtractor.extract(FOUR_LAYER_LOGO).unwrap().annotated_document).unwrap(),
    ));
    let root = AnimeRoot::new(scene.clone());
    let built = Sandbox::default()
        .execute(FUNCTION_ONLY, &root, &mut None)
        .unwrap();

    let gate = OperationGate::new();
    let make = || {
        ExportEncoder::new(
            &StudioConfig::default(),
            EncoderRegistry::new(vec![Arc::new(GifEncoderFactory)]),
            Arc::new(ResvgSnapshotter::without_fonts()),
            gate.clone(),
        )
    };
    let (mut first, mut second) = (make(), make());
    let input = || ExportInput {
        variant: ExportVariant::AnimationOnly,
        timeline: Some(&built),
        scene: Some(&scene),
        dimensions: (80, 40),
        overlay: OverlayTransform::default(),
        media: None,
    };

    let recorder = Recorder::default();
    let late = async {
        tokio::task::yield_now().await;
        second.run(input(), &NullObserver).await
    };
    let (finished, rejected) = tokio::join!(first.run(input(), &recorder), late);

    assert_eq!(rejected.unwrap_err(), ExportError::Busy);
    let artifact = finished.unwrap();
    assert_eq!(artifact.frame_count, 10);
    assert_eq!(recorder.frames.lock().unwrap().len(), 10);
    assert!(gate.active().is_none());
}
