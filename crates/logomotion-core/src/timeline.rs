//! # Timeline Module
//!
//! Seekable animation clock that drives style overrides on the mounted scene.
//!
//! ## Responsibilities
//! - **Timeline**: Steps of per-node property tweens laid out on a millisecond axis.
//! - **TimelineHandle**: Shared handle scripts, the sandbox and the exporter all hold.
//! - **AnimeRoot**: The adapter root object. Its construction entry point is a replaceable
//!   binding so the sandbox can intercept every Timeline a script builds.
//! - **CaptureHook**: Scoped interception of that entry point, restored on drop.

use crate::animation::{Delay, Easing};
use crate::scene::{lock_scene, Property, SceneHandle, SelectorError};
use crate::types::{AnimatedValue, Color, NodeId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Default step duration, as anime-style engines use.
pub const DEFAULT_DURATION_MS: f64 = 1000.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Once,
    /// Total number of iterations.
    Times(u32),
    Forever,
}

/// Where a step is placed on the timeline.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum Offset {
    /// Right after the current end of the timeline.
    #[default]
    After,
    Absolute(f64),
    /// `"+=N"` / `"-=N"`, relative to the current end.
    Relative(f64),
}

impl Offset {
    pub fn parse(text: &str) -> Option<Offset> {
        let text = text.trim();
        if let Some(n) = text.strip_prefix("+=") {
            return n.trim().parse().ok().map(Offset::Relative);
        }
        if let Some(n) = text.strip_prefix("-=") {
            return n.trim().parse::<f64>().ok().map(|n| Offset::Relative(-n));
        }
        crate::scene::leading_number(text).map(Offset::Absolute)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RelativeOp {
    Add,
    Subtract,
    Multiply,
}

/// A property end point as written in a script.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ValueSpec {
    Absolute(AnimatedValue),
    Relative(RelativeOp, f64),
}

impl ValueSpec {
    /// Parses `"+=20"`, `"*=2"`, `"#ff0000"`, `"45deg"`, `"12px"`.
    pub fn parse(text: &str) -> Option<ValueSpec> {
        let text = text.trim();
        for (prefix, op) in [
            ("+=", RelativeOp::Add),
            ("-=", RelativeOp::Subtract),
            ("*=", RelativeOp::Multiply),
        ] {
            if let Some(rest) = text.strip_prefix(prefix) {
                return crate::scene::leading_number(rest).map(|n| ValueSpec::Relative(op, n));
            }
        }
        if let Some(n) = crate::scene::leading_number(text) {
            return Some(ValueSpec::Absolute(AnimatedValue::Number(n)));
        }
        Color::parse(text).map(|c| ValueSpec::Absolute(AnimatedValue::Color(c)))
    }

    fn resolve(&self, base: AnimatedValue) -> AnimatedValue {
        match (self, base) {
            (ValueSpec::Absolute(v), _) => *v,
            (ValueSpec::Relative(op, n), AnimatedValue::Number(b)) => AnimatedValue::Number(match op {
                RelativeOp::Add => b + n,
                RelativeOp::Subtract => b - n,
                RelativeOp::Multiply => b * n,
            }),
            (ValueSpec::Relative(..), color) => color,
        }
    }
}

/// What a step animates.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetSpec {
    Selector(String),
    Nodes(Vec<NodeId>),
}

/// One animated property inside a step, with optional per-property timing.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyTween {
    pub property: Property,
    pub from: Option<ValueSpec>,
    pub to: ValueSpec,
    pub duration: Option<f64>,
    pub delay: Option<Delay>,
    pub easing: Option<Easing>,
}

/// Parameters of a single `add` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepParams {
    pub targets: Vec<TargetSpec>,
    pub properties: Vec<PropertyTween>,
    pub duration: Option<f64>,
    pub delay: Option<Delay>,
    pub end_delay: Option<f64>,
    pub easing: Option<Easing>,
    pub transform_origin: Option<(f64, f64)>,
}

/// Timeline-wide defaults given at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineParams {
    pub duration: f64,
    pub delay: Delay,
    pub end_delay: f64,
    pub easing: Easing,
    pub loop_mode: LoopMode,
    pub autoplay: bool,
}

impl Default for TimelineParams {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION_MS,
            delay: Delay::default(),
            end_delay: 0.0,
            easing: Easing::default(),
            loop_mode: LoopMode::Once,
            autoplay: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Tween {
    start: f64,
    end: f64,
    from: AnimatedValue,
    to: AnimatedValue,
    easing: Easing,
}

/// A seekable clock over a set of property tweens.
#[derive(Debug)]
pub struct Timeline {
    scene: SceneHandle,
    params: TimelineParams,
    tracks: BTreeMap<(NodeId, Property), Vec<Tween>>,
    origins: BTreeMap<NodeId, (f64, f64)>,
    duration_ms: f64,
    current_ms: f64,
    state: PlaybackState,
    iterations: u32,
}

impl Timeline {
    pub fn new(scene: SceneHandle, params: TimelineParams) -> Self {
        Self {
            scene,
            params,
            tracks: BTreeMap::new(),
            origins: BTreeMap::new(),
            duration_ms: 0.0,
            current_ms: 0.0,
            state: PlaybackState::Idle,
            iterations: 0,
        }
    }

    /// Appends a step. Selectors matching nothing are not an error; the step still occupies time.
    pub fn add(&mut self, step: StepParams, offset: Offset) -> Result<(), SelectorError> {
        let base = match offset {
            Offset::After => self.duration_ms,
            Offset::Absolute(ms) => ms,
            Offset::Relative(delta) => self.duration_ms + delta,
        }
        .max(0.0);

        let step_duration = step.duration.unwrap_or(self.params.duration).max(0.0);
        let step_delay = step.delay.unwrap_or(self.params.delay);
        let end_delay = step.end_delay.unwrap_or(self.params.end_delay);
        let step_easing = step.easing.unwrap_or(self.params.easing);

        let scene = self.scene.clone();
        let graph = lock_scene(&scene);
        let mut targets: Vec<NodeId> = Vec::new();
        for target in &step.targets {
            let found = match target {
                TargetSpec::Selector(sel) => graph.query(sel)?,
                TargetSpec::Nodes(nodes) => nodes.clone(),
            };
            for node in found {
                if !targets.contains(&node) {
                    targets.push(node);
                }
            }
        }
        if targets.is_empty() && !step.targets.is_empty() {
            debug!(targets = ?step.targets, "Timeline step matched no elements");
        }

        let mut step_end = base + step_delay.max_over(targets.len()) + step_duration + end_delay;
        for (index, &node) in targets.iter().enumerate() {
            if let Some(origin) = step.transform_origin {
                self.origins.insert(node, origin);
            }
            for prop in &step.properties {
                let duration = prop.duration.unwrap_or(step_duration).max(0.0);
                let delay = prop.delay.unwrap_or(step_delay).resolve(index);
                let start = base + delay;
                let end = start + duration;
                step_end = step_end.max(end + end_delay);

                let key = (node, prop.property.clone());
                let previous = self.tracks.get(&key).and_then(|track| {
                    track
                        .iter()
                        .filter(|t| t.end <= start)
                        .max_by(|a, b| a.end.total_cmp(&b.end))
                        .or_else(|| track.last())
                        .map(|t| t.to)
                });
                let current = previous.unwrap_or_else(|| graph.base_value(node, &prop.property));
                let from = prop.from.map(|f| f.resolve(current)).unwrap_or(current);
                let to = prop.to.resolve(from);

                let track = self.tracks.entry(key).or_default();
                track.push(Tween {
                    start,
                    end,
                    from,
                    to,
                    easing: prop.easing.unwrap_or(step_easing),
                });
                track.sort_by(|a, b| a.start.total_cmp(&b.start));
            }
        }
        drop(graph);

        self.duration_ms = self.duration_ms.max(step_end);
        Ok(())
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn current_time_ms(&self) -> f64 {
        self.current_ms
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn params(&self) -> &TimelineParams {
        &self.params
    }

    /// Number of (node, property) tracks this timeline drives.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Moves the playhead to `ms` (clamped to `[0, duration]`) and writes every track's value.
    pub fn seek(&mut self, ms: f64) {
        let t = if ms.is_finite() {
            ms.clamp(0.0, self.duration_ms)
        } else {
            warn!(ms, "Ignoring non-finite seek target");
            self.current_ms
        };
        self.current_ms = t;
        self.render();
    }

    fn render(&self) {
        let t = self.current_ms;
        let mut graph = lock_scene(&self.scene);
        for (&node, &origin) in &self.origins {
            graph.set_transform_origin(node, origin);
        }
        for ((node, property), track) in &self.tracks {
            if let Some(value) = value_at(track, t) {
                graph.set_style(*node, property.clone(), value);
            }
        }
    }

    pub fn play(&mut self) {
        if self.duration_ms > 0.0 && self.current_ms >= self.duration_ms {
            self.iterations = 0;
            self.seek(0.0);
        }
        self.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn restart(&mut self) {
        self.iterations = 0;
        self.seek(0.0);
        self.state = PlaybackState::Playing;
    }

    /// Progresses a playing timeline by wall-clock `delta_ms`, honouring the loop mode.
    pub fn advance(&mut self, delta_ms: f64) {
        if self.state != PlaybackState::Playing || !delta_ms.is_finite() || delta_ms <= 0.0 {
            return;
        }
        let mut t = self.current_ms + delta_ms;
        if t >= self.duration_ms {
            if self.duration_ms <= 0.0 {
                t = 0.0;
                self.state = PlaybackState::Paused;
            } else {
                let completed = (t / self.duration_ms).floor() as u32;
                self.iterations = self.iterations.saturating_add(completed);
                let finished = match self.params.loop_mode {
                    LoopMode::Once => true,
                    LoopMode::Times(n) => self.iterations >= n.max(1),
                    LoopMode::Forever => false,
                };
                if finished {
                    t = self.duration_ms;
                    self.state = PlaybackState::Paused;
                } else {
                    t %= self.duration_ms;
                }
            }
        }
        self.seek(t);
    }
}

fn value_at(track: &[Tween], t: f64) -> Option<AnimatedValue> {
    let first = track.first()?;
    let Some(active) = track.iter().rev().find(|tw| tw.start <= t) else {
        return Some(first.from);
    };
    if t >= active.end || active.end <= active.start {
        return Some(active.to);
    }
    let progress = (t - active.start) / (active.end - active.start);
    Some(active.easing.interpolate(active.from, active.to, progress))
}

/// Shared handle to a Timeline.
#[derive(Clone, Debug)]
pub struct TimelineHandle {
    inner: Arc<Mutex<Timeline>>,
}

impl TimelineHandle {
    pub fn new(scene: SceneHandle, params: TimelineParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Timeline::new(scene, params))),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Timeline> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, step: StepParams, offset: Offset) -> Result<(), SelectorError> {
        self.lock().add(step, offset)
    }

    pub fn seek(&self, ms: f64) {
        self.lock().seek(ms)
    }

    pub fn play(&self) {
        self.lock().play()
    }

    pub fn pause(&self) {
        self.lock().pause()
    }

    pub fn restart(&self) {
        self.lock().restart()
    }

    pub fn advance(&self, delta_ms: f64) {
        self.lock().advance(delta_ms)
    }

    pub fn duration_ms(&self) -> f64 {
        self.lock().duration_ms()
    }

    pub fn current_time_ms(&self) -> f64 {
        self.lock().current_time_ms()
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn ptr_eq(&self, other: &TimelineHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// The replaceable Timeline construction entry point.
pub type TimelineFactory = Arc<dyn Fn(&SceneHandle, TimelineParams) -> TimelineHandle + Send + Sync>;

fn default_factory() -> TimelineFactory {
    Arc::new(|scene: &SceneHandle, params: TimelineParams| TimelineHandle::new(scene.clone(), params))
}

/// Root object of the Timeline Runtime Adapter, handed to every script run.
#[derive(Clone)]
pub struct AnimeRoot {
    scene: SceneHandle,
    factory: Arc<Mutex<TimelineFactory>>,
}

impl AnimeRoot {
    pub fn new(scene: SceneHandle) -> Self {
        Self {
            scene,
            factory: Arc::new(Mutex::new(default_factory())),
        }
    }

    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    /// Builds a Timeline through whatever entry point is currently bound.
    pub fn construct_timeline(&self, params: TimelineParams) -> TimelineHandle {
        let factory = self.timeline_factory();
        factory(&self.scene, params)
    }

    /// Builds a Timeline directly, bypassing the bound entry point.
    pub fn construct_untracked(&self, params: TimelineParams) -> TimelineHandle {
        TimelineHandle::new(self.scene.clone(), params)
    }

    pub fn timeline_factory(&self) -> TimelineFactory {
        self.factory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swaps the entry point, returning the previous one.
    pub fn replace_timeline_factory(&self, factory: TimelineFactory) -> TimelineFactory {
        let mut slot = self
            .factory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, factory)
    }
}

impl std::fmt::Debug for AnimeRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimeRoot").finish_non_exhaustive()
    }
}

/// Intercepts Timeline construction on an `AnimeRoot` until dropped.
///
/// The most recently constructed Timeline is kept as the capture.
pub struct CaptureHook {
    root: AnimeRoot,
    original: Option<TimelineFactory>,
    captured: Arc<Mutex<Option<TimelineHandle>>>,
}

impl CaptureHook {
    pub fn install(root: &AnimeRoot) -> Self {
        let captured: Arc<Mutex<Option<TimelineHandle>>> = Arc::new(Mutex::new(None));
        let original = root.timeline_factory();
        let inner = original.clone();
        let slot = captured.clone();
        let wrapper: TimelineFactory = Arc::new(move |scene: &SceneHandle, params: TimelineParams| {
            let timeline = inner(scene, params);
            *slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(timeline.clone());
            timeline
        });
        root.replace_timeline_factory(wrapper);
        Self {
            root: root.clone(),
            original: Some(original),
            captured,
        }
    }

    pub fn captured(&self) -> Option<TimelineHandle> {
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Drop for CaptureHook {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            self.root.replace_timeline_factory(original);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;

    fn scene() -> SceneHandle {
        let graph = SceneGraph::parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
                <rect id="a" class="box" opacity="0.5" width="1" height="1"/>
                <rect id="b" class="box" width="1" height="1"/>
            </svg>"#,
        )
        .unwrap();
        Arc::new(Mutex::new(graph))
    }

    fn fade(targets: &str, duration: f64) -> StepParams {
        StepParams {
            targets: vec![TargetSpec::Selector(targets.into())],
            properties: vec![PropertyTween {
                property: Property::Opacity,
                from: Some(ValueSpec::Absolute(AnimatedValue::Number(0.0))),
                to: ValueSpec::Absolute(AnimatedValue::Number(1.0)),
                duration: None,
                delay: None,
                easing: None,
            }],
            duration: Some(duration),
            easing: Some(Easing::Linear),
            ..Default::default()
        }
    }

    fn opacity(scene: &SceneHandle, id: &str) -> Option<f64> {
        let graph = lock_scene(scene);
        let node = graph.find_by_id(id)?;
        graph
            .get_node(node)?
            .style
            .values
            .get(&Property::Opacity)
            .and_then(AnimatedValue::as_number)
    }

    #[test]
    fn steps_chain_and_seek_interpolates() {
        let scene = scene();
        let tl = TimelineHandle::new(scene.clone(), TimelineParams::default());
        tl.add(fade("#a", 1000.0), Offset::After).unwrap();
        tl.add(fade("#b", 500.0), Offset::After).unwrap();
        assert_eq!(tl.duration_ms(), 1500.0);

        tl.seek(500.0);
        assert_eq!(opacity(&scene, "a"), Some(0.5));
        // Not yet started: shows its start value.
        assert_eq!(opacity(&scene, "b"), Some(0.0));

        tl.seek(5000.0);
        assert_eq!(tl.current_time_ms(), 1500.0);
        assert_eq!(opacity(&scene, "b"), Some(1.0));
    }

    #[test]
    fn relative_offsets_and_stagger() {
        let scene = scene();
        let tl = TimelineHandle::new(scene.clone(), TimelineParams::default());
        let mut step = fade(".box", 400.0);
        step.delay = Some(Delay::Stagger {
            step: 100.0,
            start: 0.0,
        });
        tl.add(step, Offset::After).unwrap();
        assert_eq!(tl.duration_ms(), 500.0);
        tl.add(fade("#a", 200.0), Offset::Relative(-300.0)).unwrap();
        assert_eq!(tl.duration_ms(), 500.0);
    }

    #[test]
    fn from_defaults_to_attribute_value() {
        let scene = scene();
        let tl = TimelineHandle::new(scene.clone(), TimelineParams::default());
        let mut step = fade("#a", 100.0);
        step.properties[0].from = None;
        tl.add(step, Offset::After).unwrap();
        tl.seek(0.0);
        assert_eq!(opacity(&scene, "a"), Some(0.5));
    }

    #[test]
    fn empty_targets_still_take_time() {
        let scene = scene();
        let tl = TimelineHandle::new(scene, TimelineParams::default());
        tl.add(fade("#nothing", 750.0), Offset::After).unwrap();
        assert_eq!(tl.duration_ms(), 750.0);
        assert_eq!(tl.lock().track_count(), 0);
    }

    #[test]
    fn advance_respects_loop_mode() {
        let scene = scene();
        let once = TimelineHandle::new(scene.clone(), TimelineParams::default());
        once.add(fade("#a", 100.0), Offset::After).unwrap();
        once.restart();
        once.advance(250.0);
        assert_eq!(once.current_time_ms(), 100.0);
        assert_eq!(once.state(), PlaybackState::Paused);

        let looping = TimelineHandle::new(
            scene,
            TimelineParams {
                loop_mode: LoopMode::Forever,
                ..Default::default()
            },
        );
        looping.add(fade("#a", 100.0), Offset::After).unwrap();
        looping.restart();
        looping.advance(250.0);
        assert!((looping.current_time_ms() - 50.0).abs() < 1e-9);
        assert!(looping.is_playing());
    }

    #[test]
    fn capture_hook_records_and_restores() {
        let root = AnimeRoot::new(scene());
        let before = root.timeline_factory();
        {
            let hook = CaptureHook::install(&root);
            assert!(!Arc::ptr_eq(&before, &root.timeline_factory()));
            let built = root.construct_timeline(TimelineParams::default());
            assert!(hook.captured().unwrap().ptr_eq(&built));
            root.construct_untracked(TimelineParams::default());
            assert!(hook.captured().unwrap().ptr_eq(&built));
        }
        assert!(Arc::ptr_eq(&before, &root.timeline_factory()));
    }

    #[test]
    fn value_specs_parse() {
        assert_eq!(
            ValueSpec::parse("+=20"),
            Some(ValueSpec::Relative(RelativeOp::Add, 20.0))
        );
        assert_eq!(
            ValueSpec::parse("45deg"),
            Some(ValueSpec::Absolute(AnimatedValue::Number(45.0)))
        );
        assert_eq!(
            ValueSpec::parse("#fff"),
            Some(ValueSpec::Absolute(AnimatedValue::Color(Color::WHITE)))
        );
        assert_eq!(Offset::parse("-=200"), Some(Offset::Relative(-200.0)));
        assert_eq!(Offset::parse("300"), Some(Offset::Absolute(300.0)));
    }
}
