//! # Sandbox Module
//!
//! Runs an animation source against the mounted scene and recovers the Timeline it builds.
//!
//! ## Pipeline
//! 1. `strip_wrappers`: unwrap on-load and self-invoking boilerplate.
//! 2. `classify` / `normalize`: rewrite the source so its final value is the Timeline.
//! 3. Install a `CaptureHook` on the adapter root, evaluate in a fresh engine, restore.
//! 4. Prefer the returned Timeline, fall back to the captured one.

use crate::errors::ExecutionError;
use crate::scene::{lock_scene, SceneMount};
use crate::scripting::{create_engine, ScriptLimits};
use crate::timeline::{AnimeRoot, CaptureHook, TimelineHandle};
use regex::Regex;
use rhai::{Dynamic, Scope};
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

/// Name of the variable normalized sources collect their result in.
const RESULT_VAR: &str = "logomotion_result";

/// The three source shapes the sandbox knows how to drive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceShape {
    /// Declares `name` and calls it somewhere.
    FunctionCalled { name: String },
    /// Declares `name` and never calls it.
    FunctionOnly { name: String },
    /// Top-level statements only.
    RawStatements,
}

struct WrapperPatterns {
    wrappers: Vec<Regex>,
    function: Option<Regex>,
}

const ON_LOAD_PATTERNS: &[&str] = &[
    r#"(?s)^\s*document\.addEventListener\(\s*['"]DOMContentLoaded['"]\s*,\s*(?:function\s*\(\s*\)|\(\s*\)\s*=>)\s*\{(.*)\}\s*\)\s*;?\s*$"#,
    r"(?s)^\s*on_load\(\s*\|\|\s*\{(.*)\}\s*\)\s*;?\s*$",
];

const SELF_INVOKING_PATTERNS: &[&str] = &[
    r"(?s)^\s*\(\s*(?:function\s*\(\s*\)|\(\s*\)\s*=>)\s*\{(.*)\}\s*\)\s*\(\s*\)\s*;?\s*$",
    r"(?s)^\s*\(?\s*\|\|\s*\{(.*)\}\s*\)?\s*\.call\(\s*\)\s*;?\s*$",
];

fn patterns() -> &'static WrapperPatterns {
    static PATTERNS: OnceLock<WrapperPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| WrapperPatterns {
        wrappers: ON_LOAD_PATTERNS
            .iter()
            .chain(SELF_INVOKING_PATTERNS)
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
        function: Regex::new(r"(?m)^\s*(?:private\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").ok(),
    })
}

/// Removes "run on load" and self-invoking wrappers, repeatedly, by pattern matching.
///
/// Text without a recognised wrapper passes through unchanged.
pub fn strip_wrappers(source: &str) -> String {
    let patterns = patterns();
    let mut current = source.to_string();
    for _ in 0..4 {
        let unwrapped = patterns
            .wrappers
            .iter()
            .find_map(|re| re.captures(&current).and_then(|c| c.get(1)))
            .map(|m| m.as_str().to_string());
        match unwrapped {
            Some(body) => current = body,
            None => break,
        }
    }
    current
}

/// Classifies by the declared functions.
///
/// The entry point is the last declared function nothing calls. When every declared function
/// is called somewhere, the last one declared is treated as the entry point.
pub fn classify(source: &str) -> SourceShape {
    let Some(function) = patterns().function.as_ref() else {
        return SourceShape::RawStatements;
    };
    let mut declared: Vec<String> = Vec::new();
    for name in function
        .captures_iter(source)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    {
        if !declared.contains(&name) {
            declared.push(name);
        }
    }
    let Some(last) = declared.last().cloned() else {
        return SourceShape::RawStatements;
    };

    let count = |pattern: String| Regex::new(&pattern).map(|re| re.find_iter(source).count()).unwrap_or(0);
    let is_called = |name: &str| {
        let escaped = regex::escape(name);
        let mentions = count(format!(r"\b{}\s*\(", escaped));
        let declarations = count(format!(r"\bfn\s+{}\s*\(", escaped));
        mentions > declarations
    };

    match declared.iter().rev().find(|name| !is_called(name)) {
        Some(name) => SourceShape::FunctionOnly { name: name.clone() },
        None => SourceShape::FunctionCalled { name: last },
    }
}

/// Last character that is not whitespace or inside a trailing line comment.
fn needs_terminator(source: &str) -> bool {
    let last = source
        .lines()
        .rev()
        .map(|line| match line.find("//") {
            Some(i) => &line[..i],
            None => line,
        })
        .map(str::trim_end)
        .find(|line| !line.is_empty())
        .and_then(|line| line.chars().last());
    !matches!(last, None | Some(';') | Some('}'))
}

fn terminated(source: &str) -> String {
    if needs_terminator(source) {
        format!("{}\n;", source)
    } else {
        source.to_string()
    }
}

/// Rewrites `source` so that evaluating it yields the Timeline (or unit).
pub fn normalize(source: &str) -> (SourceShape, String) {
    let body = strip_wrappers(source);
    let shape = classify(&body);
    let normalized = match &shape {
        SourceShape::FunctionOnly { name } => {
            format!("{}\n{}()\n", terminated(&body), name)
        }
        SourceShape::FunctionCalled { name } => format!(
            "{body}\nlet {var} = ();\ntry {{ {var} = {name}(); }} catch {{ }}\n{var}\n",
            body = terminated(&body),
            var = RESULT_VAR,
            name = name,
        ),
        SourceShape::RawStatements => format!(
            "let {var} = {{\n{body}\n}};\n{var}\n",
            var = RESULT_VAR,
            body = body,
        ),
    };
    (shape, normalized)
}

/// Executes animation sources against one adapter root.
#[derive(Clone, Debug, Default)]
pub struct Sandbox {
    limits: ScriptLimits,
}

impl Sandbox {
    pub fn new(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    /// Runs `source` and, on success, makes the resulting Timeline current and playing.
    ///
    /// The adapter root's construction entry point is restored before returning, on every
    /// path. On failure `current` is left as it was.
    #[instrument(skip_all, fields(bytes = source.len()))]
    pub fn execute(
        &self,
        source: &str,
        root: &AnimeRoot,
        current: &mut Option<TimelineHandle>,
    ) -> Result<TimelineHandle, ExecutionError> {
        let addressable = lock_scene(root.scene()).addressable_ids();
        if addressable.is_empty() {
            warn!("Executing against a scene with no addressable elements; selectors will match nothing");
        } else {
            debug!(count = addressable.len(), ids = ?addressable, "Addressable elements");
        }

        let (shape, normalized) = normalize(source);
        debug!(?shape, "Classified animation source");

        let (outcome, captured) = {
            let hook = CaptureHook::install(root);
            let engine = create_engine(root, self.limits);
            let mut scope = Scope::new();
            let outcome = engine.eval_with_scope::<Dynamic>(&mut scope, &normalized);
            (outcome, hook.captured())
        };

        let returned = match outcome {
            Ok(value) => value.try_cast::<TimelineHandle>(),
            Err(e) => {
                warn!(error = %e, "Animation execution error");
                return Err(ExecutionError::thrown(e.to_string()));
            }
        };

        let timeline = match (returned, captured) {
            (Some(returned), captured) => {
                if let Some(captured) = captured.filter(|c| !c.ptr_eq(&returned)) {
                    debug!(captured_ms = captured.duration_ms(), "Preferring returned timeline over captured one");
                }
                returned
            }
            (None, Some(captured)) => {
                debug!("Using captured timeline");
                captured
            }
            (None, None) => return Err(ExecutionError::no_timeline()),
        };

        if let Some(previous) = current.take() {
            previous.pause();
        }
        timeline.restart();
        timeline.play();
        *current = Some(timeline.clone());
        info!(duration_ms = timeline.duration_ms(), "Animation started");
        Ok(timeline)
    }

    /// Remounts the last document, lets it settle, then executes.
    ///
    /// The reset always completes before any script runs. On failure the mount is reset once
    /// more so no partial mutation from the failed run survives.
    pub async fn execute_fresh(
        &self,
        source: &str,
        mount: &mut SceneMount,
        root: &AnimeRoot,
        current: &mut Option<TimelineHandle>,
        settle_attempts: u32,
    ) -> Result<TimelineHandle, ExecutionError> {
        mount.remount(current);
        mount.settle(settle_attempts).await;
        self.execute(source, root, current).inspect_err(|_| {
            mount.remount(current);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecutionErrorKind;
    use crate::scene::SceneGraph;
    use std::sync::{Arc, Mutex};

    const DOC: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
        <rect id="layer-1" width="10" height="10"/><circle id="layer-2" r="5"/>
    </svg>"#;

    fn root() -> AnimeRoot {
        AnimeRoot::new(Arc::new(Mutex::new(SceneGraph::parse(DOC).unwrap())))
    }

    const FUNCTION_ONLY: &str = r##"
fn create_animation() {
    let tl = anime::timeline(#{ easing: "easeOutQuad" });
    tl.add(#{ targets: "#layer-1", opacity: [0, 1], duration: 600 });
    tl
}
"##;

    const FUNCTION_CALLED: &str = r##"
fn build() {
    let tl = anime::timeline();
    tl.add(#{ targets: "#layer-2", scale: [0, 1], duration: 300 });
    return tl;
}
let animation = build();
"##;

    const HELPER_FIRST: &str = r##"
fn pick_easing(i) {
    if i % 2 == 0 { "easeOutQuad" } else { "easeInOutSine" }
}

fn create_animation() {
    let tl = anime::timeline();
    tl.add(#{ targets: "#layer-1", opacity: [0, 1], duration: 400, easing: pick_easing(1) });
    tl
}
"##;

    const RAW: &str = r##"
let tl = anime.timeline(#{ duration: 250 });
tl.add(#{ targets: "rect" , translateY: [10, 0] });
"##;

    #[test]
    fn classifies_the_three_shapes() {
        assert_eq!(
            classify(FUNCTION_ONLY),
            SourceShape::FunctionOnly {
                name: "create_animation".into()
            }
        );
        assert_eq!(
            classify(FUNCTION_CALLED),
            SourceShape::FunctionCalled {
                name: "build".into()
            }
        );
        assert_eq!(classify(RAW), SourceShape::RawStatements);
    }

    #[test]
    fn helpers_declared_first_do_not_hide_the_entry_point() {
        assert_eq!(
            classify(HELPER_FIRST),
            SourceShape::FunctionOnly {
                name: "create_animation".into()
            }
        );
        let tl = Sandbox::default()
            .execute(HELPER_FIRST, &root(), &mut None)
            .unwrap();
        assert_eq!(tl.duration_ms(), 400.0);

        let all_called = "fn a() { b() }\nfn b() { anime::timeline() }\nlet x = a();";
        assert_eq!(
            classify(all_called),
            SourceShape::FunctionCalled { name: "b".into() }
        );
    }

    #[test]
    fn strips_known_wrappers() {
        let js = "document.addEventListener('DOMContentLoaded', function() {\n  let x = 1;\n});";
        assert_eq!(strip_wrappers(js).trim(), "let x = 1;");
        let iife = "(() => { let y = 2; })();";
        assert_eq!(strip_wrappers(iife).trim(), "let y = 2;");
        let rhai = "on_load(|| { let z = 3; });";
        assert_eq!(strip_wrappers(rhai).trim(), "let z = 3;");
        assert_eq!(strip_wrappers("let w = 4;"), "let w = 4;");
    }

    #[test]
    fn every_shape_yields_a_playing_timeline() {
        for (source, duration) in [(FUNCTION_ONLY, 600.0), (FUNCTION_CALLED, 300.0), (RAW, 250.0)] {
            let root = root();
            let mut current = None;
            let tl = Sandbox::default().execute(source, &root, &mut current).unwrap();
            assert_eq!(tl.duration_ms(), duration);
            assert!(tl.is_playing());
            assert!(current.unwrap().ptr_eq(&tl));
        }
    }

    #[test]
    fn failures_are_typed_and_leave_current_alone() {
        let root = root();
        let previous = root.construct_untracked(Default::default());
        let mut current = Some(previous.clone());

        let err = Sandbox::default()
            .execute("let x = ;", &root, &mut current)
            .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Thrown);

        let err = Sandbox::default()
            .execute("let x = 40 + 2;", &root, &mut current)
            .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::NoTimelineProduced);

        let err = Sandbox::default()
            .execute(r#"throw "boom";"#, &root, &mut current)
            .unwrap_err();
        assert!(err.message.contains("boom"));
        assert!(current.unwrap().ptr_eq(&previous));
    }

    #[test]
    fn entry_point_is_restored_after_every_run() {
        let root = root();
        let before = root.timeline_factory();
        for source in [FUNCTION_ONLY, "throw \"x\";", "1 + 1", RAW] {
            let _ = Sandbox::default().execute(source, &root, &mut None);
            assert!(Arc::ptr_eq(&before, &root.timeline_factory()));
        }
    }

    #[test]
    fn returned_timeline_wins_over_captured() {
        let root = root();
        let source = r##"
let captured = anime::timeline(#{ duration: 900 });
captured.add(#{ targets: "#layer-1", opacity: 1 });
anime::animate(#{ targets: "#layer-2", opacity: 0, duration: 100 })
"##;
        let tl = Sandbox::default().execute(source, &root, &mut None).unwrap();
        assert_eq!(tl.duration_ms(), 100.0);
    }

    #[test]
    fn trailing_comments_do_not_swallow_terminators() {
        assert!(!needs_terminator("fn a() { }\n// done"));
        assert!(needs_terminator("let x = 1\n// note"));
    }
}
