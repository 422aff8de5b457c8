//! # Anime API
//!
//! The adapter root exposed to scripts, both as the `anime` value and the `anime::` module.
//!
//! ## Responsibilities
//! - **Construction**: `timeline`, routed through the root's replaceable entry point
//! - **One-shot animation**: `animate`, which bypasses that entry point
//! - **Helpers**: `stagger`, `random`

use crate::animation::Delay;
use crate::timeline::{AnimeRoot, Offset, TimelineHandle, TimelineParams};
use rhai::{Dynamic, Engine, EvalAltResult, Map, Module};

use super::super::types::Stagger;
use super::super::utils::{as_number, parse_step, parse_timeline_params};

fn timeline_with(root: &AnimeRoot, params: &Map) -> Result<TimelineHandle, Box<EvalAltResult>> {
    let params = parse_timeline_params(params)?;
    Ok(root.construct_timeline(params))
}

fn animate_with(root: &AnimeRoot, params: &Map) -> Result<TimelineHandle, Box<EvalAltResult>> {
    let timeline = root.construct_untracked(parse_timeline_params(params)?);
    timeline.add(parse_step(params)?, Offset::After).map_err(|e| e.to_string())?;
    timeline.play();
    Ok(timeline)
}

fn stagger(step: &Dynamic, start: Option<&Dynamic>) -> Result<Stagger, Box<EvalAltResult>> {
    let step = as_number(step).ok_or("stagger step must be a number")?;
    let start = match start {
        Some(s) => as_number(s).ok_or("stagger start must be a number")?,
        None => 0.0,
    };
    Ok(Stagger(Delay::Stagger { step, start }))
}

/// anime-style random: integers when both bounds are integers.
fn random(min: &Dynamic, max: &Dynamic) -> Result<Dynamic, Box<EvalAltResult>> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    if let (Ok(lo), Ok(hi)) = (min.as_int(), max.as_int()) {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        return Ok(Dynamic::from(rng.gen_range(lo..=hi)));
    }
    let lo = as_number(min).ok_or("random bounds must be numbers")?;
    let hi = as_number(max).ok_or("random bounds must be numbers")?;
    if lo >= hi {
        return Ok(Dynamic::from(lo));
    }
    Ok(Dynamic::from(rng.gen_range(lo..hi)))
}

/// Builds the `anime::` static module bound to one root.
pub fn create_anime_module(root: &AnimeRoot) -> Module {
    let mut module = Module::new();

    let r = root.clone();
    module.set_native_fn("timeline", move || Ok(r.construct_timeline(TimelineParams::default())));
    let r = root.clone();
    module.set_native_fn("timeline", move |params: Map| timeline_with(&r, &params));

    let r = root.clone();
    module.set_native_fn("animate", move |params: Map| animate_with(&r, &params));

    module.set_native_fn("stagger", |step: Dynamic| stagger(&step, None));
    module.set_native_fn("stagger", |step: Dynamic, options: Map| {
        stagger(&step, options.get("start"))
    });
    module.set_native_fn("random", |min: Dynamic, max: Dynamic| random(&min, &max));

    module
}

/// Register the `Anime` value type so `anime.timeline(...)` works as a method call.
pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<AnimeRoot>("Anime");
    engine.register_type_with_name::<Stagger>("Stagger");

    engine.register_fn("timeline", |root: AnimeRoot| {
        root.construct_timeline(TimelineParams::default())
    });
    engine.register_fn("timeline", |root: AnimeRoot, params: Map| {
        timeline_with(&root, &params)
    });
    engine.register_fn("animate", |root: AnimeRoot, params: Map| {
        animate_with(&root, &params)
    });
    engine.register_fn("stagger", |_root: AnimeRoot, step: Dynamic| stagger(&step, None));
    engine.register_fn("stagger", |_root: AnimeRoot, step: Dynamic, options: Map| {
        stagger(&step, options.get("start"))
    });
    engine.register_fn("random", |_root: AnimeRoot, min: Dynamic, max: Dynamic| {
        random(&min, &max)
    });
}
