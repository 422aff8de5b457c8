//! # Timeline API
//!
//! Methods on `Timeline` values for Rhai scripts.
//!
//! ## Responsibilities
//! - **Building**: `add` with an optional offset (`"+=200"`, `"-=100"`, absolute ms)
//! - **Control**: `play`, `pause`, `restart`, `seek`
//! - **Inspection**: `duration`, `current_time`, `is_timeline`

use crate::timeline::{Offset, TimelineHandle};
use rhai::{Dynamic, Engine, EvalAltResult, Map};

use super::super::utils::{as_number, parse_offset, parse_step};

fn add(
    timeline: &mut TimelineHandle,
    params: &Map,
    offset: Offset,
) -> Result<TimelineHandle, Box<EvalAltResult>> {
    let step = parse_step(params)?;
    timeline.add(step, offset).map_err(|e| e.to_string())?;
    Ok(timeline.clone())
}

/// Register timeline-related Rhai functions.
pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<TimelineHandle>("Timeline");

    // ========== BUILD ==========
    engine.register_fn("add", |tl: &mut TimelineHandle, params: Map| {
        add(tl, &params, Offset::After)
    });
    engine.register_fn(
        "add",
        |tl: &mut TimelineHandle, params: Map, offset: Dynamic| {
            let offset = parse_offset(&offset)?;
            add(tl, &params, offset)
        },
    );

    // ========== CONTROL ==========
    engine.register_fn("play", |tl: &mut TimelineHandle| tl.play());
    engine.register_fn("pause", |tl: &mut TimelineHandle| tl.pause());
    engine.register_fn("restart", |tl: &mut TimelineHandle| tl.restart());
    engine.register_fn(
        "seek",
        |tl: &mut TimelineHandle, ms: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let ms = as_number(&ms).ok_or("seek expects a number of milliseconds")?;
            tl.seek(ms);
            Ok(())
        },
    );

    // ========== INSPECT ==========
    engine.register_get("duration", |tl: &mut TimelineHandle| tl.duration_ms());
    engine.register_get("current_time", |tl: &mut TimelineHandle| tl.current_time_ms());
    engine.register_get("paused", |tl: &mut TimelineHandle| !tl.is_playing());

    // Duck-typing check used by normalized sources.
    engine.register_fn("is_timeline", |value: Dynamic| value.is::<TimelineHandle>());
}
