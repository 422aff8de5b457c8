//! # Scripting Utilities
//!
//! Converts Rhai maps and values into typed timeline parameters.
//!
//! ## Responsibilities
//! - **Timeline Parsing**: `parse_timeline_params` for `anime::timeline(#{...})`
//! - **Step Parsing**: `parse_step` for `tl.add(#{...})`
//! - **Value Parsing**: numbers, unit strings, colours, relative values, `[from, to]` pairs
//! - **Offset Parsing**: `parse_offset` for the second `add` argument

use super::types::{Selection, Stagger};
use crate::animation::{Delay, Easing};
use crate::scene::Property;
use crate::timeline::{
    LoopMode, Offset, PropertyTween, StepParams, TargetSpec, TimelineParams, ValueSpec,
};
use crate::types::AnimatedValue;
use rhai::{Array, Dynamic, FnPtr, Map};
use tracing::debug;

/// Keys of a step map that configure timing rather than name a property.
const RESERVED_KEYS: &[&str] = &[
    "targets",
    "duration",
    "delay",
    "endDelay",
    "easing",
    "transformOrigin",
    "autoplay",
    "loop",
    "direction",
    "round",
    "begin",
    "update",
    "complete",
    "changeBegin",
    "changeComplete",
    "loopBegin",
    "loopComplete",
];

/// Reads an INT or FLOAT as `f64`.
pub fn as_number(value: &Dynamic) -> Option<f64> {
    if let Ok(f) = value.as_float() {
        return Some(f);
    }
    value.as_int().ok().map(|i| i as f64)
}

fn as_string(value: &Dynamic) -> Option<String> {
    if value.is_string() {
        value.clone().into_string().ok()
    } else {
        None
    }
}

pub fn parse_easing(value: &Dynamic) -> Result<Option<Easing>, String> {
    match as_string(value) {
        Some(name) => Easing::parse(&name)
            .map(Some)
            .ok_or_else(|| format!("Unknown easing '{}'", name)),
        None if value.is::<FnPtr>() => {
            debug!("Function easings are not supported, using the default");
            Ok(None)
        }
        None => Err(format!("Easing must be a string, got {}", value.type_name())),
    }
}

pub fn parse_delay(value: &Dynamic) -> Result<Option<Delay>, String> {
    if let Some(ms) = as_number(value) {
        return Ok(Some(Delay::Fixed(ms)));
    }
    if let Some(stagger) = value.clone().try_cast::<Stagger>() {
        return Ok(Some(stagger.0));
    }
    if value.is::<FnPtr>() {
        debug!("Function delays are not supported, using the default");
        return Ok(None);
    }
    Err(format!("Invalid delay of type {}", value.type_name()))
}

fn parse_duration(value: &Dynamic) -> Result<f64, String> {
    as_number(value).ok_or_else(|| format!("Duration must be a number, got {}", value.type_name()))
}

pub fn parse_offset(value: &Dynamic) -> Result<Offset, String> {
    if let Some(ms) = as_number(value) {
        return Ok(Offset::Absolute(ms));
    }
    match as_string(value) {
        Some(text) => Offset::parse(&text).ok_or_else(|| format!("Invalid timeline offset '{}'", text)),
        None => Err(format!("Invalid timeline offset of type {}", value.type_name())),
    }
}

fn parse_value(value: &Dynamic) -> Result<ValueSpec, String> {
    if let Some(n) = as_number(value) {
        return Ok(ValueSpec::Absolute(AnimatedValue::Number(n)));
    }
    match as_string(value) {
        Some(text) => ValueSpec::parse(&text).ok_or_else(|| format!("Cannot animate to '{}'", text)),
        None => Err(format!("Unsupported property value of type {}", value.type_name())),
    }
}

/// `[from, to]`, a single value, or a map carrying its own timing.
fn parse_property(key: &str, value: &Dynamic) -> Result<Option<PropertyTween>, String> {
    let mut tween = PropertyTween {
        property: Property::from_key(key),
        from: None,
        to: ValueSpec::Absolute(AnimatedValue::Number(0.0)),
        duration: None,
        delay: None,
        easing: None,
    };

    if value.is::<FnPtr>() {
        debug!(property = key, "Function-based values are not supported, skipping");
        return Ok(None);
    }

    if let Some(map) = value.clone().try_cast::<Map>() {
        let inner = map
            .get("value")
            .ok_or_else(|| format!("Property '{}' object is missing 'value'", key))?;
        let Some(mut parsed) = parse_property(key, inner)? else {
            return Ok(None);
        };
        if let Some(d) = map.get("duration") {
            parsed.duration = Some(parse_duration(d)?);
        }
        if let Some(d) = map.get("delay") {
            parsed.delay = parse_delay(d)?;
        }
        if let Some(e) = map.get("easing") {
            parsed.easing = parse_easing(e)?;
        }
        return Ok(Some(parsed));
    }

    if let Some(array) = value.clone().try_cast::<Array>() {
        match array.as_slice() {
            [] => return Err(format!("Property '{}' has an empty value list", key)),
            [only] => tween.to = parse_value(only)?,
            [first, .., last] => {
                tween.from = Some(parse_value(first)?);
                tween.to = parse_value(last)?;
            }
        }
        return Ok(Some(tween));
    }

    tween.to = parse_value(value)?;
    Ok(Some(tween))
}

fn parse_targets(value: &Dynamic) -> Result<Vec<TargetSpec>, String> {
    if let Some(selector) = as_string(value) {
        return Ok(vec![TargetSpec::Selector(selector)]);
    }
    if let Some(selection) = value.clone().try_cast::<Selection>() {
        return Ok(vec![TargetSpec::Nodes(selection.nodes)]);
    }
    if let Some(array) = value.clone().try_cast::<Array>() {
        let mut targets = Vec::with_capacity(array.len());
        for item in &array {
            targets.extend(parse_targets(item)?);
        }
        return Ok(targets);
    }
    Err(format!("Unsupported targets of type {}", value.type_name()))
}

/// `"50px 20px"` or `"10 20"`. Percentages need layout boxes and are ignored.
fn parse_origin(value: &Dynamic) -> Option<(f64, f64)> {
    let text = as_string(value)?;
    if text.contains('%') {
        debug!(origin = %text, "Percentage transform origins are not supported");
        return None;
    }
    let mut parts = text.split_whitespace().filter_map(crate::scene::leading_number);
    let x = parts.next()?;
    let y = parts.next().unwrap_or(x);
    Some((x, y))
}

pub fn parse_step(map: &Map) -> Result<StepParams, String> {
    let mut step = StepParams::default();
    if let Some(t) = map.get("targets") {
        step.targets = parse_targets(t)?;
    }
    if let Some(d) = map.get("duration") {
        step.duration = Some(parse_duration(d)?);
    }
    if let Some(d) = map.get("delay") {
        step.delay = parse_delay(d)?;
    }
    if let Some(d) = map.get("endDelay") {
        step.end_delay = Some(parse_duration(d)?);
    }
    if let Some(e) = map.get("easing") {
        step.easing = parse_easing(e)?;
    }
    if let Some(o) = map.get("transformOrigin") {
        step.transform_origin = parse_origin(o);
    }

    for (key, value) in map.iter() {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(tween) = parse_property(key, value)? {
            step.properties.push(tween);
        }
    }
    Ok(step)
}

pub fn parse_timeline_params(map: &Map) -> Result<TimelineParams, String> {
    let mut params = TimelineParams::default();
    if let Some(d) = map.get("duration") {
        params.duration = parse_duration(d)?;
    }
    if let Some(d) = map.get("delay") {
        if let Some(delay) = parse_delay(d)? {
            params.delay = delay;
        }
    }
    if let Some(d) = map.get("endDelay") {
        params.end_delay = parse_duration(d)?;
    }
    if let Some(e) = map.get("easing") {
        if let Some(easing) = parse_easing(e)? {
            params.easing = easing;
        }
    }
    if let Some(l) = map.get("loop") {
        params.loop_mode = if let Ok(flag) = l.as_bool() {
            if flag {
                LoopMode::Forever
            } else {
                LoopMode::Once
            }
        } else if let Some(n) = as_number(l) {
            LoopMode::Times(n.max(1.0) as u32)
        } else {
            return Err(format!("Invalid loop value of type {}", l.type_name()));
        };
    }
    if let Some(a) = map.get("autoplay") {
        params.autoplay = a.as_bool().unwrap_or(true);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::EasingCurve;

    fn map(pairs: Vec<(&str, Dynamic)>) -> Map {
        pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
    }

    #[test]
    fn step_separates_timing_from_properties() {
        let step = parse_step(&map(vec![
            ("targets", Dynamic::from("#layer-1".to_string())),
            ("duration", Dynamic::from(800_i64)),
            ("easing", Dynamic::from("easeOutCubic".to_string())),
            (
                "opacity",
                Dynamic::from(vec![Dynamic::from(0_i64), Dynamic::from(1_i64)]),
            ),
            ("translateX", Dynamic::from("+=40".to_string())),
        ]))
        .unwrap();
        assert_eq!(step.targets, vec![TargetSpec::Selector("#layer-1".into())]);
        assert_eq!(step.duration, Some(800.0));
        assert_eq!(step.easing, Some(Easing::Out(EasingCurve::Cubic)));
        assert_eq!(step.properties.len(), 2);
        let opacity = step
            .properties
            .iter()
            .find(|p| p.property == Property::Opacity)
            .unwrap();
        assert_eq!(
            opacity.from,
            Some(ValueSpec::Absolute(AnimatedValue::Number(0.0)))
        );
    }

    #[test]
    fn property_objects_carry_timing() {
        let inner = map(vec![
            ("value", Dynamic::from(1.5_f64)),
            ("duration", Dynamic::from(200_i64)),
            ("easing", Dynamic::from("linear".to_string())),
        ]);
        let step = parse_step(&map(vec![("scale", Dynamic::from(inner))])).unwrap();
        assert_eq!(step.properties[0].duration, Some(200.0));
        assert_eq!(step.properties[0].easing, Some(Easing::Linear));
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(parse_step(&map(vec![("easing", Dynamic::from("wobble".to_string()))])).is_err());
        assert!(parse_step(&map(vec![("opacity", Dynamic::from("lots".to_string()))])).is_err());
        assert!(parse_offset(&Dynamic::from("soon".to_string())).is_err());
    }

    #[test]
    fn timeline_loop_forms() {
        let forever = parse_timeline_params(&map(vec![("loop", Dynamic::from(true))])).unwrap();
        assert_eq!(forever.loop_mode, LoopMode::Forever);
        let twice = parse_timeline_params(&map(vec![("loop", Dynamic::from(2_i64))])).unwrap();
        assert_eq!(twice.loop_mode, LoopMode::Times(2));
    }
}
