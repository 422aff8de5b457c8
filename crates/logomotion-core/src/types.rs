//! # Types Module
//!
//! Shared data types used across the engine.
//!
//! ## Responsibilities
//! - **Color**: RGBA color representation with tween support and SVG paint parsing.
//! - **AnimatedValue**: The value written into a scene node by a Timeline seek.
//! - **OverlayTransform**: User placement of the scene over the export surface.
//!
//! ## Key Types
//! - `Color`: Float-based RGBA color.
//! - `NodeId`: Type alias for arena indices (`usize`).

use keyframe::CanTween;
use serde::{Deserialize, Serialize};

/// A unique identifier for a node in the scene graph.
pub type NodeId = usize;

/// Represents a RGBA color in float format (0.0 - 1.0).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parses an SVG/CSS paint value: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb()`, `rgba()`,
    /// `none`, `transparent` and a handful of common keywords.
    pub fn parse(value: &str) -> Option<Color> {
        let value = value.trim();
        if value.starts_with('#') {
            return parse_hex_color(value);
        }
        let lower = value.to_ascii_lowercase();
        if let Some(args) = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<f32> = args
                .split(',')
                .map(|p| p.trim().trim_end_matches('%').parse::<f32>())
                .collect::<Result<_, _>>()
                .ok()?;
            return match parts.as_slice() {
                [r, g, b] => Some(Color::new(r / 255.0, g / 255.0, b / 255.0, 1.0)),
                [r, g, b, a] => Some(Color::new(r / 255.0, g / 255.0, b / 255.0, a.clamp(0.0, 1.0))),
                _ => None,
            };
        }
        match lower.as_str() {
            "none" | "transparent" => Some(Color::TRANSPARENT),
            "black" => Some(Color::BLACK),
            "white" => Some(Color::WHITE),
            "red" => Some(Color::new(1.0, 0.0, 0.0, 1.0)),
            "green" => Some(Color::new(0.0, 128.0 / 255.0, 0.0, 1.0)),
            "lime" => Some(Color::new(0.0, 1.0, 0.0, 1.0)),
            "blue" => Some(Color::new(0.0, 0.0, 1.0, 1.0)),
            "yellow" => Some(Color::new(1.0, 1.0, 0.0, 1.0)),
            "orange" => Some(Color::new(1.0, 165.0 / 255.0, 0.0, 1.0)),
            "purple" => Some(Color::new(128.0 / 255.0, 0.0, 128.0 / 255.0, 1.0)),
            "gray" | "grey" => Some(Color::new(0.5, 0.5, 0.5, 1.0)),
            _ => None,
        }
    }

    /// Serializes to an SVG paint string.
    pub fn to_svg(&self) -> String {
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        if self.a >= 0.999 {
            format!("#{:02x}{:02x}{:02x}", to_u8(self.r), to_u8(self.g), to_u8(self.b))
        } else {
            format!(
                "rgba({},{},{},{:.3})",
                to_u8(self.r),
                to_u8(self.g),
                to_u8(self.b),
                self.a.clamp(0.0, 1.0)
            )
        }
    }

    /// Converts to a tiny-skia color.
    pub fn to_tiny_skia(&self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
        .unwrap_or(tiny_skia::Color::BLACK)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl CanTween for Color {
    fn ease(from: Self, to: Self, time: impl keyframe::num_traits::Float) -> Self {
        let t = time.to_f64().unwrap_or(0.0) as f32;
        Self {
            r: from.r + (to.r - from.r) * t,
            g: from.g + (to.g - from.g) * t,
            b: from.b + (to.b - from.b) * t,
            a: from.a + (to.a - from.a) * t,
        }
    }
}

/// Helper to parse hex strings like "#RRGGBB", "#RGB" or "#RRGGBBAA".
pub fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.trim_start_matches('#');
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    let (r, g, b, a) = match hex.len() {
        8 => (
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        ),
        6 => (byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 255),
        3 => (
            byte(&hex[0..1])? * 17,
            byte(&hex[1..2])? * 17,
            byte(&hex[2..3])? * 17,
            255,
        ),
        _ => return None,
    };

    Some(Color::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        a as f32 / 255.0,
    ))
}

/// A value a Timeline writes into a scene node.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AnimatedValue {
    Number(f64),
    Color(Color),
}

impl Default for AnimatedValue {
    fn default() -> Self {
        AnimatedValue::Number(0.0)
    }
}

impl AnimatedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnimatedValue::Number(n) => Some(*n),
            AnimatedValue::Color(_) => None,
        }
    }
}

impl CanTween for AnimatedValue {
    fn ease(from: Self, to: Self, time: impl keyframe::num_traits::Float) -> Self {
        let t = time.to_f64().unwrap_or(0.0);
        match (from, to) {
            (AnimatedValue::Number(a), AnimatedValue::Number(b)) => {
                AnimatedValue::Number(a + (b - a) * t)
            }
            (AnimatedValue::Color(a), AnimatedValue::Color(b)) => {
                AnimatedValue::Color(Color::ease(a, b, t))
            }
            // Mismatched kinds cannot blend; snap at the midpoint.
            (a, b) => {
                if t < 0.5 {
                    a
                } else {
                    b
                }
            }
        }
    }
}

/// User placement of the Scene Mount over the export surface.
///
/// Values are clamped on construction: `scale` to `[0.1, 3.0]`, offsets to `[-200, 200]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayTransform {
    scale: f32,
    offset_x: i32,
    offset_y: i32,
}

impl OverlayTransform {
    pub const MIN_SCALE: f32 = 0.1;
    pub const MAX_SCALE: f32 = 3.0;
    pub const MAX_OFFSET: i32 = 200;

    pub fn new(scale: f32, offset_x: i32, offset_y: i32) -> Self {
        let scale = if scale.is_finite() {
            scale.clamp(Self::MIN_SCALE, Self::MAX_SCALE)
        } else {
            1.0
        };
        Self {
            scale,
            offset_x: offset_x.clamp(-Self::MAX_OFFSET, Self::MAX_OFFSET),
            offset_y: offset_y.clamp(-Self::MAX_OFFSET, Self::MAX_OFFSET),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset_x(&self) -> i32 {
        self.offset_x
    }

    pub fn offset_y(&self) -> i32 {
        self.offset_y
    }

    /// Maps surface space onto itself: scale about the surface centre, then offset.
    pub fn to_tiny_skia(&self, width: f32, height: f32) -> tiny_skia::Transform {
        let cx = width / 2.0;
        let cy = height / 2.0;
        tiny_skia::Transform::from_translate(-cx, -cy)
            .post_scale(self.scale, self.scale)
            .post_translate(cx + self.offset_x as f32, cy + self.offset_y as f32)
    }
}

impl Default for OverlayTransform {
    fn default() -> Self {
        Self::new(1.0, 0, 0)
    }
}
