use keyframe::{CanTween, EasingFunction};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::types::AnimatedValue;

/// Curve family of an easing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingCurve {
    Quad,
    Cubic,
    Quart,
    Quint,
    Sine,
    Expo,
    Circ,
    Back,
    Elastic,
    Bounce,
}

impl EasingCurve {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "Quad" => EasingCurve::Quad,
            "Cubic" => EasingCurve::Cubic,
            "Quart" => EasingCurve::Quart,
            "Quint" => EasingCurve::Quint,
            "Sine" => EasingCurve::Sine,
            "Expo" => EasingCurve::Expo,
            "Circ" => EasingCurve::Circ,
            "Back" => EasingCurve::Back,
            "Elastic" => EasingCurve::Elastic,
            "Bounce" => EasingCurve::Bounce,
            _ => return None,
        })
    }

    /// The "in" variant of the curve on `[0, 1]`.
    fn ease_in(&self, t: f64) -> f64 {
        match self {
            EasingCurve::Quad => t.powi(2),
            EasingCurve::Cubic => t.powi(3),
            EasingCurve::Quart => t.powi(4),
            EasingCurve::Quint => t.powi(5),
            EasingCurve::Sine => 1.0 - (t * PI / 2.0).cos(),
            EasingCurve::Expo => {
                if t == 0.0 {
                    0.0
                } else {
                    2f64.powf(10.0 * t - 10.0)
                }
            }
            EasingCurve::Circ => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
            EasingCurve::Back => t * t * (3.0 * t - 2.0),
            EasingCurve::Elastic => {
                if t == 0.0 || t == 1.0 {
                    return t;
                }
                // amplitude 1, period 0.5
                let period = 0.5;
                let s = period / (2.0 * PI) * 1f64.asin();
                -(2f64.powf(10.0 * (t - 1.0)) * ((t - 1.0 - s) * (2.0 * PI) / period).sin())
            }
            EasingCurve::Bounce => 1.0 - bounce_out(1.0 - t),
        }
    }
}

fn bounce_out(t: f64) -> f64 {
    const N: f64 = 7.5625;
    const D: f64 = 2.75;
    if t < 1.0 / D {
        N * t * t
    } else if t < 2.0 / D {
        let t = t - 1.5 / D;
        N * t * t + 0.75
    } else if t < 2.5 / D {
        let t = t - 2.25 / D;
        N * t * t + 0.9375
    } else {
        let t = t - 2.625 / D;
        N * t * t + 0.984375
    }
}

/// Supported easing functions for timeline steps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    In(EasingCurve),
    Out(EasingCurve),
    InOut(EasingCurve),
}

impl Default for Easing {
    /// `easeOutElastic(1, .5)`, the default of anime-style timelines.
    fn default() -> Self {
        Easing::Out(EasingCurve::Elastic)
    }
}

impl EasingFunction for Easing {
    fn y(&self, x: f64) -> f64 {
        let t = x.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::In(curve) => curve.ease_in(t),
            Easing::Out(curve) => 1.0 - curve.ease_in(1.0 - t),
            Easing::InOut(curve) => {
                if t < 0.5 {
                    curve.ease_in(t * 2.0) / 2.0
                } else {
                    1.0 - curve.ease_in(t * -2.0 + 2.0) / 2.0
                }
            }
        }
    }
}

impl Easing {
    /// Parses anime-style names: `linear`, `easeOutQuad`, `easeInOutElastic(1, .6)`.
    ///
    /// Curve parameters in parentheses are accepted and ignored. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Easing> {
        let name = name.trim();
        let name = name.split('(').next().unwrap_or(name).trim();
        if name.eq_ignore_ascii_case("linear") {
            return Some(Easing::Linear);
        }
        if let Some(rest) = name.strip_prefix("easeInOut") {
            return EasingCurve::parse(rest).map(Easing::InOut);
        }
        if let Some(rest) = name.strip_prefix("easeIn") {
            return EasingCurve::parse(rest).map(Easing::In);
        }
        if let Some(rest) = name.strip_prefix("easeOut") {
            return EasingCurve::parse(rest).map(Easing::Out);
        }
        match name {
            "easeIn" => Some(Easing::In(EasingCurve::Quad)),
            "easeOut" => Some(Easing::Out(EasingCurve::Quad)),
            "easeInOut" => Some(Easing::InOut(EasingCurve::Quad)),
            "spring" => Some(Easing::Out(EasingCurve::Elastic)),
            _ => None,
        }
    }

    /// Evaluates the easing curve at a specific point `x` (0.0 to 1.0).
    pub fn eval(&self, x: f64) -> f64 {
        self.y(x)
    }

    /// Interpolates between two animated values at linear progress `progress`.
    pub fn interpolate(&self, from: AnimatedValue, to: AnimatedValue, progress: f64) -> AnimatedValue {
        AnimatedValue::ease(from, to, self.y(progress))
    }
}

/// Per-target delay: a fixed value or an anime-style stagger.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Delay {
    Fixed(f64),
    Stagger { step: f64, start: f64 },
}

impl Default for Delay {
    fn default() -> Self {
        Delay::Fixed(0.0)
    }
}

impl Delay {
    pub fn resolve(&self, index: usize) -> f64 {
        match self {
            Delay::Fixed(ms) => *ms,
            Delay::Stagger { step, start } => start + step * index as f64,
        }
    }

    /// Largest delay applied to any of `count` targets.
    pub fn max_over(&self, count: usize) -> f64 {
        match self {
            Delay::Fixed(ms) => *ms,
            Delay::Stagger { .. } => self.resolve(count.saturating_sub(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_anime_names() {
        assert_eq!(Easing::parse("linear"), Some(Easing::Linear));
        assert_eq!(
            Easing::parse("easeOutQuad"),
            Some(Easing::Out(EasingCurve::Quad))
        );
        assert_eq!(
            Easing::parse("easeInOutElastic(1, .6)"),
            Some(Easing::InOut(EasingCurve::Elastic))
        );
        assert_eq!(Easing::parse("wobble"), None);
    }

    #[test]
    fn curves_hit_endpoints() {
        for curve in [
            EasingCurve::Quad,
            EasingCurve::Cubic,
            EasingCurve::Quart,
            EasingCurve::Quint,
            EasingCurve::Sine,
            EasingCurve::Expo,
            EasingCurve::Circ,
            EasingCurve::Back,
            EasingCurve::Elastic,
            EasingCurve::Bounce,
        ] {
            for easing in [Easing::In(curve), Easing::Out(curve), Easing::InOut(curve)] {
                assert!(easing.eval(0.0).abs() < 1e-6, "{:?} at 0", easing);
                assert!((easing.eval(1.0) - 1.0).abs() < 1e-6, "{:?} at 1", easing);
            }
        }
    }

    #[test]
    fn stagger_delays_grow_per_target() {
        let delay = Delay::Stagger {
            step: 100.0,
            start: 50.0,
        };
        assert_eq!(delay.resolve(0), 50.0);
        assert_eq!(delay.resolve(3), 350.0);
        assert_eq!(delay.max_over(4), 350.0);
        assert_eq!(Delay::Fixed(20.0).max_over(0), 20.0);
    }

    #[test]
    fn interpolates_numbers() {
        let v = Easing::Linear.interpolate(
            AnimatedValue::Number(0.0),
            AnimatedValue::Number(10.0),
            0.5,
        );
        assert_eq!(v, AnimatedValue::Number(5.0));
    }
}
