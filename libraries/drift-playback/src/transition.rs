//! Fade transition curves
//!
//! A `Transition` maps fade progress in `[0, 1]` to a gain factor,
//! nominally also in `[0, 1]`. Curves are pure values: no state, no
//! side effects, cheap to clone, shareable across concurrent fades.
//! Composite curves (`EaseInOut`, `Chained`) box their legs so the enum
//! stays `Sized`; serde serializes the boxes transparently.
//!
//! The elastic curve intentionally leaves `[0, 1]` (it rings around the
//! endpoint). Downstream gain handling preserves that overshoot on the
//! fade path, see `volume::Gain::set_faded`.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// A fade curve: pure function from progress to gain factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transition {
    /// `f(x) = x`
    Linear,
    /// Identity passthrough of a wrapped transition, `f(x) = inner(x)`
    EaseIn(Box<Transition>),
    /// `f(x) = x^exponent`
    Power {
        /// Curve exponent; 1.0 degenerates to linear
        exponent: f32,
    },
    /// `f(x) = (base^x - 1) / (base - 1)`; the only invertible leaf curve
    Exponential {
        /// Growth base; must be positive and not 1
        base: f32,
    },
    /// `f(x) = 2^(10(x-1)) * cos(20(x-1) * pi * elasticity / 3)`
    ///
    /// Rings around the endpoint; output may leave `[0, 1]`.
    Elastic {
        /// Ring frequency scale (1.0 = reference shape)
        elasticity: f32,
    },
    /// Blend of an ease-in and an ease-out curve, crossed over by a
    /// transpose curve: `f(x) = in(x)*t(x) + (1 - out(1-x))*(1 - t(x))`
    EaseInOut {
        /// Curve shaping the ease-in leg
        fade_in: Box<Transition>,
        /// Curve shaping the ease-out leg (evaluated at `1 - x`)
        fade_out: Box<Transition>,
        /// Crossover weight between the two legs
        transpose: Box<Transition>,
    },
    /// Function composition: `f(x) = outer(inner(x))`
    Chained {
        /// Applied second
        outer: Box<Transition>,
        /// Applied first
        inner: Box<Transition>,
    },
}

impl Default for Transition {
    fn default() -> Self {
        Self::Linear
    }
}

impl Transition {
    /// Power curve with the given exponent
    pub fn power(exponent: f32) -> Self {
        Self::Power { exponent }
    }

    /// Exponential curve with the given base (positive, not 1)
    pub fn exponential(base: f32) -> Self {
        Self::Exponential { base }
    }

    /// Elastic curve with the reference elasticity of 1.0
    pub fn elastic() -> Self {
        Self::Elastic { elasticity: 1.0 }
    }

    /// Elastic curve with a custom elasticity
    pub fn elastic_with(elasticity: f32) -> Self {
        Self::Elastic { elasticity }
    }

    /// Wrap a transition as an ease-in (identity passthrough)
    pub fn ease_in(inner: Transition) -> Self {
        Self::EaseIn(Box::new(inner))
    }

    /// Blend `fade_in` and `fade_out` across the `transpose` crossover
    pub fn ease_in_out(fade_in: Transition, fade_out: Transition, transpose: Transition) -> Self {
        Self::EaseInOut {
            fade_in: Box::new(fade_in),
            fade_out: Box::new(fade_out),
            transpose: Box::new(transpose),
        }
    }

    /// Compose two transitions: `outer` after `inner`
    pub fn chained(outer: Transition, inner: Transition) -> Self {
        Self::Chained {
            outer: Box::new(outer),
            inner: Box::new(inner),
        }
    }

    /// Evaluate the curve at progress `x`
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Self::Linear => x,
            Self::EaseIn(inner) => inner.apply(x),
            Self::Power { exponent } => x.powf(*exponent),
            Self::Exponential { base } => {
                // The limit of (b^x - 1)/(b - 1) as b approaches 1 is x
                if (base - 1.0).abs() < 1e-6 {
                    x
                } else {
                    (base.powf(x) - 1.0) / (base - 1.0)
                }
            }
            Self::Elastic { elasticity } => {
                let u = x - 1.0;
                2f32.powf(10.0 * u) * (20.0 * u * PI * elasticity / 3.0).cos()
            }
            Self::EaseInOut {
                fade_in,
                fade_out,
                transpose,
            } => {
                let t = transpose.apply(x);
                fade_in.apply(x) * t + (1.0 - fade_out.apply(1.0 - x)) * (1.0 - t)
            }
            Self::Chained { outer, inner } => outer.apply(inner.apply(x)),
        }
    }

    /// Evaluate the inverse curve at gain `y`, if this curve has one
    pub fn apply_inverse(&self, y: f32) -> Option<f32> {
        match self {
            Self::Linear => Some(y),
            Self::EaseIn(inner) => inner.apply_inverse(y),
            Self::Exponential { base } => {
                if (base - 1.0).abs() < 1e-6 {
                    return Some(y);
                }
                let arg = y * (base - 1.0) + 1.0;
                if arg > 0.0 {
                    Some(arg.ln() / base.ln())
                } else {
                    None
                }
            }
            Self::Chained { outer, inner } => inner.apply_inverse(outer.apply_inverse(y)?),
            Self::Power { .. } | Self::Elastic { .. } | Self::EaseInOut { .. } => None,
        }
    }

    /// Whether [`Transition::apply_inverse`] is defined for this curve
    pub fn is_invertible(&self) -> bool {
        match self {
            Self::Linear | Self::Exponential { .. } => true,
            Self::EaseIn(inner) => inner.is_invertible(),
            Self::Chained { outer, inner } => outer.is_invertible() && inner.is_invertible(),
            Self::Power { .. } | Self::Elastic { .. } | Self::EaseInOut { .. } => false,
        }
    }
}
