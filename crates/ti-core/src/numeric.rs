use crate::CoreError;

/// Floating point type used throughout the engine
pub type Real = f64;

/// Absolute/relative tolerance pair.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

impl Tolerances {
    /// Error scale for a value of magnitude `x`: `max(|x| * rel, abs)`.
    pub fn scale(&self, x: Real) -> Real {
        (x.abs() * self.rel).max(self.abs)
    }
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// True when `dt` no longer changes `t` in floating point.
pub fn step_underflows(t: Real, dt: Real) -> bool {
    dt == 0.0 || t + dt == t
}

/// Landing tolerance for end-of-cycle checks: `1e3 * eps`, scaled by the
/// magnitude of the target time once it exceeds one.
pub fn landing_tolerance(target: Real) -> Real {
    1e3 * Real::EPSILON * target.abs().max(1.0)
}
