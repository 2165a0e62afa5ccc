//! Backward-difference differentiation on non-uniform history.
//!
//! Each formula is the derivative, at the newest point, of the polynomial
//! through the current value and the last one to three values. With
//! `h = [h1, h2, h3]` the newest-first intervals between evaluations, the
//! points sit at `0, -h1, -(h1+h2), -(h1+h2+h3)`.

use std::collections::HashMap;

use ti_core::DerivedHandle;

use crate::config::DerivativeOrder;
use crate::registry::DerivedEntry;

/// Derivative of the line through `f0` and `f1` at distance `h1`.
pub fn two_point(f: [f64; 2], h1: f64) -> f64 {
    (f[0] - f[1]) / h1
}

/// Derivative at the newest of three points, with intervals `h1`, `h2`.
pub fn three_point(f: [f64; 3], h1: f64, h2: f64) -> f64 {
    let a = h1;
    let b = h1 + h2;
    (1.0 / a + 1.0 / b) * f[0] - b / (a * (b - a)) * f[1] + a / (b * (b - a)) * f[2]
}

/// Derivative at the newest of four points, with intervals `h1`, `h2`, `h3`.
pub fn four_point(f: [f64; 4], h1: f64, h2: f64, h3: f64) -> f64 {
    let a = h1;
    let b = a + h2;
    let c = b + h3;
    (1.0 / a + 1.0 / b + 1.0 / c) * f[0] - b * c / (a * (b - a) * (c - a)) * f[1]
        + a * c / (b * (b - a) * (c - b)) * f[2]
        - a * b / (c * (c - a) * (c - b)) * f[3]
}

/// Apply the stencil selected by `order`.
///
/// `past` and `intervals` are newest first. Returns exactly zero while any
/// required past value or interval is unknown.
pub fn backward_difference(order: DerivativeOrder, value: f64, past: &[f64], intervals: &[f64]) -> f64 {
    let needed = order.points() - 1;
    if past.len() < needed || intervals.len() < needed {
        return 0.0;
    }
    if intervals[..needed].iter().any(|h| !(h.is_finite() && *h > 0.0)) {
        return 0.0;
    }
    match order {
        DerivativeOrder::TwoPoint => two_point([value, past[0]], intervals[0]),
        DerivativeOrder::ThreePoint => {
            three_point([value, past[0], past[1]], intervals[0], intervals[1])
        }
        DerivativeOrder::FourPoint => four_point(
            [value, past[0], past[1], past[2]],
            intervals[0],
            intervals[1],
            intervals[2],
        ),
    }
}

#[derive(Clone, Debug)]
struct DerivativeVariable {
    handle: DerivedHandle,
    value: f64,
    past: [f64; 3],
    past_len: usize,
}

/// Derived quantities of the current step plus their rolling history.
#[derive(Debug, Default)]
pub(crate) struct DerivativeRegistry {
    vars: Vec<DerivativeVariable>,
    intervals: [f64; 3],
    intervals_len: usize,
}

impl DerivativeRegistry {
    pub fn clear(&mut self) {
        self.vars.clear();
        self.intervals_len = 0;
    }

    /// Take the step-start registrations, keeping history by handle.
    pub fn capture(&mut self, entries: &[DerivedEntry]) {
        let same_layout = entries.len() == self.vars.len()
            && entries.iter().zip(&self.vars).all(|(e, v)| e.handle == v.handle);
        if same_layout {
            for (entry, var) in entries.iter().zip(self.vars.iter_mut()) {
                var.value = entry.value;
            }
            return;
        }

        let mut previous: HashMap<DerivedHandle, ([f64; 3], usize)> = self
            .vars
            .drain(..)
            .map(|v| (v.handle, (v.past, v.past_len)))
            .collect();
        self.vars = entries
            .iter()
            .map(|entry| {
                let (past, past_len) = previous.remove(&entry.handle).unwrap_or(([0.0; 3], 0));
                DerivativeVariable {
                    handle: entry.handle,
                    value: entry.value,
                    past,
                    past_len,
                }
            })
            .collect();
    }

    /// Derivatives of the captured values at the step start.
    pub fn differentiate(&self, order: DerivativeOrder) -> impl Iterator<Item = (DerivedHandle, f64)> + '_ {
        let intervals = &self.intervals[..self.intervals_len];
        self.vars.iter().map(move |v| {
            let d = backward_difference(order, v.value, &v.past[..v.past_len], intervals);
            (v.handle, d)
        })
    }

    /// Shift every history by one slot after a step of size `dt`.
    pub fn advance(&mut self, dt: f64) {
        for v in &mut self.vars {
            v.past = [v.value, v.past[0], v.past[1]];
            v.past_len = (v.past_len + 1).min(3);
        }
        self.intervals = [dt, self.intervals[0], self.intervals[1]];
        self.intervals_len = (self.intervals_len + 1).min(3);
    }

    pub fn intervals(&self) -> &[f64] {
        &self.intervals[..self.intervals_len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(coeffs: &[f64], t: f64) -> f64 {
        coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    fn dpoly(coeffs: &[f64], t: f64) -> f64 {
        coeffs
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, c)| i as f64 * c * t.powi(i as i32 - 1))
            .sum()
    }

    fn sample(coeffs: &[f64], t0: f64, h: [f64; 3]) -> (f64, [f64; 3]) {
        let t1 = t0 - h[0];
        let t2 = t1 - h[1];
        let t3 = t2 - h[2];
        (
            poly(coeffs, t0),
            [poly(coeffs, t1), poly(coeffs, t2), poly(coeffs, t3)],
        )
    }

    #[test]
    fn unknown_history_yields_zero() {
        assert_eq!(
            backward_difference(DerivativeOrder::TwoPoint, 1.0, &[], &[]),
            0.0
        );
        assert_eq!(
            backward_difference(DerivativeOrder::ThreePoint, 1.0, &[0.5, 0.2], &[0.1]),
            0.0
        );
        assert_eq!(
            backward_difference(DerivativeOrder::TwoPoint, 1.0, &[0.5], &[0.0]),
            0.0
        );
    }

    #[test]
    fn stencils_exact_for_their_degree() {
        let h = [0.1, 0.25, 0.07];
        let t0 = 1.3;
        let cases = [
            (DerivativeOrder::TwoPoint, vec![0.4, -1.7]),
            (DerivativeOrder::ThreePoint, vec![0.4, -1.7, 0.9]),
            (DerivativeOrder::FourPoint, vec![0.4, -1.7, 0.9, -0.6]),
        ];
        for (order, coeffs) in cases {
            let (f0, past) = sample(&coeffs, t0, h);
            let d = backward_difference(order, f0, &past, &h);
            assert!(
                (d - dpoly(&coeffs, t0)).abs() < 1e-10,
                "{order:?}: {d} vs {}",
                dpoly(&coeffs, t0)
            );
        }
    }

    #[test]
    fn registry_rolls_history_newest_first() {
        let h = DerivedHandle::from_index(0);
        let mut reg = DerivativeRegistry::default();
        for (i, dt) in [0.1, 0.2, 0.3, 0.4].into_iter().enumerate() {
            reg.capture(&[DerivedEntry {
                handle: h,
                value: i as f64,
            }]);
            reg.advance(dt);
        }
        assert_eq!(reg.intervals(), &[0.4, 0.3, 0.2]);
        assert_eq!(reg.vars[0].past, [3.0, 2.0, 1.0]);
        assert_eq!(reg.vars[0].past_len, 3);
    }

    #[test]
    fn new_handle_starts_without_history() {
        let a = DerivedHandle::from_index(0);
        let b = DerivedHandle::from_index(1);
        let mut reg = DerivativeRegistry::default();
        reg.capture(&[DerivedEntry { handle: a, value: 1.0 }]);
        reg.advance(0.1);
        reg.capture(&[
            DerivedEntry { handle: a, value: 2.0 },
            DerivedEntry { handle: b, value: 5.0 },
        ]);
        let d: Vec<(DerivedHandle, f64)> = reg.differentiate(DerivativeOrder::TwoPoint).collect();
        assert!((d[0].1 - 10.0).abs() < 1e-12);
        assert_eq!(d[1].1, 0.0);
    }
}
