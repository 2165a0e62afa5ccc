//! Adaptive step-size control for embedded Runge-Kutta pairs.
//!
//! An attempt is judged by the infinity norm of the tolerance-normalized
//! local error. The active [`StepSizeLaw`] turns that ratio into a step
//! factor; a factor below the acceptance threshold rejects the attempt and
//! retries from the step-start snapshot with the contracted step.

use ti_core::numeric::step_underflows;

use crate::config::{ControllerLaw, MinStepPolicy};
use crate::error::{SimError, SimResult};
use crate::integrator::Integrator;
use crate::model::{Model, StepOutcome};
use crate::tableau::ButcherTableau;

/// Steps of a run accepted at the requested size before control starts.
pub const INIT_STEPS: u64 = 4;

/// Maps an error ratio to a step factor.
///
/// Factors returned here are unclamped; the controller applies the
/// configured bounds.
pub trait StepSizeLaw {
    /// Factor for `ratio` given the previous accepted ratio `prev`.
    fn factor(&self, ratio: f64, prev: f64, order: f64, weight: f64) -> f64;

    /// Ratio that produces `factor` when it equals the previous ratio.
    fn ratio_for_factor(&self, factor: f64, order: f64, weight: f64) -> f64;
}

/// `weight * ratio^(-1/(order-1))`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Press;

/// PI controller: `(weight/ratio)^(0.3/order) * (prev/ratio)^(0.4/order)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gustafsson;

const GUSTAFSSON_P: f64 = 0.3;
const GUSTAFSSON_I: f64 = 0.4;

fn press_exponent(order: f64) -> f64 {
    (order - 1.0).max(1.0)
}

impl StepSizeLaw for Press {
    fn factor(&self, ratio: f64, _prev: f64, order: f64, weight: f64) -> f64 {
        weight * ratio.powf(-1.0 / press_exponent(order))
    }

    fn ratio_for_factor(&self, factor: f64, order: f64, weight: f64) -> f64 {
        (weight / factor).powf(press_exponent(order))
    }
}

impl StepSizeLaw for Gustafsson {
    fn factor(&self, ratio: f64, prev: f64, order: f64, weight: f64) -> f64 {
        (weight / ratio).powf(GUSTAFSSON_P / order) * (prev / ratio).powf(GUSTAFSSON_I / order)
    }

    fn ratio_for_factor(&self, factor: f64, order: f64, weight: f64) -> f64 {
        weight * factor.powf(-order / GUSTAFSSON_P)
    }
}

impl ControllerLaw {
    pub fn law(self) -> &'static dyn StepSizeLaw {
        match self {
            ControllerLaw::Press => &Press,
            ControllerLaw::Gustafsson => &Gustafsson,
        }
    }
}

impl Integrator {
    /// Adaptive step with retries. Returns the step size completed.
    pub(crate) fn step_adaptive<M: Model + ?Sized>(
        &mut self,
        model: &mut M,
        t: f64,
        requested: f64,
        tableau: &ButcherTableau,
    ) -> SimResult<f64> {
        let Some(b_diff) = tableau.b_diff else {
            return Err(SimError::InvalidArg {
                what: "adaptive stepping needs an embedded tableau",
            });
        };
        let law = self.config.law.law();
        let tuning = self.config.tuning;
        let controlled = self.run_steps >= INIT_STEPS;

        let mut dt = requested;
        let mut reuse =
            self.fsal_ready && self.config.fsal_reuse && tableau.fsal && self.run_steps > 0;

        loop {
            self.run_stages(model, t, dt, tableau, reuse)?;

            let (mut ratio, max_error) = self.estimate_error(b_diff, dt);
            if ratio.is_finite() && max_error < f64::EPSILON {
                ratio = law.ratio_for_factor(tuning.step_factor_max, tableau.order, tuning.weight);
            }
            let prev = self.prev_ratio.unwrap_or(ratio);
            let raw = law.factor(ratio, prev, tableau.order, tuning.weight);
            let factor = if raw.is_nan() {
                tuning.step_factor_min
            } else {
                raw.clamp(tuning.step_factor_min, tuning.step_factor_max)
            };
            let mut outcome = StepOutcome {
                accepted: true,
                error_ratio: ratio,
                factor,
                dt,
            };

            if !controlled {
                if ratio.is_finite() {
                    self.prev_ratio = Some(ratio);
                }
                self.accept_adaptive(model, tableau, outcome);
                return Ok(dt);
            }

            if factor >= tuning.accept_threshold {
                self.prev_ratio = Some(ratio);
                if !self.shortened {
                    self.time_step = dt * factor;
                }
                self.accept_adaptive(model, tableau, outcome);
                return Ok(dt);
            }

            let policy = self.config.min_step_policy;
            if policy == MinStepPolicy::Clamp && dt <= self.config.time_step_min {
                tracing::warn!(time = t, dt, ratio, "accepting step at minimum size");
                if ratio.is_finite() {
                    self.prev_ratio = Some(ratio);
                }
                if !self.shortened {
                    self.time_step = self.config.time_step_min;
                }
                self.accept_adaptive(model, tableau, outcome);
                return Ok(dt);
            }

            outcome.accepted = false;
            self.last_outcome = Some(outcome);
            self.stats.rejected_steps += 1;
            self.restore_step_start(model);
            model.on_failed_step(t, &outcome);
            tracing::debug!(time = t, dt, ratio, factor, "step rejected");

            reuse = false;
            self.fsal_ready = false;
            dt *= factor;
            match policy {
                MinStepPolicy::Clamp => dt = dt.max(self.config.time_step_min),
                MinStepPolicy::Underflow => {
                    if step_underflows(t, dt) {
                        tracing::error!(time = t, dt, "step size underflow");
                        return Err(SimError::StepUnderflow { time: t, step: dt });
                    }
                }
            }
        }
    }

    /// Infinity norm of the normalized local error, and the largest raw
    /// error. Stores the raw error per state. A non-finite error yields an
    /// infinite ratio.
    fn estimate_error(&mut self, b_diff: &[f64], dt: f64) -> (f64, f64) {
        let tol = self.config.tolerances;
        let mut ratio = 0.0_f64;
        let mut max_error = 0.0_f64;
        for var in &mut self.states.vars {
            let err = var.increment(b_diff, dt).abs();
            var.local_error = err;
            let scale = tol.scale(var.value);
            let r = if !err.is_finite() {
                f64::INFINITY
            } else if scale > 0.0 {
                err / scale
            } else if err > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
            ratio = ratio.max(r);
            max_error = max_error.max(err);
        }
        (ratio, max_error)
    }

    fn accept_adaptive<M: Model + ?Sized>(
        &mut self,
        model: &mut M,
        tableau: &ButcherTableau,
        outcome: StepOutcome,
    ) {
        self.last_outcome = Some(outcome);
        for var in &self.states.vars {
            if let Some(handle) = var.error_out {
                model.set_state_error(handle, var.local_error);
            }
        }

        self.fsal_ready = tableau.fsal && self.config.fsal_reuse;
        if self.fsal_ready {
            // The last stage was evaluated at the corrected state.
            let last = tableau.stages() - 1;
            for var in &mut self.states.vars {
                var.x0 = var.value;
                var.k[0] = var.k[last];
            }
        }
    }
}
