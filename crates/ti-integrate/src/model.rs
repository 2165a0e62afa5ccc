//! Model capability trait.

use ti_core::{DerivedHandle, ErrorHandle, StateHandle};

use crate::error::SimResult;
use crate::registry::StepContext;

/// Result of one adaptive step attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    /// Whether the attempt was kept.
    pub accepted: bool,
    /// Infinity norm of the tolerance-normalized local error.
    pub error_ratio: f64,
    /// Clamped step factor chosen by the control law.
    pub factor: f64,
    /// Step size that was attempted (seconds).
    pub dt: f64,
}

impl StepOutcome {
    /// Step size the controller asks for next.
    pub fn next_dt(&self) -> f64 {
        self.dt * self.factor
    }
}

/// A dynamic system the integrator can advance.
///
/// `evaluate` is the only required callback besides the state setter. It
/// must register every state (and derived quantity) through `ctx` on every
/// call, using the same handles on every call within one step. Handles are
/// allocated once at model setup, see `ti_core::HandleAllocator`.
///
/// The hooks run once per completed step, never per stage. `pre_step` and
/// `post_step` must not change the value of any registered state.
pub trait Model {
    /// Register states and derived quantities for the current values at `t`.
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()>;

    /// Write a new value into the caller-owned storage behind `handle`.
    fn set_state(&mut self, handle: StateHandle, value: f64);

    /// Receive the local error estimate of an accepted adaptive step.
    fn set_state_error(&mut self, _handle: ErrorHandle, _error: f64) {}

    /// Receive the numerical time derivative of a derived quantity.
    fn set_derived(&mut self, _handle: DerivedHandle, _value: f64) {}

    fn pre_step(&mut self, _t: f64, _dt: f64) -> SimResult<()> {
        Ok(())
    }

    /// Called after the step starting at `t` completed with size `dt`.
    fn post_step(&mut self, _t: f64, _dt: f64) -> SimResult<()> {
        Ok(())
    }

    /// Called once per rejected adaptive attempt starting at `t`.
    fn on_failed_step(&mut self, _t: f64, _outcome: &StepOutcome) {}
}

impl<M: Model + ?Sized> Model for &mut M {
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
        (**self).evaluate(t, ctx)
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        (**self).set_state(handle, value)
    }

    fn set_state_error(&mut self, handle: ErrorHandle, error: f64) {
        (**self).set_state_error(handle, error)
    }

    fn set_derived(&mut self, handle: DerivedHandle, value: f64) {
        (**self).set_derived(handle, value)
    }

    fn pre_step(&mut self, t: f64, dt: f64) -> SimResult<()> {
        (**self).pre_step(t, dt)
    }

    fn post_step(&mut self, t: f64, dt: f64) -> SimResult<()> {
        (**self).post_step(t, dt)
    }

    fn on_failed_step(&mut self, t: f64, outcome: &StepOutcome) {
        (**self).on_failed_step(t, outcome)
    }
}
