//! The integrator facade: owns configuration, registries and run counters,
//! and dispatches each step to the fixed-step, adaptive or multistep engine.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use ti_core::ensure_finite;
use ti_core::timing::{self, Timer, step_timing};

use crate::config::IntegratorConfig;
use crate::differentiate::DerivativeRegistry;
use crate::error::{SimError, SimResult};
use crate::model::{Model, StepOutcome};
use crate::registry::{StateRegistry, StepContext};
use crate::tableau::Method;

/// Counters accumulated since construction or the last `reset_stats`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IntegratorStats {
    pub accepted_steps: u64,
    pub rejected_steps: u64,
    pub evaluations: u64,
    pub fsal_reuses: u64,
    /// Wall time spent inside `step` (seconds)
    pub wall_time_s: f64,
}

/// Time integrator for a [`Model`].
///
/// Single-threaded: one instance advances one model. The model is borrowed
/// mutably for the whole step, so it cannot call back into the integrator.
#[derive(Debug)]
pub struct Integrator {
    pub(crate) config: IntegratorConfig,
    /// Internal step size used by the cycle scheduler (seconds).
    pub(crate) time_step: f64,
    pub(crate) states: StateRegistry,
    pub(crate) derived: DerivativeRegistry,
    pub(crate) ctx: StepContext,
    /// Error ratio of the last accepted adaptive step.
    pub(crate) prev_ratio: Option<f64>,
    /// Stage 0 of the next step is already in `states`.
    pub(crate) fsal_ready: bool,
    /// Steps completed since construction or `reset`.
    pub(crate) run_steps: u64,
    /// The step in progress is a shortened final cycle sub-step.
    pub(crate) shortened: bool,
    pub(crate) last_outcome: Option<StepOutcome>,
    pub(crate) terminate: Arc<AtomicBool>,
    pub(crate) stats: IntegratorStats,
}

impl Integrator {
    /// Create an integrator after validating `config`.
    pub fn new(config: IntegratorConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            time_step: config.time_step_init,
            config,
            states: StateRegistry::default(),
            derived: DerivativeRegistry::default(),
            ctx: StepContext::new(),
            prev_ratio: None,
            fsal_ready: false,
            run_steps: 0,
            shortened: false,
            last_outcome: None,
            terminate: Arc::new(AtomicBool::new(false)),
            stats: IntegratorStats::default(),
        })
    }

    pub fn with_method(method: Method) -> SimResult<Self> {
        Self::new(IntegratorConfig::new(method))
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Replace the configuration between steps.
    ///
    /// A method change restarts the run (see [`Integrator::reset`]) because
    /// stage and multistep history no longer apply.
    pub fn set_config(&mut self, config: IntegratorConfig) -> SimResult<()> {
        config.validate()?;
        let restart = config.method != self.config.method;
        self.config = config;
        self.fsal_ready &= self.config.fsal_reuse;
        if restart {
            self.reset();
        } else {
            self.time_step = self.config.clamp_step(self.time_step);
        }
        Ok(())
    }

    pub fn set_method(&mut self, method: Method) -> SimResult<()> {
        let config = self.config.clone().with_method(method);
        self.set_config(config)
    }

    pub fn method(&self) -> Method {
        self.config.method
    }

    /// Current internal step size (seconds).
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn set_time_step(&mut self, dt: f64) -> SimResult<()> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidArg {
                what: "time step must be positive",
            });
        }
        self.time_step = dt;
        Ok(())
    }

    pub fn stats(&self) -> &IntegratorStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = IntegratorStats::default();
    }

    /// Outcome of the last adaptive attempt, if any.
    pub fn last_outcome(&self) -> Option<&StepOutcome> {
        self.last_outcome.as_ref()
    }

    /// Number of states registered in the current or last step.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Intervals of the last completed steps, newest first (at most three).
    pub fn step_history(&self) -> &[f64] {
        self.derived.intervals()
    }

    /// Cooperative termination flag checked at every cycle sub-step.
    pub fn termination_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminate)
    }

    /// Share an externally owned termination flag.
    pub fn set_termination_flag(&mut self, flag: Arc<AtomicBool>) {
        self.terminate = flag;
    }

    /// Restart the run: initial step size restored, FSAL reuse cleared,
    /// controller, multistep and differentiation history dropped.
    pub fn reset(&mut self) {
        self.time_step = self.config.time_step_init;
        self.fsal_ready = false;
        self.prev_ratio = None;
        self.run_steps = 0;
        self.shortened = false;
        self.last_outcome = None;
        self.states.clear();
        self.derived.clear();
        self.ctx.clear();
    }

    /// Advance `model` by one step of `dt` starting at `time`.
    ///
    /// Returns the step size actually completed; adaptive methods may
    /// complete less than `dt` after rejections.
    pub fn step<M: Model + ?Sized>(&mut self, model: &mut M, time: f64, dt: f64) -> SimResult<f64> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidArg {
                what: "step size must be positive",
            });
        }
        ensure_finite(time, "step start time")?;

        let timer = Timer::start("step");
        model.pre_step(time, dt)?;

        let method = self.config.method;
        let completed = match method.tableau() {
            Some(tableau) if tableau.is_embedded() => {
                self.step_adaptive(model, time, dt, tableau)?
            }
            Some(tableau) => {
                self.fsal_ready = false;
                self.run_stages(model, time, dt, tableau, false)?;
                dt
            }
            None => self.step_multistep(model, time, dt)?,
        };

        self.complete_step(model, completed);
        model.post_step(time, completed)?;

        let elapsed = timer.elapsed_s();
        self.stats.wall_time_s += elapsed;
        if timing::is_enabled() {
            step_timing::STEPS.record(elapsed);
        }
        tracing::trace!(time, dt = completed, method = %method, "step completed");
        Ok(completed)
    }

    /// Differentiate derived quantities and roll histories after a step.
    fn complete_step<M: Model + ?Sized>(&mut self, model: &mut M, dt: f64) {
        for (handle, value) in self.derived.differentiate(self.config.derivative_order) {
            model.set_derived(handle, value);
        }
        self.derived.advance(dt);
        // FSAL carries the last evaluation, taken at the end of this step.
        if self.fsal_ready {
            self.derived.capture(self.ctx.derived());
        }
        self.run_steps += 1;
        self.stats.accepted_steps += 1;
    }

    /// Run `model.evaluate` into the context and surface registration faults.
    pub(crate) fn evaluate<M: Model + ?Sized>(&mut self, model: &mut M, t: f64) -> SimResult<()> {
        self.ctx.clear();
        let timer = Timer::start("evaluate");
        model.evaluate(t, &mut self.ctx)?;
        if timing::is_enabled() {
            step_timing::EVALUATIONS.record(timer.elapsed_s());
        }
        self.stats.evaluations += 1;
        match self.ctx.take_fault() {
            Some(reason) => Err(self.illegal_model(t, reason)),
            None => Ok(()),
        }
    }

    pub(crate) fn illegal_model(&self, time: f64, reason: String) -> SimError {
        tracing::error!(time, method = %self.config.method, %reason, "illegal model");
        SimError::IllegalModel {
            time,
            method: self.config.method.display_name(),
            reason,
        }
    }
}
