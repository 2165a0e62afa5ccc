//! Cycle scheduling: fixed-duration advances built from internal steps.

use std::sync::atomic::Ordering;

use ti_core::numeric::{ensure_finite, landing_tolerance};
use ti_core::timing::{self, Timer, step_timing};

use crate::error::{SimError, SimResult};
use crate::integrator::Integrator;
use crate::model::Model;

impl Integrator {
    /// Advance `model` from `time` by `duration`, landing exactly on the end.
    ///
    /// The internal step is used for every sub-step except the last, which is
    /// shortened (or stretched by at most the landing tolerance) to hit
    /// `time + duration`. A shortened sub-step never shrinks the stored
    /// internal step. Returns the time reached.
    pub fn cycle<M: Model + ?Sized>(&mut self, model: &mut M, time: f64, duration: f64) -> SimResult<f64> {
        check_cycle_args(time, duration)?;
        let end = time + duration;
        let tol = landing_tolerance(end);

        let mut t = time;
        while end - t > tol {
            t += self.sub_step(model, t, end - t, duration)?;
        }
        Ok(t)
    }

    /// Perform exactly one sub-step of at most `max_duration`.
    ///
    /// Returns the step size completed.
    pub fn cycle_single_step<M: Model + ?Sized>(
        &mut self,
        model: &mut M,
        time: f64,
        max_duration: f64,
    ) -> SimResult<f64> {
        check_cycle_args(time, max_duration)?;
        if max_duration <= landing_tolerance(time + max_duration) {
            return Ok(0.0);
        }
        self.sub_step(model, time, max_duration, max_duration)
    }

    fn sub_step<M: Model + ?Sized>(
        &mut self,
        model: &mut M,
        t: f64,
        remaining: f64,
        requested: f64,
    ) -> SimResult<f64> {
        if self.terminate.load(Ordering::Relaxed) {
            tracing::info!(time = t, "termination requested");
            return Err(SimError::UserTermination {
                time: t,
                step: self.time_step,
                requested,
                min: self.config.time_step_min,
                max: self.config.time_step_max,
            });
        }

        self.time_step = self.config.clamp_step(self.time_step);
        let mut dt = self.time_step;
        if remaining - dt <= landing_tolerance(t + remaining) {
            self.shortened = remaining < dt;
            dt = remaining;
        }

        let wall = Timer::start("sub-step");
        let completed = self.step(model, t, dt);
        self.shortened = false;
        let completed = completed?;

        if self.config.real_time {
            let slept = timing::sleep_remaining(completed, wall.elapsed_s());
            if timing::is_enabled() {
                step_timing::PACING_SLEEP.record(slept);
            }
        }
        Ok(completed)
    }
}

fn check_cycle_args(time: f64, duration: f64) -> SimResult<()> {
    ensure_finite(time, "cycle start time")?;
    if !(duration.is_finite() && duration >= 0.0) {
        return Err(SimError::InvalidArg {
            what: "duration must be non-negative",
        });
    }
    Ok(())
}
