//! Adams-Bashforth 4 predictor with Adams-Moulton 4 corrector.
//!
//! The first [`BOOTSTRAP_STEPS`] steps of a run use classical RK4 to fill
//! the derivative history; afterwards each step costs two evaluations.

use crate::error::SimResult;
use crate::integrator::Integrator;
use crate::model::Model;
use crate::tableau::CLASSIC_RK4;

/// RK4 steps taken before the multistep formulas have enough history.
pub const BOOTSTRAP_STEPS: u64 = 3;

const HISTORY: u8 = 3;

impl Integrator {
    pub(crate) fn step_multistep<M: Model + ?Sized>(
        &mut self,
        model: &mut M,
        t: f64,
        dt: f64,
    ) -> SimResult<f64> {
        self.fsal_ready = false;

        if self.run_steps < BOOTSTRAP_STEPS {
            self.run_stages(model, t, dt, &CLASSIC_RK4, false)?;
            self.states.vars.iter_mut().for_each(|v| v.push_history());
            return Ok(dt);
        }

        self.evaluate(model, t)?;
        if let Err(reason) = self.states.begin_step(self.ctx.states()) {
            return Err(self.illegal_model(t, reason));
        }
        self.derived.capture(self.ctx.derived());

        if let Some(var) = self.states.vars.iter().find(|v| v.history_len < HISTORY) {
            let reason = format!("state {} has no multistep history", var.handle);
            return Err(self.illegal_model(t, reason));
        }

        for var in &mut self.states.vars {
            let [k1, k2, k3] = var.history;
            let k0 = var.k[0];
            var.value = var.x0 + dt * (55.0 * k0 - 59.0 * k1 + 37.0 * k2 - 9.0 * k3) / 24.0;
            model.set_state(var.handle, var.value);
        }

        let t_next = t + dt;
        self.evaluate(model, t_next)?;
        if let Err(reason) = self.states.absorb(self.ctx.states(), 1) {
            return Err(self.illegal_model(t_next, reason));
        }

        for var in &mut self.states.vars {
            let [k1, k2, _] = var.history;
            let (k0, k_new) = (var.k[0], var.k[1]);
            var.value = var.x0 + dt * (9.0 * k_new + 19.0 * k0 - 5.0 * k1 + k2) / 24.0;
            model.set_state(var.handle, var.value);
            var.push_history();
        }
        Ok(dt)
    }
}
