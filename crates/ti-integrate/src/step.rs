//! Generic explicit Runge-Kutta step driven by a Butcher tableau.

use crate::error::SimResult;
use crate::integrator::Integrator;
use crate::model::Model;
use crate::tableau::ButcherTableau;

impl Integrator {
    /// One pass of predictor stages followed by the corrector combination.
    ///
    /// With `reuse_stage0` the first stage (value and derivative at `t`) is
    /// taken from the registry as left by the previous accepted step.
    /// Predictor values are written to the model before each stage
    /// evaluation; the corrector overwrites them with the new state.
    pub(crate) fn run_stages<M: Model + ?Sized>(
        &mut self,
        model: &mut M,
        t: f64,
        dt: f64,
        tableau: &ButcherTableau,
        reuse_stage0: bool,
    ) -> SimResult<()> {
        if reuse_stage0 {
            self.stats.fsal_reuses += 1;
        } else {
            self.evaluate(model, t)?;
            if let Err(reason) = self.states.begin_step(self.ctx.states()) {
                return Err(self.illegal_model(t, reason));
            }
            self.derived.capture(self.ctx.derived());
        }

        for (j, (row, c)) in tableau.a.iter().zip(tableau.c).enumerate() {
            let stage = j + 1;
            for var in &mut self.states.vars {
                var.value = var.x0 + var.increment(row, dt);
                model.set_state(var.handle, var.value);
            }

            let t_stage = t + c * dt;
            self.evaluate(model, t_stage)?;
            if let Err(reason) = self.states.absorb(self.ctx.states(), stage) {
                return Err(self.illegal_model(t_stage, reason));
            }
        }

        for var in &mut self.states.vars {
            var.value = var.x0 + var.increment(tableau.b, dt);
            model.set_state(var.handle, var.value);
        }
        Ok(())
    }

    /// Put every state back to its value at step start.
    pub(crate) fn restore_step_start<M: Model + ?Sized>(&mut self, model: &mut M) {
        for var in &mut self.states.vars {
            var.value = var.x0;
            model.set_state(var.handle, var.x0);
        }
    }
}

#[cfg(test)]
mod tests {
    use ti_core::StateHandle;

    use crate::error::SimResult;
    use crate::integrator::Integrator;
    use crate::model::Model;
    use crate::registry::StepContext;
    use crate::tableau::Method;

    /// x' = t, recording every evaluation time.
    struct Ramp {
        x: f64,
        times: Vec<f64>,
    }

    impl Model for Ramp {
        fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
            self.times.push(t);
            ctx.register_state(StateHandle::from_index(0), self.x, t);
            Ok(())
        }

        fn set_state(&mut self, _handle: StateHandle, value: f64) {
            self.x = value;
        }
    }

    #[test]
    fn stage_times_follow_tableau() {
        let mut integ = Integrator::with_method(Method::Rk4).unwrap();
        let mut model = Ramp {
            x: 0.0,
            times: Vec::new(),
        };
        integ.step(&mut model, 1.0, 0.2).unwrap();
        assert_eq!(model.times, vec![1.0, 1.1, 1.1, 1.2]);
    }

    #[test]
    fn quadrature_is_exact_for_linear_rate() {
        // x(t) = t^2 / 2 is integrated exactly by any method of order >= 2.
        for method in [Method::Rk2, Method::Rk3, Method::Rk4, Method::Rk6] {
            let mut integ = Integrator::with_method(method).unwrap();
            let mut model = Ramp {
                x: 0.0,
                times: Vec::new(),
            };
            let mut t = 0.0;
            for _ in 0..10 {
                t += integ.step(&mut model, t, 0.1).unwrap();
            }
            assert!((model.x - 0.5).abs() < 1e-12, "{method}: {}", model.x);
        }
    }

    #[test]
    fn euler_uses_one_evaluation() {
        let mut integ = Integrator::with_method(Method::Euler).unwrap();
        let mut model = Ramp {
            x: 0.0,
            times: Vec::new(),
        };
        integ.step(&mut model, 2.0, 0.5).unwrap();
        assert_eq!(model.times.len(), 1);
        assert_eq!(model.x, 1.0);
    }
}
