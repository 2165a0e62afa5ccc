//! Shared test models.
#![allow(dead_code)]

use nalgebra::DVector;
use ti_integrate::{
    ErrorHandle, HandleAllocator, Model, SimResult, StateHandle, StepContext, StepOutcome,
};

/// x' = -rate * x, with every hook call recorded.
pub struct Decay {
    pub handle: StateHandle,
    pub error: Option<ErrorHandle>,
    pub x: f64,
    pub rate: f64,
    pub eval_times: Vec<f64>,
    pub steps: Vec<(f64, f64)>,
    pub failures: Vec<StepOutcome>,
    pub errors: Vec<f64>,
}

impl Decay {
    pub fn new(x0: f64, rate: f64) -> Self {
        let mut alloc = HandleAllocator::new();
        Self {
            handle: alloc.state().unwrap(),
            error: None,
            x: x0,
            rate,
            eval_times: Vec::new(),
            steps: Vec::new(),
            failures: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_error_output(mut self) -> Self {
        let mut alloc = HandleAllocator::new();
        self.error = Some(alloc.error().unwrap());
        self
    }
}

impl Model for Decay {
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
        self.eval_times.push(t);
        let dx = -self.rate * self.x;
        match self.error {
            Some(error) => ctx.register_state_with_error(self.handle, self.x, dx, error),
            None => ctx.register_state(self.handle, self.x, dx),
        }
        Ok(())
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        assert_eq!(handle, self.handle);
        self.x = value;
    }

    fn set_state_error(&mut self, _handle: ErrorHandle, error: f64) {
        self.errors.push(error);
    }

    fn post_step(&mut self, t: f64, dt: f64) -> SimResult<()> {
        self.steps.push((t, dt));
        Ok(())
    }

    fn on_failed_step(&mut self, _t: f64, outcome: &StepOutcome) {
        self.failures.push(*outcome);
    }
}

/// Harmonic oscillator `[x, v]' = [v, -omega^2 x]` registered as a vector.
pub struct Oscillator {
    pub handles: Vec<StateHandle>,
    pub state: DVector<f64>,
    pub omega: f64,
}

impl Oscillator {
    pub fn new(x0: f64, v0: f64, omega: f64) -> Self {
        let mut alloc = HandleAllocator::new();
        Self {
            handles: alloc.states(2).unwrap(),
            state: DVector::from_vec(vec![x0, v0]),
            omega,
        }
    }

    pub fn energy(&self) -> f64 {
        0.5 * (self.state[1].powi(2) + (self.omega * self.state[0]).powi(2))
    }
}

impl Model for Oscillator {
    fn evaluate(&mut self, _t: f64, ctx: &mut StepContext) -> SimResult<()> {
        let rates = DVector::from_vec(vec![
            self.state[1],
            -self.omega * self.omega * self.state[0],
        ]);
        ctx.register_state_vector(&self.handles, &self.state, &rates, None);
        Ok(())
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        self.state[handle.index()] = value;
    }
}

/// Integrate `model` with fixed steps of `dt` over `[0, t_end]`.
pub fn integrate_fixed<M: Model>(
    integ: &mut ti_integrate::Integrator,
    model: &mut M,
    dt: f64,
    t_end: f64,
) -> f64 {
    let n = (t_end / dt).round() as usize;
    for i in 0..n {
        integ.step(model, i as f64 * dt, dt).unwrap();
    }
    n as f64 * dt
}

/// x' = -x + sin(omega t); time-dependent forcing keeps embedded error
/// estimates away from zero.
pub struct Forced {
    pub inner: Decay,
    pub omega: f64,
}

impl Forced {
    pub fn new(x0: f64, omega: f64) -> Self {
        Self {
            inner: Decay::new(x0, 1.0).with_error_output(),
            omega,
        }
    }
}

impl Model for Forced {
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
        let d = &mut self.inner;
        d.eval_times.push(t);
        let dx = -d.x + (self.omega * t).sin();
        if let Some(error) = d.error {
            ctx.register_state_with_error(d.handle, d.x, dx, error);
        }
        Ok(())
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        self.inner.set_state(handle, value);
    }

    fn set_state_error(&mut self, handle: ErrorHandle, error: f64) {
        self.inner.set_state_error(handle, error);
    }

    fn post_step(&mut self, t: f64, dt: f64) -> SimResult<()> {
        self.inner.post_step(t, dt)
    }

    fn on_failed_step(&mut self, t: f64, outcome: &StepOutcome) {
        self.inner.on_failed_step(t, outcome);
    }
}

/// Decay whose derivative turns NaN at any evaluation after `poison_after`,
/// so every adaptive attempt past that time fails.
pub struct Poisoned {
    pub inner: Decay,
    pub poison_after: f64,
}

impl Model for Poisoned {
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
        let d = &mut self.inner;
        let dx = if t > self.poison_after {
            f64::NAN
        } else {
            -d.rate * d.x
        };
        ctx.register_state(d.handle, d.x, dx);
        Ok(())
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        self.inner.set_state(handle, value);
    }

    fn on_failed_step(&mut self, t: f64, outcome: &StepOutcome) {
        self.inner.on_failed_step(t, outcome);
    }
}
