//! Built-in demonstration models.

use clap::ValueEnum;
use nalgebra::DVector;
use ti_integrate::{
    DerivedHandle, ErrorHandle, HandleAllocator, Model, SimResult, StateHandle, StepContext,
};

use crate::error::{CliError, CliResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    /// x' = -x
    Decay,
    /// Undamped harmonic oscillator, omega = 2
    Oscillator,
    /// Van der Pol oscillator, mu = 1
    VanDerPol,
    /// x' = t, with the rate recovered by numerical differentiation
    Ramp,
}

/// A model that can also report its state and, when known, the exact one.
pub trait DemoModel: Model {
    fn labels(&self) -> &'static [&'static str];

    fn snapshot(&self) -> Vec<f64>;

    fn exact(&self, _t: f64) -> Option<Vec<f64>> {
        None
    }
}

impl ModelKind {
    pub fn build(self) -> CliResult<Box<dyn DemoModel>> {
        let mut alloc = HandleAllocator::new();
        let handles = |err: ti_core::CoreError| CliError::InvalidInput(err.to_string());
        Ok(match self {
            ModelKind::Decay => Box::new(Decay {
                handle: alloc.state().map_err(handles)?,
                x: 1.0,
            }),
            ModelKind::Oscillator => Box::new(Oscillator {
                handles: alloc.states(2).map_err(handles)?,
                state: DVector::from_vec(vec![1.0, 0.0]),
                omega: 2.0,
            }),
            ModelKind::VanDerPol => Box::new(VanDerPol {
                handles: alloc.states(2).map_err(handles)?,
                errors: alloc.errors(2).map_err(handles)?,
                state: DVector::from_vec(vec![2.0, 0.0]),
                local_error: [0.0; 2],
                mu: 1.0,
            }),
            ModelKind::Ramp => Box::new(Ramp {
                handle: alloc.state().map_err(handles)?,
                rate_probe: alloc.derived().map_err(handles)?,
                x: 0.0,
                rate: 0.0,
            }),
        })
    }
}

struct Decay {
    handle: StateHandle,
    x: f64,
}

impl Model for Decay {
    fn evaluate(&mut self, _t: f64, ctx: &mut StepContext) -> SimResult<()> {
        ctx.register_state(self.handle, self.x, -self.x);
        Ok(())
    }

    fn set_state(&mut self, _handle: StateHandle, value: f64) {
        self.x = value;
    }
}

impl DemoModel for Decay {
    fn labels(&self) -> &'static [&'static str] {
        &["x"]
    }

    fn snapshot(&self) -> Vec<f64> {
        vec![self.x]
    }

    fn exact(&self, t: f64) -> Option<Vec<f64>> {
        Some(vec![(-t).exp()])
    }
}

struct Oscillator {
    handles: Vec<StateHandle>,
    state: DVector<f64>,
    omega: f64,
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

impl DemoModel for Oscillator {
    fn labels(&self) -> &'static [&'static str] {
        &["x", "v"]
    }

    fn snapshot(&self) -> Vec<f64> {
        self.state.iter().copied().collect()
    }

    fn exact(&self, t: f64) -> Option<Vec<f64>> {
        let w = self.omega;
        Some(vec![(w * t).cos(), -w * (w * t).sin()])
    }
}

struct VanDerPol {
    handles: Vec<StateHandle>,
    errors: Vec<ErrorHandle>,
    state: DVector<f64>,
    local_error: [f64; 2],
    mu: f64,
}

impl Model for VanDerPol {
    fn evaluate(&mut self, _t: f64, ctx: &mut StepContext) -> SimResult<()> {
        let (x, y) = (self.state[0], self.state[1]);
        let rates = DVector::from_vec(vec![y, self.mu * (1.0 - x * x) * y - x]);
        ctx.register_state_vector(&self.handles, &self.state, &rates, Some(&self.errors));
        Ok(())
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        self.state[handle.index()] = value;
    }

    fn set_state_error(&mut self, handle: ErrorHandle, error: f64) {
        self.local_error[handle.index()] = error;
    }
}

impl DemoModel for VanDerPol {
    fn labels(&self) -> &'static [&'static str] {
        &["x", "y", "err_x", "err_y"]
    }

    fn snapshot(&self) -> Vec<f64> {
        vec![
            self.state[0],
            self.state[1],
            self.local_error[0],
            self.local_error[1],
        ]
    }
}

struct Ramp {
    handle: StateHandle,
    rate_probe: DerivedHandle,
    x: f64,
    rate: f64,
}

impl Model for Ramp {
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
        ctx.register_state(self.handle, self.x, t);
        ctx.register_derived(self.rate_probe, self.x);
        Ok(())
    }

    fn set_state(&mut self, _handle: StateHandle, value: f64) {
        self.x = value;
    }

    fn set_derived(&mut self, _handle: DerivedHandle, value: f64) {
        self.rate = value;
    }
}

impl DemoModel for Ramp {
    fn labels(&self) -> &'static [&'static str] {
        &["x", "dx_dt"]
    }

    fn snapshot(&self) -> Vec<f64> {
        vec![self.x, self.rate]
    }
}
