//! Registration consistency: the handle set fixed by the first evaluation
//! of a step must be repeated by every later evaluation of that step.

mod common;

use common::Decay;
use ti_integrate::{
    HandleAllocator, Integrator, Method, Model, SimError, SimResult, StateHandle, StepContext,
};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Fault {
    None,
    Extra,
    Missing,
    Duplicate,
    Swapped,
}

/// Two decaying states; one chosen evaluation registers a faulty set.
struct Pair {
    handles: Vec<StateHandle>,
    x: [f64; 2],
    evals: usize,
    fault_at: usize,
    fault: Fault,
    faulted: bool,
    writes_after_fault: usize,
}

impl Pair {
    fn new(fault: Fault, fault_at: usize) -> Self {
        let mut alloc = HandleAllocator::new();
        Self {
            handles: alloc.states(3).unwrap(),
            x: [1.0, 2.0],
            evals: 0,
            fault_at,
            fault,
            faulted: false,
            writes_after_fault: 0,
        }
    }
}

impl Model for Pair {
    fn evaluate(&mut self, _t: f64, ctx: &mut StepContext) -> SimResult<()> {
        self.evals += 1;
        let fault = if self.evals == self.fault_at {
            self.faulted = true;
            self.fault
        } else {
            Fault::None
        };

        let [h0, h1, h2] = [self.handles[0], self.handles[1], self.handles[2]];
        let [x0, x1] = self.x;
        match fault {
            Fault::None => {
                ctx.register_state(h0, x0, -x0);
                ctx.register_state(h1, x1, -2.0 * x1);
            }
            Fault::Extra => {
                ctx.register_state(h0, x0, -x0);
                ctx.register_state(h1, x1, -2.0 * x1);
                ctx.register_state(h2, 0.0, 0.0);
            }
            Fault::Missing => ctx.register_state(h0, x0, -x0),
            Fault::Duplicate => {
                ctx.register_state(h0, x0, -x0);
                ctx.register_state(h0, x0, -x0);
            }
            Fault::Swapped => {
                ctx.register_state(h1, x1, -2.0 * x1);
                ctx.register_state(h0, x0, -x0);
            }
        }
        Ok(())
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        if self.faulted && self.fault != Fault::Swapped {
            self.writes_after_fault += 1;
        }
        if let Some(slot) = self.x.get_mut(handle.index()) {
            *slot = value;
        }
    }
}

fn expect_illegal(err: SimError) -> (f64, String) {
    match err {
        SimError::IllegalModel {
            time,
            method,
            reason,
        } => {
            assert_eq!(method, Method::Rk4.display_name());
            (time, reason)
        }
        other => panic!("expected illegal model, got {other:?}"),
    }
}

#[test]
fn extra_state_on_a_later_stage_stops_the_step() {
    let mut integ = Integrator::with_method(Method::Rk4).unwrap();
    let mut model = Pair::new(Fault::Extra, 3);

    let err = integ.step(&mut model, 0.0, 0.1).unwrap_err();
    let (time, reason) = expect_illegal(err);
    assert!((time - 0.05).abs() < 1e-15);
    assert!(reason.contains("3 states"), "{reason}");
    assert_eq!(model.writes_after_fault, 0);
    assert_eq!(model.evals, 3);
}

#[test]
fn missing_state_is_illegal() {
    let mut integ = Integrator::with_method(Method::Rk4).unwrap();
    let mut model = Pair::new(Fault::Missing, 2);
    let (time, _) = expect_illegal(integ.step(&mut model, 1.0, 0.1).unwrap_err());
    assert!((time - 1.05).abs() < 1e-12);
    assert_eq!(model.writes_after_fault, 0);
}

#[test]
fn duplicate_registration_is_illegal() {
    let mut integ = Integrator::with_method(Method::Rk4).unwrap();
    let mut model = Pair::new(Fault::Duplicate, 4);
    let (_, reason) = expect_illegal(integ.step(&mut model, 0.0, 0.1).unwrap_err());
    assert!(reason.contains("twice"), "{reason}");
    assert_eq!(model.writes_after_fault, 0);
}

#[test]
fn duplicate_on_first_evaluation_is_illegal() {
    let mut integ = Integrator::with_method(Method::Rk4).unwrap();
    let mut model = Pair::new(Fault::Duplicate, 1);
    expect_illegal(integ.step(&mut model, 0.0, 0.1).unwrap_err());
    assert_eq!(model.writes_after_fault, 0);
}

#[test]
fn registration_order_does_not_matter() {
    let mut reference = Pair::new(Fault::None, 0);
    let mut swapped = Pair::new(Fault::Swapped, 3);
    let mut a = Integrator::with_method(Method::Rk4).unwrap();
    let mut b = Integrator::with_method(Method::Rk4).unwrap();

    a.step(&mut reference, 0.0, 0.1).unwrap();
    b.step(&mut swapped, 0.0, 0.1).unwrap();
    assert_eq!(reference.x, swapped.x);
}

#[test]
fn step_start_fixes_the_handle_set() {
    let mut integ = Integrator::with_method(Method::Rk4).unwrap();
    // Evaluation 5 is the first of the second step.
    let mut model = Pair::new(Fault::Extra, 5);
    integ.step(&mut model, 0.0, 0.1).unwrap();
    let err = integ.step(&mut model, 0.1, 0.1).unwrap_err();
    // The extra state at step start fixes a three-state set, which the
    // following stages no longer register.
    let (time, _) = expect_illegal(err);
    assert!((time - 0.15).abs() < 1e-12);
}

#[test]
fn multistep_requires_history_for_every_state() {
    let mut integ = Integrator::with_method(Method::AdamsBashforth4).unwrap();
    // Bootstrap takes 3 x 4 evaluations; evaluation 15 starts the fifth step.
    let mut model = Pair::new(Fault::Extra, 15);
    let mut t = 0.0;
    for _ in 0..4 {
        t += integ.step(&mut model, t, 0.1).unwrap();
    }

    let err = integ.step(&mut model, t, 0.1).unwrap_err();
    match err {
        SimError::IllegalModel { method, reason, .. } => {
            assert_eq!(method, Method::AdamsBashforth4.display_name());
            assert!(reason.contains("history"), "{reason}");
        }
        other => panic!("expected illegal model, got {other:?}"),
    }
    assert_eq!(model.writes_after_fault, 0);
}

/// Registers states from slices whose lengths disagree.
struct Mismatched {
    handles: Vec<StateHandle>,
}

impl Model for Mismatched {
    fn evaluate(&mut self, _t: f64, ctx: &mut StepContext) -> SimResult<()> {
        ctx.register_state_slice(&self.handles, &[1.0, 2.0], &[0.0], None);
        Ok(())
    }

    fn set_state(&mut self, _handle: StateHandle, _value: f64) {
        panic!("no state may be written after a registration fault");
    }
}

#[test]
fn slice_length_mismatch_is_illegal() {
    let mut alloc = HandleAllocator::new();
    let mut model = Mismatched {
        handles: alloc.states(2).unwrap(),
    };
    let mut integ = Integrator::with_method(Method::Rk4).unwrap();
    let (time, reason) = expect_illegal(integ.step(&mut model, 0.0, 0.1).unwrap_err());
    assert_eq!(time, 0.0);
    assert!(reason.contains("derivatives"), "{reason}");
}

/// Fails on its second evaluation.
struct Failing {
    inner: Decay,
    evals: usize,
}

impl Model for Failing {
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
        self.evals += 1;
        if self.evals == 2 {
            return Err(SimError::model("property table out of range"));
        }
        self.inner.evaluate(t, ctx)
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        self.inner.set_state(handle, value);
    }
}

#[test]
fn model_errors_propagate_unchanged() {
    let mut integ = Integrator::with_method(Method::Rk4).unwrap();
    let mut model = Failing {
        inner: Decay::new(1.0, 1.0),
        evals: 0,
    };
    let err = integ.step(&mut model, 0.0, 0.1).unwrap_err();
    assert_eq!(err, SimError::model("property table out of range"));
    assert!(model.inner.steps.is_empty());
}
