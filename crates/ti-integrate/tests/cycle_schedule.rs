//! Cycle scheduling: exact landing, shortened final sub-steps, termination
//! and real-time pacing.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use common::Decay;
use ti_core::landing_tolerance;
use ti_integrate::{
    INIT_STEPS, Integrator, IntegratorConfig, Method, Model, SimError, SimResult, StateHandle,
    StepContext,
};

fn fixed(dt: f64) -> Integrator {
    let cfg = IntegratorConfig::new(Method::Rk4).with_steps(dt, 1e-6, 1.0);
    Integrator::new(cfg).unwrap()
}

#[test]
fn cycle_lands_on_the_end_time() {
    let mut integ = fixed(0.03);
    let mut model = Decay::new(1.0, 1.0);

    let t = integ.cycle(&mut model, 0.0, 1.0).unwrap();
    assert!((t - 1.0).abs() <= landing_tolerance(1.0), "t={t}");

    let (last, body) = model.steps.split_last().unwrap();
    assert_eq!(body.len(), 33);
    assert!(body.iter().all(|&(_, dt)| dt == 0.03));
    assert!((last.1 - 0.01).abs() < 1e-12, "final sub-step {}", last.1);
    assert_eq!(integ.time_step(), 0.03);
}

#[test]
fn cycle_lands_far_from_the_origin() {
    let mut integ = fixed(0.1);
    let mut model = Decay::new(1.0, 1.0);
    let t0 = 1000.0;

    let t = integ.cycle(&mut model, t0, 0.7).unwrap();
    let end = t0 + 0.7;
    assert!((t - end).abs() <= landing_tolerance(end), "t={t}");
    assert_eq!(model.steps.len(), 7);
}

#[test]
fn consecutive_cycles_continue_from_the_reached_time() {
    let mut integ = fixed(0.02);
    let mut model = Decay::new(1.0, 1.0);

    let mut t = 0.0;
    for _ in 0..10 {
        t = integ.cycle(&mut model, t, 0.1).unwrap();
    }
    assert!((t - 1.0).abs() < 1e-12);
    assert!((model.x - (-1.0_f64).exp()).abs() < 1e-9);
}

#[test]
fn shortened_sub_step_keeps_the_stored_step() {
    let cfg = IntegratorConfig::new(Method::Rk54CashKarp).with_tolerances(1e-3, 1e-6);
    let mut integ = Integrator::new(cfg).unwrap();
    let mut model = Decay::new(1.0, 1.0);
    let mut t = 0.0;
    for _ in 0..INIT_STEPS {
        t += integ.step(&mut model, t, 0.01).unwrap();
    }

    integ.set_time_step(0.05).unwrap();
    let done = integ.cycle_single_step(&mut model, t, 0.02).unwrap();
    assert_eq!(done, 0.02);
    assert_eq!(integ.time_step(), 0.05);

    // A full-size sub-step lets the controller grow the step.
    let done = integ.cycle_single_step(&mut model, t + 0.02, 1.0).unwrap();
    assert_eq!(done, 0.05);
    assert!(integ.time_step() > 0.05);
}

#[test]
fn termination_before_the_first_sub_step() {
    let mut integ = fixed(0.03);
    let mut model = Decay::new(1.0, 1.0);
    integ.termination_flag().store(true, Ordering::SeqCst);

    let err = integ.cycle(&mut model, 0.0, 1.0).unwrap_err();
    assert_eq!(
        err,
        SimError::UserTermination {
            time: 0.0,
            step: 0.03,
            requested: 1.0,
            min: 1e-6,
            max: 1.0,
        }
    );
    assert!(model.steps.is_empty());
    assert_eq!(model.x, 1.0);
}

/// Raises the termination flag after a number of completed steps.
struct StopAfter {
    inner: Decay,
    flag: Arc<AtomicBool>,
    after: usize,
}

impl Model for StopAfter {
    fn evaluate(&mut self, t: f64, ctx: &mut StepContext) -> SimResult<()> {
        self.inner.evaluate(t, ctx)
    }

    fn set_state(&mut self, handle: StateHandle, value: f64) {
        self.inner.set_state(handle, value);
    }

    fn post_step(&mut self, t: f64, dt: f64) -> SimResult<()> {
        self.inner.post_step(t, dt)?;
        if self.inner.steps.len() == self.after {
            self.flag.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
fn termination_between_sub_steps() {
    let mut integ = fixed(0.03);
    let flag = Arc::new(AtomicBool::new(false));
    integ.set_termination_flag(Arc::clone(&flag));
    let mut model = StopAfter {
        inner: Decay::new(1.0, 1.0),
        flag,
        after: 3,
    };

    let err = integ.cycle(&mut model, 0.0, 1.0).unwrap_err();
    match err {
        SimError::UserTermination { time, requested, .. } => {
            assert!((time - 0.09).abs() < 1e-12);
            assert_eq!(requested, 1.0);
        }
        other => panic!("expected termination, got {other:?}"),
    }
    assert_eq!(model.inner.steps.len(), 3);
}

#[test]
fn real_time_cycle_takes_at_least_its_duration() {
    let cfg = IntegratorConfig::new(Method::Euler)
        .with_steps(0.01, 1e-6, 1.0)
        .with_real_time(true);
    let mut integ = Integrator::new(cfg).unwrap();
    let mut model = Decay::new(1.0, 1.0);

    let start = Instant::now();
    integ.cycle(&mut model, 0.0, 0.05).unwrap();
    assert!(start.elapsed().as_secs_f64() >= 0.045);
}
