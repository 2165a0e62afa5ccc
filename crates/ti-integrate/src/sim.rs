//! Run recorder: drives an integrator over a time span and records frames.

use ti_core::numeric::landing_tolerance;

use crate::error::{SimError, SimResult};
use crate::integrator::{Integrator, IntegratorStats};
use crate::model::Model;

/// Options for recorded runs.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RunOptions {
    /// Start time (seconds)
    pub t_start: f64,
    /// Final time (seconds)
    pub t_end: f64,
    /// Recording interval; each frame is one `cycle` (seconds)
    pub frame: f64,
    /// Maximum number of frames (safety limit)
    pub max_frames: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1.0,
            frame: 0.01,
            max_frames: 1_000_000,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.t_start.is_finite() && self.t_end.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "run bounds must be finite",
            });
        }
        if self.t_end < self.t_start {
            return Err(SimError::InvalidArg {
                what: "t_end must not precede t_start",
            });
        }
        if !(self.frame.is_finite() && self.frame > 0.0) {
            return Err(SimError::InvalidArg {
                what: "frame must be positive",
            });
        }
        if self.max_frames == 0 {
            return Err(SimError::InvalidArg {
                what: "max_frames must be positive",
            });
        }
        Ok(())
    }
}

/// Record of simulation results.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SimRecord<S> {
    /// Time points (seconds)
    pub t: Vec<f64>,
    /// Observed snapshots, one per time point
    pub x: Vec<S>,
}

impl<S> SimRecord<S> {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn last(&self) -> Option<(f64, &S)> {
        Some((*self.t.last()?, self.x.last()?))
    }

    fn push(&mut self, t: f64, x: S) {
        self.t.push(t);
        self.x.push(x);
    }
}

/// Progress report passed to the callback after every frame.
#[derive(Clone, Debug)]
pub struct SimProgress {
    pub t: f64,
    pub t_end: f64,
    pub frame: usize,
    pub stats: IntegratorStats,
}

impl SimProgress {
    /// Completed fraction of the run in `[0, 1]`.
    pub fn fraction(&self, t_start: f64) -> f64 {
        let span = self.t_end - t_start;
        if span <= 0.0 {
            1.0
        } else {
            ((self.t - t_start) / span).clamp(0.0, 1.0)
        }
    }
}

/// Run `model` from `t_start` to `t_end`, recording `observe(model)` at the
/// start and after every frame.
pub fn run<M, S, F>(
    integrator: &mut Integrator,
    model: &mut M,
    opts: &RunOptions,
    observe: F,
) -> SimResult<SimRecord<S>>
where
    M: Model,
    F: FnMut(&M) -> S,
{
    run_with_progress(integrator, model, opts, observe, |_| {})
}

/// [`run`] with a progress callback invoked after every frame.
pub fn run_with_progress<M, S, F, P>(
    integrator: &mut Integrator,
    model: &mut M,
    opts: &RunOptions,
    mut observe: F,
    mut progress: P,
) -> SimResult<SimRecord<S>>
where
    M: Model,
    F: FnMut(&M) -> S,
    P: FnMut(&SimProgress),
{
    opts.validate()?;
    tracing::info!(
        method = %integrator.method(),
        t_start = opts.t_start,
        t_end = opts.t_end,
        frame = opts.frame,
        "run started"
    );

    let mut record = SimRecord {
        t: Vec::new(),
        x: Vec::new(),
    };
    record.push(opts.t_start, observe(model));

    let tol = landing_tolerance(opts.t_end);
    let mut t = opts.t_start;
    let mut frame = 0;
    while opts.t_end - t > tol {
        if frame == opts.max_frames {
            tracing::warn!(time = t, frames = frame, "frame limit reached before t_end");
            break;
        }
        let span = opts.frame.min(opts.t_end - t);
        t = integrator.cycle(model, t, span)?;
        frame += 1;
        record.push(t, observe(model));
        progress(&SimProgress {
            t,
            t_end: opts.t_end,
            frame,
            stats: integrator.stats().clone(),
        });
    }

    let stats = integrator.stats();
    tracing::info!(
        time = t,
        frames = frame,
        accepted = stats.accepted_steps,
        rejected = stats.rejected_steps,
        evaluations = stats.evaluations,
        "run finished"
    );
    Ok(record)
}
