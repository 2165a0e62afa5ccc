//! Registration surface between the engine and a model's `evaluate`.
//!
//! A [`StepContext`] collects the entries of one evaluation. The engine then
//! folds them into its [`StateRegistry`], resolving identity by handle: the
//! first evaluation of a step fixes the handle set, and every later
//! evaluation of that step must register exactly the same set.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use ti_core::{DerivedHandle, ErrorHandle, StateHandle};

use crate::tableau::MAX_STAGES;

/// One registered state: current value and its time derivative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateEntry {
    pub handle: StateHandle,
    pub value: f64,
    pub derivative: f64,
    pub error: Option<ErrorHandle>,
}

/// One registered quantity to be differentiated numerically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedEntry {
    pub handle: DerivedHandle,
    pub value: f64,
}

/// Per-evaluation registration lists, handed to `Model::evaluate`.
#[derive(Debug, Default)]
pub struct StepContext {
    states: Vec<StateEntry>,
    derived: Vec<DerivedEntry>,
    fault: Option<String>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.states.clear();
        self.derived.clear();
        self.fault = None;
    }

    pub(crate) fn take_fault(&mut self) -> Option<String> {
        self.fault.take()
    }

    fn record_fault(&mut self, reason: String) {
        if self.fault.is_none() {
            self.fault = Some(reason);
        }
    }

    pub fn states(&self) -> &[StateEntry] {
        &self.states
    }

    pub fn derived(&self) -> &[DerivedEntry] {
        &self.derived
    }

    /// Register an integrated scalar state.
    pub fn register_state(&mut self, handle: StateHandle, value: f64, derivative: f64) {
        self.states.push(StateEntry {
            handle,
            value,
            derivative,
            error: None,
        });
    }

    /// Register a state whose local error estimate is written back to `error`.
    pub fn register_state_with_error(
        &mut self,
        handle: StateHandle,
        value: f64,
        derivative: f64,
        error: ErrorHandle,
    ) {
        self.states.push(StateEntry {
            handle,
            value,
            derivative,
            error: Some(error),
        });
    }

    /// Register a run of scalar states element by element.
    ///
    /// When `errors` is given but its length differs from `values`, the
    /// states are registered without error outputs.
    pub fn register_state_slice(
        &mut self,
        handles: &[StateHandle],
        values: &[f64],
        derivatives: &[f64],
        errors: Option<&[ErrorHandle]>,
    ) {
        if handles.len() != values.len() || derivatives.len() != values.len() {
            self.record_fault(format!(
                "state registration with {} handles, {} values and {} derivatives",
                handles.len(),
                values.len(),
                derivatives.len()
            ));
            return;
        }

        let errors = match errors {
            Some(errors) if errors.len() != values.len() => {
                tracing::debug!(
                    values = values.len(),
                    errors = errors.len(),
                    "error output length mismatch, registering without error outputs"
                );
                None
            }
            other => other,
        };

        for (i, ((&handle, &value), &derivative)) in
            handles.iter().zip(values).zip(derivatives).enumerate()
        {
            self.states.push(StateEntry {
                handle,
                value,
                derivative,
                error: errors.map(|e| e[i]),
            });
        }
    }

    pub fn register_state_vector(
        &mut self,
        handles: &[StateHandle],
        values: &DVector<f64>,
        derivatives: &DVector<f64>,
        errors: Option<&[ErrorHandle]>,
    ) {
        self.register_state_slice(handles, values.as_slice(), derivatives.as_slice(), errors);
    }

    /// Register a matrix-valued state in column-major element order.
    pub fn register_state_matrix(
        &mut self,
        handles: &[StateHandle],
        values: &DMatrix<f64>,
        derivatives: &DMatrix<f64>,
        errors: Option<&[ErrorHandle]>,
    ) {
        if values.shape() != derivatives.shape() {
            self.record_fault(format!(
                "matrix state registration with value shape {:?} and derivative shape {:?}",
                values.shape(),
                derivatives.shape()
            ));
            return;
        }
        self.register_state_slice(handles, values.as_slice(), derivatives.as_slice(), errors);
    }

    /// Register a quantity whose time derivative is computed numerically.
    pub fn register_derived(&mut self, handle: DerivedHandle, value: f64) {
        self.derived.push(DerivedEntry { handle, value });
    }

    pub fn register_derived_slice(&mut self, handles: &[DerivedHandle], values: &[f64]) {
        if handles.len() != values.len() {
            self.record_fault(format!(
                "derived registration with {} handles and {} values",
                handles.len(),
                values.len()
            ));
            return;
        }
        self.derived.extend(
            handles
                .iter()
                .zip(values)
                .map(|(&handle, &value)| DerivedEntry { handle, value }),
        );
    }

    pub fn register_derived_vector(&mut self, handles: &[DerivedHandle], values: &DVector<f64>) {
        self.register_derived_slice(handles, values.as_slice());
    }
}

/// Engine-side view of one state across the evaluations of a step.
#[derive(Clone, Debug)]
pub(crate) struct StateVariable {
    pub handle: StateHandle,
    pub error_out: Option<ErrorHandle>,
    /// Value at step start; restored on rejection.
    pub x0: f64,
    /// Latest value: registered, predicted or corrected.
    pub value: f64,
    /// Stage derivatives of the current step.
    pub k: [f64; MAX_STAGES],
    /// Stage-0 derivatives of earlier steps, newest first.
    pub history: [f64; 3],
    pub history_len: u8,
    /// Unnormalized local error estimate of the last attempt.
    pub local_error: f64,
}

impl StateVariable {
    fn new(entry: &StateEntry) -> Self {
        let mut k = [0.0; MAX_STAGES];
        k[0] = entry.derivative;
        Self {
            handle: entry.handle,
            error_out: entry.error,
            x0: entry.value,
            value: entry.value,
            k,
            history: [0.0; 3],
            history_len: 0,
            local_error: 0.0,
        }
    }

    /// `dt * sum_k row[k] * k_k`, the stage increment for coupling `row`.
    pub fn increment(&self, row: &[f64], dt: f64) -> f64 {
        dt * row.iter().zip(&self.k).map(|(a, k)| a * k).sum::<f64>()
    }

    /// Shift the current stage-0 derivative into the multistep history.
    pub fn push_history(&mut self) {
        self.history = [self.k[0], self.history[0], self.history[1]];
        self.history_len = (self.history_len + 1).min(3);
    }
}

/// States of the step in progress, indexed by handle.
#[derive(Debug, Default)]
pub(crate) struct StateRegistry {
    pub vars: Vec<StateVariable>,
    index: HashMap<StateHandle, usize>,
    seen: Vec<bool>,
}

impl StateRegistry {
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
        self.index.clear();
        self.seen.clear();
    }

    /// Start a step from the first evaluation's registrations.
    ///
    /// Multistep history follows each handle across steps.
    pub fn begin_step(&mut self, entries: &[StateEntry]) -> Result<(), String> {
        let same_layout = entries.len() == self.vars.len()
            && entries.iter().zip(&self.vars).all(|(e, v)| e.handle == v.handle);

        if same_layout {
            for (entry, var) in entries.iter().zip(self.vars.iter_mut()) {
                var.x0 = entry.value;
                var.value = entry.value;
                var.k[0] = entry.derivative;
                var.error_out = entry.error;
            }
            return Ok(());
        }

        let mut previous: HashMap<StateHandle, ([f64; 3], u8)> = self
            .vars
            .drain(..)
            .map(|v| (v.handle, (v.history, v.history_len)))
            .collect();
        self.index.clear();

        for (i, entry) in entries.iter().enumerate() {
            if self.index.insert(entry.handle, i).is_some() {
                return Err(format!("state {} registered twice", entry.handle));
            }
            let mut var = StateVariable::new(entry);
            if let Some((history, len)) = previous.remove(&entry.handle) {
                var.history = history;
                var.history_len = len;
            }
            self.vars.push(var);
        }
        self.seen = vec![false; self.vars.len()];
        Ok(())
    }

    /// Fold a later evaluation of the same step into stage slot `stage`.
    pub fn absorb(&mut self, entries: &[StateEntry], stage: usize) -> Result<(), String> {
        if entries.len() != self.vars.len() {
            return Err(format!(
                "stage {} registered {} states, step start registered {}",
                stage,
                entries.len(),
                self.vars.len()
            ));
        }

        self.seen.iter_mut().for_each(|s| *s = false);
        for entry in entries {
            let Some(&i) = self.index.get(&entry.handle) else {
                return Err(format!(
                    "stage {} registered unknown state {}",
                    stage, entry.handle
                ));
            };
            if std::mem::replace(&mut self.seen[i], true) {
                return Err(format!(
                    "stage {} registered state {} twice",
                    stage, entry.handle
                ));
            }
            let var = &mut self.vars[i];
            var.value = entry.value;
            var.k[stage] = entry.derivative;
        }
        Ok(())
    }
}
