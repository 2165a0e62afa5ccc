//! Error types for integration operations.

use thiserror::Error;
use ti_core::CoreError;

/// Errors encountered while advancing a model.
///
/// Everything here is fatal for the run. A rejected adaptive step is not an
/// error; it is retried and reported through `Model::on_failed_step`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Illegal model at t={time} ({method}): {reason}")]
    IllegalModel {
        time: f64,
        method: &'static str,
        reason: String,
    },

    #[error("Step size underflow at t={time}: dt={step:e}")]
    StepUnderflow { time: f64, step: f64 },

    #[error(
        "User termination at t={time}: dt={step}, requested={requested}, bounds=[{min}, {max}]"
    )]
    UserTermination {
        time: f64,
        step: f64,
        requested: f64,
        min: f64,
        max: f64,
    },

    #[error("Model error: {message}")]
    Model { message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Convenience for model implementations reporting their own failures.
    pub fn model(message: impl Into<String>) -> Self {
        SimError::Model {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_message_carries_context() {
        let err = SimError::UserTermination {
            time: 1.5,
            step: 0.01,
            requested: 0.005,
            min: 1e-6,
            max: 0.1,
        };
        let msg = err.to_string();
        assert!(msg.contains("t=1.5"));
        assert!(msg.contains("requested=0.005"));
        assert!(msg.contains("[0.000001, 0.1]"));
    }

    #[test]
    fn core_errors_convert() {
        let err: SimError = CoreError::HandleOverflow { what: "state handles" }.into();
        assert!(matches!(err, SimError::Core(_)));
        assert!(err.to_string().contains("state handles"));
    }
}
