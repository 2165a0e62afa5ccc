//! Integrator configuration.

use ti_core::Tolerances;

use crate::error::{SimError, SimResult};
use crate::tableau::Method;

/// Step-size control law used by adaptive methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ControllerLaw {
    /// Error-proportional law, `weight * ratio^(-1/(order-1))`.
    Press,
    /// PI law reacting to the current and previous error ratio.
    #[default]
    Gustafsson,
}

/// Stencil used to differentiate registered derived quantities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum DerivativeOrder {
    /// Two points, exact for linear signals.
    #[default]
    TwoPoint,
    /// Three points, exact for quadratics.
    ThreePoint,
    /// Four points, exact for cubics.
    FourPoint,
}

impl DerivativeOrder {
    pub fn points(self) -> usize {
        match self {
            DerivativeOrder::TwoPoint => 2,
            DerivativeOrder::ThreePoint => 3,
            DerivativeOrder::FourPoint => 4,
        }
    }
}

/// What the adaptive controller does when contraction reaches the floor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum MinStepPolicy {
    /// Retry at `time_step_min` and accept the step once there.
    #[default]
    Clamp,
    /// Ignore the floor and keep contracting; fail once the step no longer
    /// advances time.
    Underflow,
}

/// Tuning constants of the adaptive controller.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerTuning {
    /// Safety weight applied by both laws.
    pub weight: f64,
    /// A step whose factor falls below this is rejected.
    pub accept_threshold: f64,
    /// Lower clamp on the step factor.
    pub step_factor_min: f64,
    /// Upper clamp on the step factor.
    pub step_factor_max: f64,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self {
            weight: 0.9,
            accept_threshold: 0.9,
            step_factor_min: 0.2,
            step_factor_max: 5.0,
        }
    }
}

/// Full integrator configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct IntegratorConfig {
    pub method: Method,
    pub derivative_order: DerivativeOrder,
    pub law: ControllerLaw,
    /// Step size at construction and after `reset` (seconds)
    pub time_step_init: f64,
    /// Lower bound on the internal step (seconds)
    pub time_step_min: f64,
    /// Upper bound on the internal step (seconds)
    pub time_step_max: f64,
    /// `abs` and `rel` error tolerances of the adaptive controller
    pub tolerances: Tolerances,
    pub tuning: ControllerTuning,
    pub min_step_policy: MinStepPolicy,
    /// Reuse the last stage of an accepted FSAL step as the next first stage.
    pub fsal_reuse: bool,
    /// Pace cycles against wall-clock time.
    pub real_time: bool,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            method: Method::default(),
            derivative_order: DerivativeOrder::default(),
            law: ControllerLaw::default(),
            time_step_init: 0.01,
            time_step_min: 1e-6,
            time_step_max: 1.0,
            tolerances: Tolerances {
                abs: 1e-9,
                rel: 1e-6,
            },
            tuning: ControllerTuning::default(),
            min_step_policy: MinStepPolicy::default(),
            fsal_reuse: false,
            real_time: false,
        }
    }
}

impl IntegratorConfig {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_law(mut self, law: ControllerLaw) -> Self {
        self.law = law;
        self
    }

    pub fn with_derivative_order(mut self, order: DerivativeOrder) -> Self {
        self.derivative_order = order;
        self
    }

    /// Set initial, minimum and maximum step sizes.
    pub fn with_steps(mut self, init: f64, min: f64, max: f64) -> Self {
        self.time_step_init = init;
        self.time_step_min = min;
        self.time_step_max = max;
        self
    }

    pub fn with_tolerances(mut self, rel: f64, abs: f64) -> Self {
        self.tolerances = Tolerances { abs, rel };
        self
    }

    pub fn with_tuning(mut self, tuning: ControllerTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_min_step_policy(mut self, policy: MinStepPolicy) -> Self {
        self.min_step_policy = policy;
        self
    }

    pub fn with_fsal_reuse(mut self, enabled: bool) -> Self {
        self.fsal_reuse = enabled;
        self
    }

    pub fn with_real_time(mut self, enabled: bool) -> Self {
        self.real_time = enabled;
        self
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if !positive(self.time_step_init) {
            return Err(SimError::InvalidArg {
                what: "time_step_init must be positive",
            });
        }
        if !positive(self.time_step_min) || !positive(self.time_step_max) {
            return Err(SimError::InvalidArg {
                what: "step bounds must be positive",
            });
        }
        if self.time_step_min > self.time_step_max {
            return Err(SimError::InvalidArg {
                what: "time_step_min must not exceed time_step_max",
            });
        }
        let tol = self.tolerances;
        if !(tol.abs >= 0.0 && tol.rel >= 0.0) || tol.abs + tol.rel == 0.0 {
            return Err(SimError::InvalidArg {
                what: "tolerances must be non-negative and not both zero",
            });
        }
        let tuning = self.tuning;
        if !positive(tuning.weight) {
            return Err(SimError::InvalidArg {
                what: "controller weight must be positive",
            });
        }
        if !positive(tuning.step_factor_min) || tuning.step_factor_min >= 1.0 {
            return Err(SimError::InvalidArg {
                what: "step_factor_min must lie in (0, 1)",
            });
        }
        if !(tuning.step_factor_max.is_finite() && tuning.step_factor_max > 1.0) {
            return Err(SimError::InvalidArg {
                what: "step_factor_max must exceed 1",
            });
        }
        if !(tuning.accept_threshold >= tuning.step_factor_min
            && tuning.accept_threshold <= tuning.step_factor_max)
        {
            return Err(SimError::InvalidArg {
                what: "accept_threshold must lie within the step factor bounds",
            });
        }
        Ok(())
    }

    /// Clamp `dt` into the configured step bounds.
    pub fn clamp_step(&self, dt: f64) -> f64 {
        dt.clamp(self.time_step_min, self.time_step_max)
    }
}
