//! Explicit time integration for models that register their states through
//! a step context.
//!
//! Provides:
//! - Butcher tableau catalog from forward Euler to Dormand-Prince 8(7)
//! - Adaptive step-size control (Press and Gustafsson PI laws)
//! - Adams-Bashforth 4 / Adams-Moulton 4 multistep with RK4 bootstrap
//! - Backward-difference differentiation of derived quantities
//! - Cycle scheduling with exact landing, cancellation and real-time pacing
//! - Recorded runs over a time span

pub mod adaptive;
pub mod config;
pub mod differentiate;
pub mod error;
pub mod integrator;
pub mod model;
pub mod multistep;
pub mod registry;
pub mod sim;
pub mod tableau;

// Engine internals
mod schedule;
mod step;

// Re-exports for public API
pub use adaptive::{Gustafsson, INIT_STEPS, Press, StepSizeLaw};
pub use config::{ControllerLaw, ControllerTuning, DerivativeOrder, IntegratorConfig, MinStepPolicy};
pub use error::{SimError, SimResult};
pub use integrator::{Integrator, IntegratorStats};
pub use model::{Model, StepOutcome};
pub use registry::{DerivedEntry, StateEntry, StepContext};
pub use sim::{RunOptions, SimProgress, SimRecord, run, run_with_progress};
pub use tableau::{ButcherTableau, Method};
pub use ti_core::{DerivedHandle, ErrorHandle, HandleAllocator, StateHandle};
