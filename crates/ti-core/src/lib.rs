//! ti-core: stable foundation for the time-integration engine.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact non-zero IDs and the typed handles models register with)
//! - error (shared error types)
//! - timing (wall-clock timers for pacing and step statistics)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
