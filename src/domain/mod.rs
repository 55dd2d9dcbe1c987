//! Pure domain types
//!
//! These carry no persistence concerns; the modules at the crate root apply
//! them against the store.

pub mod observation;
pub mod visit;

pub use observation::Observation;
pub use visit::{Transition, VisitState};
