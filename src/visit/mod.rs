//! Visit tracking: the state engine, the read-time staleness view, and the
//! aggregate queries consumed by downstream readers.

pub mod engine;
pub mod queries;
pub mod staleness;

pub use engine::{ApplyOutcome, EngineError, RetryConfig, VisitEngine};
pub use staleness::{is_stale, VisitView};
