//! Observation - one normalized device-location report
//!
//! An observation is transient input: it is consumed by the visit engine to
//! drive at most one state transition and is never persisted as its own
//! entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A canonical device-location report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Site the device belongs to
    pub site_id: String,

    /// Device that was observed
    pub device_id: String,

    /// Zone the device was observed in
    pub zone_id: String,

    /// Event time. Taken from the payload when present, otherwise the time of
    /// ingestion. All ordering decisions in the visit engine compare this
    /// value, never wall-clock arrival time.
    pub timestamp: DateTime<Utc>,
}
