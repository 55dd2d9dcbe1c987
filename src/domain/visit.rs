//! Visit state machine
//!
//! The per-(site, device) timeline is a two-state machine: either no visit is
//! open, or exactly one is. The transition function is pure; the engine reads
//! the current state inside a transaction, asks `Transition::decide`, and
//! applies the resulting row mutations. The store-level unique index on open
//! visits is a last-resort safety net, not the specification of the machine.

use crate::domain::Observation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current visit state of one `(site, device)` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitState {
    /// No visit row with a null end time exists
    NoOpenVisit,

    /// Exactly one open visit row exists
    OpenVisit {
        zone_id: String,
        start_time: DateTime<Utc>,
    },
}

/// What applying one observation to the current state must do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No open visit: insert a new open visit at the observation time
    OpenFirst,

    /// Same zone, not older than the visit start: no visit mutation, bump the
    /// device's `last_seen` only
    KeepAlive,

    /// Different zone, not older than the visit start: close the open visit
    /// at the observation time and open a new one atomically
    CloseAndOpen,

    /// Observation older than the open visit's start: drop it, mutate nothing
    DiscardOutOfOrder,
}

impl Transition {
    /// Decide the transition for `obs` given the current state.
    ///
    /// Only the live open-visit row is ever compared against; a late
    /// observation naming a previously closed zone is an ordinary zone change
    /// (or keep-alive), never a reason to resurrect a closed visit.
    pub fn decide(state: &VisitState, obs: &Observation) -> Transition {
        match state {
            VisitState::NoOpenVisit => Transition::OpenFirst,
            VisitState::OpenVisit { start_time, .. } if obs.timestamp < *start_time => {
                Transition::DiscardOutOfOrder
            }
            VisitState::OpenVisit { zone_id, .. } if *zone_id == obs.zone_id => {
                Transition::KeepAlive
            }
            VisitState::OpenVisit { .. } => Transition::CloseAndOpen,
        }
    }
}
