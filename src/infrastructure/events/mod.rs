//! Event bus for decoupled communication
//!
//! Events describe committed state only; they are emitted after the owning
//! transaction has committed, never before.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Tracker events
#[derive(Debug, Clone)]
pub enum Event {
    /// Core has started
    CoreStarted,

    /// Core is shutting down
    CoreShutdown,

    /// The ingest worker pool started
    IngestStarted { workers: usize },

    /// The ingest worker pool stopped
    IngestStopped,

    /// A device entered a zone with no prior open visit
    VisitOpened {
        site_id: String,
        device_id: String,
        zone_id: String,
        start_time: DateTime<Utc>,
    },

    /// A zone change closed the prior visit
    VisitClosed {
        site_id: String,
        device_id: String,
        zone_id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration_seconds: i64,
    },

    /// An out-of-order observation was discarded without mutation
    ObservationDiscarded {
        site_id: String,
        device_id: String,
        zone_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A reference point snapshot was updated and a sample appended
    ReferencePointUpdated {
        site_id: String,
        ref_id: String,
        observed_at: DateTime<Utc>,
    },
}

/// Event bus for broadcasting events
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: Event) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
