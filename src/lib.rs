//! zonetrack-core
//!
//! Ingests a stream of device-location reports and turns it into an auditable
//! history of time-bounded visits. The transactional store owns all state;
//! the visit engine guarantees that each device has at most one open visit at
//! any instant, tolerating duplicate and out-of-order delivery from competing
//! workers. Staleness of an open visit is a read-time judgment that never
//! touches the audit log.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod observation;
pub mod reference_point;
pub mod registry;
pub mod services;
pub mod visit;

use crate::config::AppConfig;
use crate::infrastructure::database::Database;
use crate::infrastructure::events::{Event, EventBus};
use crate::reference_point::ReferencePointTracker;
use crate::services::ingest::{IngestService, MessageSource};
use crate::services::Service;
use crate::visit::{RetryConfig, VisitEngine};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// The main context for all tracker operations
pub struct Core {
    /// Application configuration
    config: Arc<RwLock<AppConfig>>,

    /// Shared transactional store
    pub db: Arc<Database>,

    /// Event bus for state changes
    pub events: Arc<EventBus>,

    /// Visit state engine
    pub visits: Arc<VisitEngine>,

    /// Reference point tracker
    pub reference_points: Arc<ReferencePointTracker>,

    /// Running ingest worker pool, if any
    ingest: RwLock<Option<Arc<IngestService>>>,
}

impl Core {
    /// Initialize a new Core instance with the default data directory
    pub async fn new() -> Result<Self> {
        let data_dir = config::default_data_dir()?;
        Self::new_with_config(data_dir).await
    }

    /// Initialize a new Core instance with a custom data directory
    pub async fn new_with_config(data_dir: PathBuf) -> Result<Self> {
        info!("Initializing zonetrack core at {:?}", data_dir);

        let config = AppConfig::load_or_create(&data_dir)?;

        let db = Arc::new(Database::open_or_create(&config.database_path()).await?);
        db.migrate().await?;

        let events = Arc::new(EventBus::default());

        let retry = RetryConfig {
            max_attempts: config.ingest.max_attempts,
            initial_backoff_ms: config.ingest.initial_backoff_ms,
            max_backoff_ms: config.ingest.max_backoff_ms,
        };
        let visits = Arc::new(VisitEngine::new(
            db.clone(),
            events.clone(),
            config.registration,
            retry,
        ));

        let reference_points = Arc::new(ReferencePointTracker::new(
            db.clone(),
            events.clone(),
            config.registration.reference_points,
        ));

        events.emit(Event::CoreStarted);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            db,
            events,
            visits,
            reference_points,
            ingest: RwLock::new(None),
        })
    }

    /// Get the application configuration
    pub fn config(&self) -> Arc<RwLock<AppConfig>> {
        self.config.clone()
    }

    /// Start the ingest worker pool against a message source
    pub async fn start_ingest(&self, source: Arc<dyn MessageSource>) -> Result<Arc<IngestService>> {
        let config = self.config.read().await;
        let service = Arc::new(IngestService::new(
            self.visits.clone(),
            source,
            self.events.clone(),
            config.default_site.clone(),
            config.ingest.workers,
        ));
        drop(config);

        service.start().await?;
        *self.ingest.write().await = Some(service.clone());
        Ok(service)
    }

    /// Shutdown the core gracefully
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down zonetrack core");

        if let Some(service) = self.ingest.write().await.take() {
            service.stop().await?;
        }

        self.config.write().await.save()?;
        self.events.emit(Event::CoreShutdown);

        info!("Shutdown complete");
        Ok(())
    }
}
