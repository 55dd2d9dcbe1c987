//! Ingest worker pool
//!
//! Competing consumers over one shared message source: the broker assigns
//! each message to exactly one worker, assignment is not sticky per device,
//! and every cross-worker coordination requirement lives in the store (see
//! the visit engine). A worker acknowledges a delivery strictly after its
//! transaction committed; terminal parse/policy failures are dead-lettered;
//! transient failures past the retry budget leave the delivery unresolved so
//! the broker delivers it again.

pub mod source;

use crate::infrastructure::events::{Event, EventBus};
use crate::observation::{normalize, NormalizeError};
use crate::services::Service;
use crate::visit::{ApplyOutcome, EngineError, VisitEngine};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use source::{ChannelSource, Delivery, MessageSource, Resolution};

/// Ingest worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Number of competing worker tasks
    pub workers: usize,
    /// Retry budget per observation (see `RetryConfig`)
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 8,
            initial_backoff_ms: 25,
            max_backoff_ms: 1000,
        }
    }
}

/// Ingestion health counters, visible to operational monitoring
#[derive(Debug, Default)]
pub struct IngestStats {
    /// Committed observations (opened, kept alive, or transitioned)
    pub applied: AtomicU64,
    /// Out-of-order observations discarded without mutation
    pub discarded: AtomicU64,
    /// Dead-lettered for malformed payloads or missing identifiers
    pub rejected_malformed: AtomicU64,
    /// Dead-lettered by registration policy
    pub rejected_unknown_entity: AtomicU64,
    /// Left unacknowledged after the retry budget; the broker redelivers
    pub failed_transient: AtomicU64,
}

/// Competing-consumer worker pool feeding the visit engine
pub struct IngestService {
    engine: Arc<VisitEngine>,
    source: Arc<dyn MessageSource>,
    events: Arc<EventBus>,
    default_site: Option<String>,
    workers: usize,
    stats: Arc<IngestStats>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestService {
    pub fn new(
        engine: Arc<VisitEngine>,
        source: Arc<dyn MessageSource>,
        events: Arc<EventBus>,
        default_site: Option<String>,
        workers: usize,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            source,
            events,
            default_site,
            workers: workers.max(1),
            stats: Arc::new(IngestStats::default()),
            running: AtomicBool::new(false),
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    /// Wait for all workers to finish (the source closed or stop was called)
    pub async fn join(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    async fn worker_loop(
        worker: usize,
        engine: Arc<VisitEngine>,
        source: Arc<dyn MessageSource>,
        default_site: Option<String>,
        stats: Arc<IngestStats>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let delivery = tokio::select! {
                _ = shutdown.changed() => break,
                delivery = source.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            Self::handle_delivery(&engine, default_site.as_deref(), &stats, delivery).await;
        }
        info!(worker, "ingest worker stopped");
    }

    async fn handle_delivery(
        engine: &VisitEngine,
        default_site: Option<&str>,
        stats: &IngestStats,
        delivery: Delivery,
    ) {
        let observation = match normalize(
            &delivery.routing_key,
            &delivery.payload,
            default_site,
            delivery.received_at,
        ) {
            Ok(observation) => observation,
            Err(err @ NormalizeError::Malformed(_)) => {
                warn!(routing_key = %delivery.routing_key, error = %err, "dropping malformed message");
                stats.rejected_malformed.fetch_add(1, Ordering::Relaxed);
                delivery.reject();
                return;
            }
            Err(err @ NormalizeError::MissingSite) => {
                warn!(routing_key = %delivery.routing_key, error = %err, "dropping message without site");
                stats.rejected_malformed.fetch_add(1, Ordering::Relaxed);
                delivery.reject();
                return;
            }
        };

        match engine.apply(&observation).await {
            Ok(ApplyOutcome::DiscardedOutOfOrder) => {
                stats.discarded.fetch_add(1, Ordering::Relaxed);
                delivery.ack();
            }
            Ok(_) => {
                stats.applied.fetch_add(1, Ordering::Relaxed);
                delivery.ack();
            }
            Err(err @ EngineError::Registry(_)) => {
                warn!(
                    site = %observation.site_id,
                    device = %observation.device_id,
                    error = %err,
                    "rejecting observation by registration policy"
                );
                stats.rejected_unknown_entity.fetch_add(1, Ordering::Relaxed);
                delivery.reject();
            }
            Err(err @ EngineError::StoreUnavailable { .. }) => {
                // Not acknowledged: the broker redelivers once the store
                // recovers.
                warn!(
                    site = %observation.site_id,
                    device = %observation.device_id,
                    error = %err,
                    "store unavailable, leaving message unacknowledged"
                );
                stats.failed_transient.fetch_add(1, Ordering::Relaxed);
                drop(delivery);
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for IngestService {
    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut handles = self.handles.lock().await;
        for worker in 0..self.workers {
            let engine = self.engine.clone();
            let source = self.source.clone();
            let default_site = self.default_site.clone();
            let stats = self.stats.clone();
            let shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(Self::worker_loop(
                worker,
                engine,
                source,
                default_site,
                stats,
                shutdown,
            )));
        }

        info!(workers = self.workers, "ingest service started");
        self.events.emit(Event::IngestStarted {
            workers: self.workers,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown.send(true);
        self.join().await;

        info!("ingest service stopped");
        self.events.emit(Event::IngestStopped);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
