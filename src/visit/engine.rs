//! Visit state engine
//!
//! Applies one observation to one device's visit timeline inside a single
//! transaction. Workers compete for messages without sticky per-device
//! assignment, so the store is the only serialization point: the engine takes
//! the optimistic path, inserting open visits under the partial unique index
//! and treating a constraint violation as a lost race. The loser re-reads the
//! now-current state and retries the whole transition, which converges because
//! applying the same observation twice is a no-op beyond the `last_seen` bump.

use crate::domain::{Observation, Transition, VisitState};
use crate::infrastructure::database::{entities, Database};
use crate::infrastructure::events::{Event, EventBus};
use crate::registry::{self, RegistrationConfig, RegistryError};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Visit engine errors surfaced to callers
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Terminal per-message: the referenced device or zone is not registered
    /// and the policy forbids auto-registration
    #[error(transparent)]
    Registry(RegistryError),

    /// Transient store failure that survived the retry budget. The message
    /// must stay unacknowledged; redelivery is the recovery path.
    #[error("Store unavailable after {attempts} attempts: {last_error}")]
    StoreUnavailable { attempts: u32, last_error: String },
}

/// Outcome of one applied observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No visit was open; a new one starts at the observation time
    Opened { zone_id: String },

    /// Same zone as the open visit: only `last_seen` moved
    KeptAlive,

    /// Zone change: the prior visit closed and a new one opened atomically
    Transitioned {
        from_zone: String,
        to_zone: String,
        closed_duration_seconds: i64,
    },

    /// Observation predates the open visit's start; nothing changed
    DiscardedOutOfOrder,
}

/// Bounded-backoff retry settings for one apply operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 25,
            max_backoff_ms: 1000,
        }
    }
}

/// Per-attempt failure classification
enum AttemptError {
    /// Policy rejection; retrying cannot help
    Terminal(EngineError),

    /// Another worker won the open-visit race; re-read and retry immediately
    RaceLost,

    /// Store hiccup; retry after backoff
    Transient(DbErr),
}

fn classify_db_err(err: DbErr) -> AttemptError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        AttemptError::RaceLost
    } else {
        AttemptError::Transient(err)
    }
}

/// The transactional visit state machine for all `(site, device)` keys
pub struct VisitEngine {
    db: Arc<Database>,
    events: Arc<EventBus>,
    registration: RegistrationConfig,
    retry: RetryConfig,
}

impl VisitEngine {
    pub fn new(
        db: Arc<Database>,
        events: Arc<EventBus>,
        registration: RegistrationConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            db,
            events,
            registration,
            retry,
        }
    }

    /// Apply one observation to the device's timeline.
    ///
    /// Retries lost races and transient store failures up to the configured
    /// budget; each attempt re-derives its transition from current store
    /// state, so reprocessing after any failure is safe. Events are emitted
    /// only after the transaction committed.
    pub async fn apply(&self, obs: &Observation) -> Result<ApplyOutcome, EngineError> {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            match self.try_apply(obs).await {
                Ok((outcome, events)) => {
                    debug!(
                        site = %obs.site_id,
                        device = %obs.device_id,
                        zone = %obs.zone_id,
                        ?outcome,
                        "applied observation"
                    );
                    for event in events {
                        self.events.emit(event);
                    }
                    return Ok(outcome);
                }
                Err(AttemptError::Terminal(err)) => return Err(err),
                Err(AttemptError::RaceLost) => {
                    // The winner has committed; an immediate re-read very
                    // likely turns this into a keep-alive.
                    debug!(
                        site = %obs.site_id,
                        device = %obs.device_id,
                        attempt,
                        "lost open-visit race, re-reading current state"
                    );
                    last_error = "lost open-visit race".to_string();
                }
                Err(AttemptError::Transient(err)) => {
                    last_error = err.to_string();
                    if attempt < self.retry.max_attempts {
                        let delay = backoff
                            .next_backoff()
                            .unwrap_or(Duration::from_millis(self.retry.max_backoff_ms));
                        warn!(
                            site = %obs.site_id,
                            device = %obs.device_id,
                            attempt,
                            error = %last_error,
                            "transient store error, retrying in {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(EngineError::StoreUnavailable {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }

    /// One transactional attempt. Returns the outcome plus the events to emit
    /// once the caller sees the commit succeed.
    async fn try_apply(
        &self,
        obs: &Observation,
    ) -> Result<(ApplyOutcome, Vec<Event>), AttemptError> {
        let txn = self
            .db
            .conn()
            .begin()
            .await
            .map_err(AttemptError::Transient)?;

        registry::ensure_registered(
            &txn,
            &self.registration,
            &obs.site_id,
            &obs.device_id,
            &obs.zone_id,
            obs.timestamp,
        )
        .await
        .map_err(|err| match err {
            RegistryError::Database(db) => classify_db_err(db),
            terminal => AttemptError::Terminal(EngineError::Registry(terminal)),
        })?;

        let open = entities::Visit::find()
            .filter(entities::visit::Column::SiteId.eq(&obs.site_id))
            .filter(entities::visit::Column::DeviceId.eq(&obs.device_id))
            .filter(entities::visit::Column::EndTime.is_null())
            .order_by_desc(entities::visit::Column::StartTime)
            .one(&txn)
            .await
            .map_err(classify_db_err)?;

        let state = match &open {
            None => VisitState::NoOpenVisit,
            Some(row) => VisitState::OpenVisit {
                zone_id: row.zone_id.clone(),
                start_time: row.start_time,
            },
        };

        match Transition::decide(&state, obs) {
            Transition::OpenFirst => {
                self.insert_open_visit(&txn, obs).await?;
                self.bump_last_seen(&txn, obs).await?;
                txn.commit().await.map_err(classify_db_err)?;
                Ok((
                    ApplyOutcome::Opened {
                        zone_id: obs.zone_id.clone(),
                    },
                    vec![Event::VisitOpened {
                        site_id: obs.site_id.clone(),
                        device_id: obs.device_id.clone(),
                        zone_id: obs.zone_id.clone(),
                        start_time: obs.timestamp,
                    }],
                ))
            }
            Transition::KeepAlive => {
                self.bump_last_seen(&txn, obs).await?;
                txn.commit().await.map_err(classify_db_err)?;
                Ok((ApplyOutcome::KeptAlive, Vec::new()))
            }
            Transition::CloseAndOpen => {
                // decide() returns CloseAndOpen only for an open visit
                let Some(open_row) = open else {
                    return Err(AttemptError::Transient(DbErr::Custom(
                        "open visit vanished between read and transition".to_string(),
                    )));
                };
                let duration = (obs.timestamp - open_row.start_time).num_seconds().max(0);
                self.close_visit(&txn, &open_row, obs).await?;
                self.insert_open_visit(&txn, obs).await?;
                self.bump_last_seen(&txn, obs).await?;
                txn.commit().await.map_err(classify_db_err)?;
                Ok((
                    ApplyOutcome::Transitioned {
                        from_zone: open_row.zone_id.clone(),
                        to_zone: obs.zone_id.clone(),
                        closed_duration_seconds: duration,
                    },
                    vec![
                        Event::VisitClosed {
                            site_id: obs.site_id.clone(),
                            device_id: obs.device_id.clone(),
                            zone_id: open_row.zone_id.clone(),
                            start_time: open_row.start_time,
                            end_time: obs.timestamp,
                            duration_seconds: duration,
                        },
                        Event::VisitOpened {
                            site_id: obs.site_id.clone(),
                            device_id: obs.device_id.clone(),
                            zone_id: obs.zone_id.clone(),
                            start_time: obs.timestamp,
                        },
                    ],
                ))
            }
            Transition::DiscardOutOfOrder => {
                txn.rollback().await.map_err(AttemptError::Transient)?;
                Ok((
                    ApplyOutcome::DiscardedOutOfOrder,
                    vec![Event::ObservationDiscarded {
                        site_id: obs.site_id.clone(),
                        device_id: obs.device_id.clone(),
                        zone_id: obs.zone_id.clone(),
                        timestamp: obs.timestamp,
                    }],
                ))
            }
        }
    }

    /// Insert a fresh open visit. The partial unique index turns a concurrent
    /// double-open into a `RaceLost` here.
    async fn insert_open_visit(
        &self,
        txn: &DatabaseTransaction,
        obs: &Observation,
    ) -> Result<(), AttemptError> {
        let visit = entities::VisitActive {
            site_id: Set(obs.site_id.clone()),
            device_id: Set(obs.device_id.clone()),
            zone_id: Set(obs.zone_id.clone()),
            start_time: Set(obs.timestamp),
            end_time: Set(None),
            duration_seconds: Set(None),
            ..Default::default()
        };
        visit.insert(txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    /// Close the open visit at the observation time. Guarded on
    /// `end_time IS NULL` so a row another worker already closed counts as a
    /// lost race instead of a double close.
    async fn close_visit(
        &self,
        txn: &DatabaseTransaction,
        open_row: &entities::visit::Model,
        obs: &Observation,
    ) -> Result<(), AttemptError> {
        let duration = (obs.timestamp - open_row.start_time).num_seconds().max(0);
        let result = entities::Visit::update_many()
            .col_expr(entities::visit::Column::EndTime, Expr::value(obs.timestamp))
            .col_expr(
                entities::visit::Column::DurationSeconds,
                Expr::value(duration),
            )
            .filter(entities::visit::Column::Id.eq(open_row.id))
            .filter(entities::visit::Column::EndTime.is_null())
            .exec(txn)
            .await
            .map_err(classify_db_err)?;

        if result.rows_affected == 0 {
            return Err(AttemptError::RaceLost);
        }
        Ok(())
    }

    /// Move `last_seen` forward, never backwards; duplicate deliveries and
    /// keep-alives with stale timestamps affect nothing.
    async fn bump_last_seen(
        &self,
        txn: &DatabaseTransaction,
        obs: &Observation,
    ) -> Result<(), AttemptError> {
        entities::Device::update_many()
            .col_expr(
                entities::device::Column::LastSeen,
                Expr::value(obs.timestamp),
            )
            .filter(entities::device::Column::SiteId.eq(&obs.site_id))
            .filter(entities::device::Column::DeviceId.eq(&obs.device_id))
            .filter(entities::device::Column::LastSeen.lt(obs.timestamp))
            .exec(txn)
            .await
            .map_err(classify_db_err)?;
        Ok(())
    }
}
