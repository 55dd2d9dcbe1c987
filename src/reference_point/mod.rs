//! Reference point tracking
//!
//! Sibling pipeline to the visit engine for fixed reference points: every
//! position sample upserts the current snapshot and appends an immutable
//! history row in one transaction. There is no state machine; every sample
//! is valid, subject only to the point existing (policy-checked the same way
//! as zone registration).

use crate::infrastructure::database::{entities, Database};
use crate::infrastructure::events::{Event, EventBus};
use crate::registry::RegistrationPolicy;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ReferencePointError {
    /// Sample for a point the policy does not auto-register
    #[error("Unknown reference point {ref_id} at site {site_id}")]
    UnknownReferencePoint { site_id: String, ref_id: String },

    /// Administrative upsert carried no coordinate at all
    #[error("At least one of x, y, z is required")]
    MissingCoordinates,

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// One inbound position report for a reference point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub site_id: String,
    pub ref_id: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub source: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Reference point fields accepted from administrative upserts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePointUpsert {
    pub site_id: String,
    pub ref_id: String,
    pub display_name: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub source: Option<String>,
}

/// Snapshot-plus-history tracker for fixed reference points
pub struct ReferencePointTracker {
    db: Arc<Database>,
    events: Arc<EventBus>,
    policy: RegistrationPolicy,
}

impl ReferencePointTracker {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>, policy: RegistrationPolicy) -> Self {
        Self { db, events, policy }
    }

    /// Apply one position sample: upsert the snapshot, append a history row.
    pub async fn apply_sample(&self, sample: &PositionSample) -> Result<(), ReferencePointError> {
        let txn = self.db.conn().begin().await?;

        match self.policy {
            RegistrationPolicy::AutoRegister => {
                let point = entities::ReferencePointActive {
                    site_id: Set(sample.site_id.clone()),
                    ref_id: Set(sample.ref_id.clone()),
                    display_name: Set(sample.ref_id.clone()),
                    updated_at: Set(sample.observed_at),
                    ..Default::default()
                };
                entities::ReferencePoint::insert(point)
                    .on_conflict(
                        OnConflict::columns([
                            entities::reference_point::Column::SiteId,
                            entities::reference_point::Column::RefId,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .exec_without_returning(&txn)
                    .await?;
            }
            RegistrationPolicy::RequireExisting => {
                if find_reference_point(&txn, &sample.site_id, &sample.ref_id)
                    .await?
                    .is_none()
                {
                    return Err(ReferencePointError::UnknownReferencePoint {
                        site_id: sample.site_id.clone(),
                        ref_id: sample.ref_id.clone(),
                    });
                }
            }
        }

        entities::ReferencePoint::update_many()
            .col_expr(entities::reference_point::Column::X, Expr::value(sample.x))
            .col_expr(entities::reference_point::Column::Y, Expr::value(sample.y))
            .col_expr(entities::reference_point::Column::Z, Expr::value(sample.z))
            .col_expr(
                entities::reference_point::Column::Source,
                Expr::value(sample.source.clone()),
            )
            .col_expr(
                entities::reference_point::Column::UpdatedAt,
                Expr::value(sample.observed_at),
            )
            .filter(entities::reference_point::Column::SiteId.eq(&sample.site_id))
            .filter(entities::reference_point::Column::RefId.eq(&sample.ref_id))
            .exec(&txn)
            .await?;

        let history = entities::ReferencePointSampleActive {
            site_id: Set(sample.site_id.clone()),
            ref_id: Set(sample.ref_id.clone()),
            x: Set(sample.x),
            y: Set(sample.y),
            z: Set(sample.z),
            source: Set(sample.source.clone()),
            observed_at: Set(sample.observed_at),
            ..Default::default()
        };
        history.insert(&txn).await?;

        txn.commit().await?;

        debug!(
            site = %sample.site_id,
            ref_id = %sample.ref_id,
            "applied reference point sample"
        );
        self.events.emit(Event::ReferencePointUpdated {
            site_id: sample.site_id.clone(),
            ref_id: sample.ref_id.clone(),
            observed_at: sample.observed_at,
        });
        Ok(())
    }

    /// Administrative create-or-replace of a reference point. Requires at
    /// least one coordinate and records the change in the history as well.
    pub async fn upsert(&self, upsert: ReferencePointUpsert) -> Result<(), ReferencePointError> {
        if upsert.x.is_none() && upsert.y.is_none() && upsert.z.is_none() {
            return Err(ReferencePointError::MissingCoordinates);
        }

        let now = Utc::now();
        let txn = self.db.conn().begin().await?;

        let active = entities::ReferencePointActive {
            site_id: Set(upsert.site_id.clone()),
            ref_id: Set(upsert.ref_id.clone()),
            display_name: Set(upsert.display_name),
            x: Set(upsert.x),
            y: Set(upsert.y),
            z: Set(upsert.z),
            source: Set(upsert.source.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        entities::ReferencePoint::insert(active)
            .on_conflict(
                OnConflict::columns([
                    entities::reference_point::Column::SiteId,
                    entities::reference_point::Column::RefId,
                ])
                .update_columns([
                    entities::reference_point::Column::DisplayName,
                    entities::reference_point::Column::X,
                    entities::reference_point::Column::Y,
                    entities::reference_point::Column::Z,
                    entities::reference_point::Column::Source,
                    entities::reference_point::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        let history = entities::ReferencePointSampleActive {
            site_id: Set(upsert.site_id),
            ref_id: Set(upsert.ref_id),
            x: Set(upsert.x),
            y: Set(upsert.y),
            z: Set(upsert.z),
            source: Set(upsert.source),
            observed_at: Set(now),
            ..Default::default()
        };
        history.insert(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    /// Sample history for one point, newest first
    pub async fn history(
        &self,
        site_id: &str,
        ref_id: &str,
        limit: u64,
    ) -> Result<Vec<entities::reference_point_sample::Model>, ReferencePointError> {
        if find_reference_point(self.db.conn(), site_id, ref_id)
            .await?
            .is_none()
        {
            return Err(ReferencePointError::UnknownReferencePoint {
                site_id: site_id.to_string(),
                ref_id: ref_id.to_string(),
            });
        }

        Ok(entities::ReferencePointSample::find()
            .filter(entities::reference_point_sample::Column::SiteId.eq(site_id))
            .filter(entities::reference_point_sample::Column::RefId.eq(ref_id))
            .order_by_desc(entities::reference_point_sample::Column::ObservedAt)
            .limit(limit)
            .all(self.db.conn())
            .await?)
    }

    /// All reference point snapshots for a site, ordered by ref id
    pub async fn list(
        &self,
        site_id: &str,
    ) -> Result<Vec<entities::reference_point::Model>, ReferencePointError> {
        Ok(entities::ReferencePoint::find()
            .filter(entities::reference_point::Column::SiteId.eq(site_id))
            .order_by_asc(entities::reference_point::Column::RefId)
            .all(self.db.conn())
            .await?)
    }

    /// Current snapshot for one point
    pub async fn get(
        &self,
        site_id: &str,
        ref_id: &str,
    ) -> Result<Option<entities::reference_point::Model>, ReferencePointError> {
        find_reference_point(self.db.conn(), site_id, ref_id).await
    }
}

async fn find_reference_point<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
    ref_id: &str,
) -> Result<Option<entities::reference_point::Model>, ReferencePointError> {
    Ok(entities::ReferencePoint::find()
        .filter(entities::reference_point::Column::SiteId.eq(site_id))
        .filter(entities::reference_point::Column::RefId.eq(ref_id))
        .one(conn)
        .await?)
}
