//! Read queries over the visit relation
//!
//! The visit table is the durable contract: any reader may derive a device's
//! current zone (the open row) and full timeline (rows ordered by start time)
//! from it. These queries feed administrative and dashboard consumers.

use crate::infrastructure::database::entities;
use crate::visit::staleness::VisitView;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Device not found: {device_id} at site {site_id}")]
    DeviceNotFound { site_id: String, device_id: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Device header returned with its history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub site_id: String,
    pub device_id: String,
    pub device_name: String,
    pub last_seen: DateTime<Utc>,
    pub stale_threshold_minutes: i64,
}

/// A device's visit timeline, newest first, with staleness applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHistory {
    pub device: DeviceSummary,
    pub items: Vec<VisitView>,
}

/// Total closed dwell time per zone inside a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDwell {
    pub zone_id: String,
    pub zone_name: String,
    pub total_seconds: i64,
}

/// Observed zone-to-zone movement frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTransition {
    pub from_zone: String,
    pub to_zone: String,
    pub count: u64,
}

/// A device's visit history, newest first.
///
/// The staleness evaluator runs here, at read time; the stored rows are
/// returned as committed.
pub async fn device_history<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
    device_id: &str,
    limit: u64,
    stale_threshold_minutes: i64,
    now: DateTime<Utc>,
) -> Result<DeviceHistory, QueryError> {
    let device = entities::Device::find()
        .filter(entities::device::Column::SiteId.eq(site_id))
        .filter(entities::device::Column::DeviceId.eq(device_id))
        .one(conn)
        .await?
        .ok_or_else(|| QueryError::DeviceNotFound {
            site_id: site_id.to_string(),
            device_id: device_id.to_string(),
        })?;

    let visits = entities::Visit::find()
        .filter(entities::visit::Column::SiteId.eq(site_id))
        .filter(entities::visit::Column::DeviceId.eq(device_id))
        .order_by_desc(entities::visit::Column::StartTime)
        .limit(limit)
        .all(conn)
        .await?;

    let zone_names = zone_name_map(conn, site_id).await?;
    let items = visits
        .iter()
        .map(|visit| {
            let zone_name = zone_names
                .get(&visit.zone_id)
                .map(String::as_str)
                .unwrap_or(visit.zone_id.as_str());
            VisitView::project(
                visit,
                zone_name,
                device.last_seen,
                now,
                stale_threshold_minutes,
            )
        })
        .collect();

    Ok(DeviceHistory {
        device: DeviceSummary {
            site_id: device.site_id,
            device_id: device.device_id,
            device_name: device.device_name,
            last_seen: device.last_seen,
            stale_threshold_minutes,
        },
        items,
    })
}

/// Closed dwell per zone for visits that started inside the window, most
/// visited first
pub async fn most_visited<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
    window_hours: i64,
    now: DateTime<Utc>,
) -> Result<Vec<ZoneDwell>, QueryError> {
    let cutoff = now - Duration::hours(window_hours);
    let visits = entities::Visit::find()
        .filter(entities::visit::Column::SiteId.eq(site_id))
        .filter(entities::visit::Column::StartTime.gt(cutoff))
        .filter(entities::visit::Column::EndTime.is_not_null())
        .all(conn)
        .await?;

    let mut totals: HashMap<String, i64> = HashMap::new();
    for visit in visits {
        *totals.entry(visit.zone_id).or_default() += visit.duration_seconds.unwrap_or(0);
    }

    let zone_names = zone_name_map(conn, site_id).await?;
    let mut dwell: Vec<ZoneDwell> = totals
        .into_iter()
        .map(|(zone_id, total_seconds)| ZoneDwell {
            zone_name: zone_names.get(&zone_id).cloned().unwrap_or(zone_id.clone()),
            zone_id,
            total_seconds,
        })
        .collect();
    dwell.sort_by(|a, b| {
        b.total_seconds
            .cmp(&a.total_seconds)
            .then_with(|| a.zone_id.cmp(&b.zone_id))
    });
    Ok(dwell)
}

/// Zone-to-zone movement frequencies derived from per-device timelines,
/// most frequent first
pub async fn transitions<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
    limit: usize,
) -> Result<Vec<ZoneTransition>, QueryError> {
    let visits = entities::Visit::find()
        .filter(entities::visit::Column::SiteId.eq(site_id))
        .order_by_asc(entities::visit::Column::DeviceId)
        .order_by_asc(entities::visit::Column::StartTime)
        .all(conn)
        .await?;

    let mut counts: HashMap<(String, String), u64> = HashMap::new();
    let mut previous: Option<(String, String)> = None; // (device_id, zone_id)
    for visit in visits {
        if let Some((prev_device, prev_zone)) = &previous {
            if *prev_device == visit.device_id {
                *counts
                    .entry((prev_zone.clone(), visit.zone_id.clone()))
                    .or_default() += 1;
            }
        }
        previous = Some((visit.device_id, visit.zone_id));
    }

    let mut result: Vec<ZoneTransition> = counts
        .into_iter()
        .map(|((from_zone, to_zone), count)| ZoneTransition {
            from_zone,
            to_zone,
            count,
        })
        .collect();
    result.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.from_zone.cmp(&b.from_zone))
            .then_with(|| a.to_zone.cmp(&b.to_zone))
    });
    result.truncate(limit);
    Ok(result)
}

async fn zone_name_map<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
) -> Result<HashMap<String, String>, sea_orm::DbErr> {
    Ok(entities::Zone::find()
        .filter(entities::zone::Column::SiteId.eq(site_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|zone| (zone.zone_id, zone.zone_name))
        .collect())
}
