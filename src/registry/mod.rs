//! Device and zone registry
//!
//! The resolver guarantees that the device and zone an observation references
//! exist before the visit engine inserts rows pointing at them. Creation is a
//! race-safe upsert (insert-or-ignore keyed by identity), never a
//! check-then-insert pair: many competing workers may see the same unknown
//! device at once.

use crate::infrastructure::database::entities;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Observation referenced a zone the policy does not auto-register
    #[error("Unknown zone {zone_id} at site {site_id}")]
    UnknownZone { site_id: String, zone_id: String },

    /// Observation referenced a device the policy does not auto-register
    #[error("Unknown device {device_id} at site {site_id}")]
    UnknownDevice { site_id: String, device_id: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// What to do when an observation references an unregistered entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Create the entity on first sight
    AutoRegister,

    /// Reject the observation; registration is administrative-only
    RequireExisting,
}

/// Per-entity-kind registration policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub devices: RegistrationPolicy,
    pub zones: RegistrationPolicy,
    pub reference_points: RegistrationPolicy,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        // Devices show up on their own; zones are provisioned by operators
        Self {
            devices: RegistrationPolicy::AutoRegister,
            zones: RegistrationPolicy::RequireExisting,
            reference_points: RegistrationPolicy::AutoRegister,
        }
    }
}

/// Ensure the device and zone referenced by an observation exist.
///
/// Runs inside the visit engine's transaction so the foreign references hold
/// at its commit. Under `AutoRegister` a newly seen device is created with its
/// id as display name and `last_seen` at the observation time; the engine owns
/// all later `last_seen` updates.
pub async fn ensure_registered<C: ConnectionTrait>(
    conn: &C,
    config: &RegistrationConfig,
    site_id: &str,
    device_id: &str,
    zone_id: &str,
    observed_at: DateTime<Utc>,
) -> RegistryResult<()> {
    match config.devices {
        RegistrationPolicy::AutoRegister => {
            let device = entities::DeviceActive {
                site_id: Set(site_id.to_string()),
                device_id: Set(device_id.to_string()),
                device_name: Set(device_id.to_string()),
                last_seen: Set(observed_at),
                ..Default::default()
            };
            entities::Device::insert(device)
                .on_conflict(
                    OnConflict::columns([
                        entities::device::Column::SiteId,
                        entities::device::Column::DeviceId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await?;
        }
        RegistrationPolicy::RequireExisting => {
            if find_device(conn, site_id, device_id).await?.is_none() {
                return Err(RegistryError::UnknownDevice {
                    site_id: site_id.to_string(),
                    device_id: device_id.to_string(),
                });
            }
        }
    }

    match config.zones {
        RegistrationPolicy::AutoRegister => {
            let zone = entities::ZoneActive {
                site_id: Set(site_id.to_string()),
                zone_id: Set(zone_id.to_string()),
                zone_name: Set(zone_id.to_string()),
                ..Default::default()
            };
            entities::Zone::insert(zone)
                .on_conflict(
                    OnConflict::columns([
                        entities::zone::Column::SiteId,
                        entities::zone::Column::ZoneId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await?;
        }
        RegistrationPolicy::RequireExisting => {
            if find_zone(conn, site_id, zone_id).await?.is_none() {
                return Err(RegistryError::UnknownZone {
                    site_id: site_id.to_string(),
                    zone_id: zone_id.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Zone fields accepted from administrative upserts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneUpsert {
    pub site_id: String,
    pub zone_id: String,
    pub zone_name: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// Administrative create-or-replace of a zone record
pub async fn upsert_zone<C: ConnectionTrait>(conn: &C, zone: ZoneUpsert) -> RegistryResult<()> {
    let active = entities::ZoneActive {
        site_id: Set(zone.site_id),
        zone_id: Set(zone.zone_id),
        zone_name: Set(zone.zone_name),
        x: Set(zone.x),
        y: Set(zone.y),
        z: Set(zone.z),
        ..Default::default()
    };
    entities::Zone::insert(active)
        .on_conflict(
            OnConflict::columns([
                entities::zone::Column::SiteId,
                entities::zone::Column::ZoneId,
            ])
            .update_columns([
                entities::zone::Column::ZoneName,
                entities::zone::Column::X,
                entities::zone::Column::Y,
                entities::zone::Column::Z,
            ])
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// Administrative create-or-rename of a device record
pub async fn upsert_device<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
    device_id: &str,
    device_name: &str,
) -> RegistryResult<()> {
    let active = entities::DeviceActive {
        site_id: Set(site_id.to_string()),
        device_id: Set(device_id.to_string()),
        device_name: Set(device_name.to_string()),
        last_seen: Set(Utc::now()),
        ..Default::default()
    };
    entities::Device::insert(active)
        .on_conflict(
            OnConflict::columns([
                entities::device::Column::SiteId,
                entities::device::Column::DeviceId,
            ])
            .update_columns([entities::device::Column::DeviceName])
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

pub async fn find_device<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
    device_id: &str,
) -> RegistryResult<Option<entities::device::Model>> {
    Ok(entities::Device::find()
        .filter(entities::device::Column::SiteId.eq(site_id))
        .filter(entities::device::Column::DeviceId.eq(device_id))
        .one(conn)
        .await?)
}

pub async fn find_zone<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
    zone_id: &str,
) -> RegistryResult<Option<entities::zone::Model>> {
    Ok(entities::Zone::find()
        .filter(entities::zone::Column::SiteId.eq(site_id))
        .filter(entities::zone::Column::ZoneId.eq(zone_id))
        .one(conn)
        .await?)
}

/// All zones for a site, ordered by zone id
pub async fn list_zones<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
) -> RegistryResult<Vec<entities::zone::Model>> {
    Ok(entities::Zone::find()
        .filter(entities::zone::Column::SiteId.eq(site_id))
        .order_by_asc(entities::zone::Column::ZoneId)
        .all(conn)
        .await?)
}

/// All devices for a site, ordered by device id
pub async fn list_devices<C: ConnectionTrait>(
    conn: &C,
    site_id: &str,
) -> RegistryResult<Vec<entities::device::Model>> {
    Ok(entities::Device::find()
        .filter(entities::device::Column::SiteId.eq(site_id))
        .order_by_asc(entities::device::Column::DeviceId)
        .all(conn)
        .await?)
}
