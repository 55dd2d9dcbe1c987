//! Visit entity
//!
//! Append-only interval record of a device's continuous presence in one zone.
//! A row with `end_time = NULL` is the device's currently open visit; the
//! partial unique index `uq_open_visit_per_device` guarantees at most one such
//! row per `(site_id, device_id)` at every commit boundary. Rows are never
//! deleted; `end_time` and `duration_seconds` are set exactly once when the
//! visit closes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "visits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub site_id: String,
    pub device_id: String,
    pub zone_id: String,
    pub start_time: DateTimeUtc,
    pub end_time: Option<DateTimeUtc>,
    pub duration_seconds: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether this row is the device's currently open visit
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}
