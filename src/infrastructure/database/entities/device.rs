//! Device entity
//!
//! A tracked device, keyed externally by `(site_id, device_id)`. `last_seen`
//! is bumped by every applied observation and drives the read-time staleness
//! judgment; it is never moved backwards.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub site_id: String,
    pub device_id: String,
    pub device_name: String,
    pub last_seen: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
