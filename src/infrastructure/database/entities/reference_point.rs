//! Reference point entity (current snapshot)
//!
//! A fixed, independently tracked position keyed by `(site_id, ref_id)`.
//! Every inbound sample upserts this row; the full history lives in
//! `reference_point_samples`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reference_points")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub site_id: String,
    pub ref_id: String,
    pub display_name: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub source: Option<String>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
