//! Database migrations

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250612_000001_create_registry_tables::Migration),
            Box::new(m20250612_000002_create_visits::Migration),
            Box::new(m20250613_000001_create_reference_points::Migration),
        ]
    }
}

mod m20250612_000001_create_registry_tables;
mod m20250612_000002_create_visits;
mod m20250613_000001_create_reference_points;
