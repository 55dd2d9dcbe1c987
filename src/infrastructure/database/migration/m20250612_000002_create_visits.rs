//! Create the visits table and the open-visit uniqueness constraint

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Visits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Visits::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Visits::SiteId).text().not_null())
                    .col(ColumnDef::new(Visits::DeviceId).text().not_null())
                    .col(ColumnDef::new(Visits::ZoneId).text().not_null())
                    .col(ColumnDef::new(Visits::StartTime).timestamp().not_null())
                    .col(ColumnDef::new(Visits::EndTime).timestamp())
                    .col(ColumnDef::new(Visits::DurationSeconds).big_integer())
                    .to_owned(),
            )
            .await?;

        // Per-device timeline ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_visit_device_start")
                    .table(Visits::Table)
                    .col(Visits::SiteId)
                    .col(Visits::DeviceId)
                    .col(Visits::StartTime)
                    .to_owned(),
            )
            .await?;

        // Safety net for the single-open-visit invariant: competing workers
        // racing to create an open visit collide here, and the loser re-reads
        // the now-current state. sea-query has no partial index builder, so
        // this one is raw SQL.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_open_visit_per_device \
                 ON visits (site_id, device_id) WHERE end_time IS NULL",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Visits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Visits {
    Table,
    Id,
    SiteId,
    DeviceId,
    ZoneId,
    StartTime,
    EndTime,
    DurationSeconds,
}
