//! Create reference point snapshot and history tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReferencePoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReferencePoints::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReferencePoints::SiteId).text().not_null())
                    .col(ColumnDef::new(ReferencePoints::RefId).text().not_null())
                    .col(
                        ColumnDef::new(ReferencePoints::DisplayName)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReferencePoints::X).double())
                    .col(ColumnDef::new(ReferencePoints::Y).double())
                    .col(ColumnDef::new(ReferencePoints::Z).double())
                    .col(ColumnDef::new(ReferencePoints::Source).text())
                    .col(
                        ColumnDef::new(ReferencePoints::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_reference_point_site_ref")
                    .table(ReferencePoints::Table)
                    .col(ReferencePoints::SiteId)
                    .col(ReferencePoints::RefId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReferencePointSamples::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReferencePointSamples::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReferencePointSamples::SiteId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferencePointSamples::RefId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReferencePointSamples::X).double())
                    .col(ColumnDef::new(ReferencePointSamples::Y).double())
                    .col(ColumnDef::new(ReferencePointSamples::Z).double())
                    .col(ColumnDef::new(ReferencePointSamples::Source).text())
                    .col(
                        ColumnDef::new(ReferencePointSamples::ObservedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reference_point_sample_observed")
                    .table(ReferencePointSamples::Table)
                    .col(ReferencePointSamples::SiteId)
                    .col(ReferencePointSamples::RefId)
                    .col(ReferencePointSamples::ObservedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ReferencePointSamples::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ReferencePoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReferencePoints {
    Table,
    Id,
    SiteId,
    RefId,
    DisplayName,
    X,
    Y,
    Z,
    Source,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ReferencePointSamples {
    Table,
    Id,
    SiteId,
    RefId,
    X,
    Y,
    Z,
    Source,
    ObservedAt,
}
