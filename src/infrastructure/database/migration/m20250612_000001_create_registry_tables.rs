//! Create the registry tables (devices, zones)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create devices table
        manager
            .create_table(
                Table::create()
                    .table(Devices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Devices::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Devices::SiteId).text().not_null())
                    .col(ColumnDef::new(Devices::DeviceId).text().not_null())
                    .col(ColumnDef::new(Devices::DeviceName).text().not_null())
                    .col(ColumnDef::new(Devices::LastSeen).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Devices are identified externally by (site_id, device_id)
        manager
            .create_index(
                Index::create()
                    .name("uq_device_site_device")
                    .table(Devices::Table)
                    .col(Devices::SiteId)
                    .col(Devices::DeviceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create zones table
        manager
            .create_table(
                Table::create()
                    .table(Zones::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Zones::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Zones::SiteId).text().not_null())
                    .col(ColumnDef::new(Zones::ZoneId).text().not_null())
                    .col(ColumnDef::new(Zones::ZoneName).text().not_null())
                    .col(ColumnDef::new(Zones::X).double())
                    .col(ColumnDef::new(Zones::Y).double())
                    .col(ColumnDef::new(Zones::Z).double())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_zone_site_zone")
                    .table(Zones::Table)
                    .col(Zones::SiteId)
                    .col(Zones::ZoneId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Zones::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Devices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Devices {
    Table,
    Id,
    SiteId,
    DeviceId,
    DeviceName,
    LastSeen,
}

#[derive(DeriveIden)]
enum Zones {
    Table,
    Id,
    SiteId,
    ZoneId,
    ZoneName,
    X,
    Y,
    Z,
}
