//! Migration to add the device inventory mirrored from the fleet

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Devices::Table)
                    .if_not_exists()
                    .col(uuid(Devices::Id).primary_key())
                    .col(string_len(Devices::Org, 255).not_null())
                    .col(string_len(Devices::Hostname, 255).not_null())
                    .col(string_len(Devices::MachineId, 255).not_null().unique_key())
                    .col(string_len(Devices::AgentVersion, 64).not_null())
                    .col(string_len(Devices::RouterVersion, 64).not_null())
                    .col(text(Devices::Interfaces).not_null().default("[]"))
                    .col(
                        timestamp_with_time_zone(Devices::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Devices::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_devices_org")
                    .table(Devices::Table)
                    .col(Devices::Org)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_devices_org")
                    .table(Devices::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Devices::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Devices {
    Table,
    Id,
    Org,
    Hostname,
    MachineId,
    AgentVersion,
    RouterVersion,
    Interfaces,
    CreatedAt,
    UpdatedAt,
}
