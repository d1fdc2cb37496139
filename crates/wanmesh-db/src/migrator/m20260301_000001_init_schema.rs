//! Initial schema: tunnels and per-organization tunnel counters

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. Create tunnels table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Tunnels::Table)
                    .if_not_exists()
                    .col(uuid(Tunnels::Id).primary_key())
                    .col(string_len(Tunnels::Org, 255).not_null())
                    .col(integer(Tunnels::Num).not_null())
                    .col(uuid(Tunnels::DeviceA).not_null())
                    .col(uuid(Tunnels::InterfaceA).not_null())
                    .col(uuid(Tunnels::DeviceB).not_null())
                    .col(uuid(Tunnels::InterfaceB).not_null())
                    .col(boolean(Tunnels::IsActive).not_null().default(true))
                    .col(boolean(Tunnels::DeviceAConf).not_null().default(false))
                    .col(boolean(Tunnels::DeviceBConf).not_null().default(false))
                    .col(
                        string_len(Tunnels::DeviceAStatus, 32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        string_len(Tunnels::DeviceBStatus, 32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        timestamp_with_time_zone(Tunnels::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Tunnels::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Tunnel numbers are unique within an organization
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tunnels_org_num")
                    .table(Tunnels::Table)
                    .col(Tunnels::Org)
                    .col(Tunnels::Num)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tunnels_org_is_active")
                    .table(Tunnels::Table)
                    .col(Tunnels::Org)
                    .col(Tunnels::IsActive)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tunnels_devices")
                    .table(Tunnels::Table)
                    .col(Tunnels::DeviceA)
                    .col(Tunnels::DeviceB)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. Create tunnel_counters table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(TunnelCounters::Table)
                    .if_not_exists()
                    .col(string_len(TunnelCounters::Org, 255).primary_key())
                    .col(integer(TunnelCounters::NextId).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(TunnelCounters::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TunnelCounters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tunnels::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Tunnels {
    Table,
    Id,
    Org,
    Num,
    DeviceA,
    InterfaceA,
    DeviceB,
    InterfaceB,
    IsActive,
    DeviceAConf,
    DeviceBConf,
    DeviceAStatus,
    DeviceBStatus,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TunnelCounters {
    Table,
    Org,
    NextId,
    UpdatedAt,
}
