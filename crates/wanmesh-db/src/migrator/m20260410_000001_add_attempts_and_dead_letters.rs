//! Setup attempt tokens on tunnels and persisted dead letters
//!
//! Every save of an active tunnel writes a fresh `attempt_id`; job callbacks
//! carry it back so a late result from an earlier use of the same number is
//! ignored. Rollbacks that gave up are parked in `dead_letters` until retried.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Nullable: records written before this migration and freshly claimed
        // numbers have no attempt yet
        manager
            .alter_table(
                Table::alter()
                    .table(Tunnels::Table)
                    .add_column(ColumnDef::new(Tunnels::AttemptId).uuid().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeadLetters::Table)
                    .if_not_exists()
                    .col(uuid(DeadLetters::TunnelId).primary_key())
                    .col(string_len(DeadLetters::Org, 255).not_null())
                    .col(integer(DeadLetters::Num).not_null())
                    .col(text(DeadLetters::Reason).not_null())
                    .col(integer(DeadLetters::Attempts).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(DeadLetters::FailedAt)
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
                    .name("idx_dead_letters_org")
                    .table(DeadLetters::Table)
                    .col(DeadLetters::Org)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeadLetters::Table).to_owned())
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Tunnels::Table)
                    .drop_column(Tunnels::AttemptId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Tunnels {
    Table,
    AttemptId,
}

#[derive(DeriveIden)]
enum DeadLetters {
    Table,
    TunnelId,
    Org,
    Num,
    Reason,
    Attempts,
    FailedAt,
}
