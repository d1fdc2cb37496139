//! Tunnels whose rollback was abandoned after every retry

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dead_letters")]
pub struct Model {
    /// One entry per tunnel; parking it again replaces the entry
    #[sea_orm(primary_key, auto_increment = false)]
    pub tunnel_id: Uuid,

    pub org: String,
    pub num: i32,

    /// Last error seen by the rollback
    #[sea_orm(column_type = "Text")]
    pub reason: String,

    pub attempts: i32,
    pub failed_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
