//! Per-organization tunnel number counter

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tunnel_counters")]
pub struct Model {
    /// Organization (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub org: String,

    /// Next number to mint; everything below it has been handed out once
    pub next_id: i32,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
