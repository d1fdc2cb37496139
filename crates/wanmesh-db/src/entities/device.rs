//! Device inventory entity mirrored from the device fleet

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub org: String,

    pub hostname: String,

    /// Agent identifier used by the job-delivery system
    #[sea_orm(unique)]
    pub machine_id: String,

    pub agent_version: String,

    pub router_version: String,

    /// Interfaces as a JSON array
    #[sea_orm(column_type = "Text")]
    pub interfaces: String,

    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
