//! Tunnel entity: one point-to-point tunnel between two device interfaces

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Last known state of the job configuring one side of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum SideStatus {
    /// Job queued or not yet submitted
    #[sea_orm(string_value = "pending")]
    Pending,

    /// Device confirmed the configuration
    #[sea_orm(string_value = "completed")]
    Completed,

    /// Job executed and failed on the device
    #[sea_orm(string_value = "failed")]
    Failed,

    /// Job delivery system refused the job
    #[sea_orm(string_value = "dispatch-failed")]
    DispatchFailed,

    /// Job was cancelled or expired before it ran
    #[sea_orm(string_value = "job-deleted")]
    JobDeleted,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tunnels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning organization
    pub org: String,

    /// Tunnel number, unique per organization
    pub num: i32,

    pub device_a: Uuid,
    pub interface_a: Uuid,
    pub device_b: Uuid,
    pub interface_b: Uuid,

    /// Inactive records hold numbers available for reuse
    pub is_active: bool,

    /// Device A confirmed its side of the tunnel
    pub device_a_conf: bool,

    /// Device B confirmed its side of the tunnel
    pub device_b_conf: bool,

    pub device_a_status: SideStatus,
    pub device_b_status: SideStatus,

    /// Token of the current setup attempt, echoed back by job callbacks
    pub attempt_id: Option<Uuid>,

    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
