//! Tunnel number allocation
//!
//! Numbers are scoped per organization. Allocation first tries to claim an
//! inactive tunnel record (a number freed by deletion or rollback) and only
//! then mints a new number from the organization counter. Both steps are
//! compare-and-update statements, so concurrent callers never receive the
//! same number.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wanmesh_db::entities::tunnel::{self, SideStatus};
use wanmesh_db::entities::tunnel_counter;

/// Default number of tunnels an organization may hold
pub const TUNNEL_ID_CAPACITY: u32 = 15_000;

/// Upper bound of the numbering space the address derivation supports
pub const MAX_TUNNEL_NUMBERS: u32 = 127 * 256;

/// Lost compare-and-update races tolerated before giving up
const MAX_CAS_ATTEMPTS: usize = 64;

/// Errors that can occur while allocating a tunnel number
#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Organization {org} has used all {capacity} tunnel numbers")]
    CapacityExhausted { org: String, capacity: u32 },

    #[error("Tunnel counter for organization {org} kept conflicting")]
    Conflict { org: String },

    #[error("Store error: {0}")]
    Store(#[from] DbErr),
}

/// Hands out per-organization tunnel numbers
#[derive(Debug, Clone)]
pub struct TunnelIdAllocator {
    db: DatabaseConnection,
    capacity: u32,
}

impl TunnelIdAllocator {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_capacity(db, TUNNEL_ID_CAPACITY)
    }

    /// Capacity is clamped to the derivable numbering space
    pub fn with_capacity(db: DatabaseConnection, capacity: u32) -> Self {
        Self {
            db,
            capacity: capacity.min(MAX_TUNNEL_NUMBERS),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Allocate a tunnel number for `org`
    ///
    /// The returned number is either a reclaimed one, whose record is now
    /// active again, or a freshly minted one without any record yet.
    pub async fn allocate(&self, org: &str) -> Result<u32, AllocationError> {
        if let Some(num) = self.claim_inactive(org).await? {
            debug!(org = %org, tunnel_num = num, "Reclaimed inactive tunnel number");
            return Ok(num);
        }

        let num = self.next_from_counter(org).await?;
        debug!(org = %org, tunnel_num = num, "Minted tunnel number");
        Ok(num)
    }

    /// Return a number to the pool
    ///
    /// Used when the tunnel record could not be written after allocation. If no
    /// record exists for the number, an inactive placeholder is stored so the
    /// next allocation reclaims it instead of minting.
    pub async fn release(&self, org: &str, num: u32) -> Result<(), AllocationError> {
        let now = Utc::now();
        let result = tunnel::Entity::update_many()
            .set(tunnel::ActiveModel {
                is_active: Set(false),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(tunnel::Column::Org.eq(org))
            .filter(tunnel::Column::Num.eq(num as i32))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(org = %org, tunnel_num = num, "Released tunnel number");
            return Ok(());
        }

        let placeholder = tunnel::ActiveModel {
            id: Set(Uuid::new_v4()),
            org: Set(org.to_string()),
            num: Set(num as i32),
            device_a: Set(Uuid::nil()),
            interface_a: Set(Uuid::nil()),
            device_b: Set(Uuid::nil()),
            interface_b: Set(Uuid::nil()),
            is_active: Set(false),
            device_a_conf: Set(false),
            device_b_conf: Set(false),
            device_a_status: Set(SideStatus::Pending),
            device_b_status: Set(SideStatus::Pending),
            attempt_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        tunnel::Entity::insert(placeholder)
            .on_conflict(
                OnConflict::columns([tunnel::Column::Org, tunnel::Column::Num])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        info!(org = %org, tunnel_num = num, "Released tunnel number without a record");
        Ok(())
    }

    /// Step 1: claim the lowest-numbered inactive record
    async fn claim_inactive(&self, org: &str) -> Result<Option<u32>, AllocationError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(candidate) = tunnel::Entity::find()
                .filter(tunnel::Column::Org.eq(org))
                .filter(tunnel::Column::IsActive.eq(false))
                .order_by_asc(tunnel::Column::Num)
                .one(&self.db)
                .await?
            else {
                return Ok(None);
            };

            // Stale endpoint refs and attempt are cleared so the claimed record
            // matches neither an existing-tunnel lookup nor a late callback
            // before it is rewritten.
            let result = tunnel::Entity::update_many()
                .set(tunnel::ActiveModel {
                    is_active: Set(true),
                    device_a: Set(Uuid::nil()),
                    interface_a: Set(Uuid::nil()),
                    device_b: Set(Uuid::nil()),
                    interface_b: Set(Uuid::nil()),
                    device_a_conf: Set(false),
                    device_b_conf: Set(false),
                    device_a_status: Set(SideStatus::Pending),
                    device_b_status: Set(SideStatus::Pending),
                    attempt_id: Set(None),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                })
                .filter(tunnel::Column::Id.eq(candidate.id))
                .filter(tunnel::Column::IsActive.eq(false))
                .exec(&self.db)
                .await?;

            if result.rows_affected == 1 {
                return Ok(Some(candidate.num as u32));
            }

            debug!(org = %org, tunnel_num = candidate.num, "Lost claim race, trying next record");
        }

        Err(AllocationError::Conflict {
            org: org.to_string(),
        })
    }

    /// Step 2: mint from the organization counter
    async fn next_from_counter(&self, org: &str) -> Result<u32, AllocationError> {
        let mut insert_retried = false;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let counter = tunnel_counter::Entity::find_by_id(org.to_string())
                .one(&self.db)
                .await?;

            let Some(counter) = counter else {
                if self.capacity == 0 {
                    return Err(self.exhausted(org));
                }

                let first = tunnel_counter::ActiveModel {
                    org: Set(org.to_string()),
                    next_id: Set(1),
                    updated_at: Set(Utc::now()),
                };

                match tunnel_counter::Entity::insert(first)
                    .exec_without_returning(&self.db)
                    .await
                {
                    Ok(_) => {
                        info!(org = %org, "Created tunnel counter");
                        return Ok(0);
                    }
                    Err(err)
                        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                    {
                        if insert_retried {
                            warn!(org = %org, "Tunnel counter insert conflicted twice");
                            return Err(AllocationError::Conflict {
                                org: org.to_string(),
                            });
                        }
                        insert_retried = true;
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            };

            let current = counter.next_id.max(0) as u32;
            if current >= self.capacity {
                return Err(self.exhausted(org));
            }

            let result = tunnel_counter::Entity::update_many()
                .set(tunnel_counter::ActiveModel {
                    next_id: Set(counter.next_id + 1),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                })
                .filter(tunnel_counter::Column::Org.eq(org))
                .filter(tunnel_counter::Column::NextId.eq(counter.next_id))
                .exec(&self.db)
                .await?;

            if result.rows_affected == 1 {
                return Ok(current);
            }
        }

        Err(AllocationError::Conflict {
            org: org.to_string(),
        })
    }

    fn exhausted(&self, org: &str) -> AllocationError {
        warn!(org = %org, capacity = self.capacity, "Tunnel numbers exhausted");
        AllocationError::CapacityExhausted {
            org: org.to_string(),
            capacity: self.capacity,
        }
    }
}
