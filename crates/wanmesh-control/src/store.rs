//! Tunnel record access
//!
//! All mutations that react to job callbacks filter on `is_active = true` and on
//! the setup attempt the job was issued for, so a late or duplicated callback
//! for a deactivated tunnel, or for an earlier use of a reclaimed number,
//! affects zero rows.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::debug;
use uuid::Uuid;
use wanmesh_db::entities::tunnel::{self, SideStatus};
use wanmesh_proto::{Side, TunnelJobResponse};

/// Endpoints of a tunnel about to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTunnel {
    pub org: String,
    pub num: u32,
    pub device_a: Uuid,
    pub interface_a: Uuid,
    pub device_b: Uuid,
    pub interface_b: Uuid,
}

#[derive(Debug, Clone)]
pub struct TunnelStore {
    db: DatabaseConnection,
}

impl TunnelStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, org: &str, id: Uuid) -> Result<Option<tunnel::Model>, DbErr> {
        tunnel::Entity::find_by_id(id)
            .filter(tunnel::Column::Org.eq(org))
            .one(&self.db)
            .await
    }

    pub async fn find_by_num(&self, org: &str, num: u32) -> Result<Option<tunnel::Model>, DbErr> {
        tunnel::Entity::find()
            .filter(tunnel::Column::Org.eq(org))
            .filter(tunnel::Column::Num.eq(num as i32))
            .one(&self.db)
            .await
    }

    /// Active tunnel joining the two interfaces, in either device ordering
    pub async fn find_active_between(
        &self,
        org: &str,
        device_a: Uuid,
        interface_a: Uuid,
        device_b: Uuid,
        interface_b: Uuid,
    ) -> Result<Option<tunnel::Model>, DbErr> {
        let forward = Condition::all()
            .add(tunnel::Column::DeviceA.eq(device_a))
            .add(tunnel::Column::InterfaceA.eq(interface_a))
            .add(tunnel::Column::DeviceB.eq(device_b))
            .add(tunnel::Column::InterfaceB.eq(interface_b));
        let reverse = Condition::all()
            .add(tunnel::Column::DeviceA.eq(device_b))
            .add(tunnel::Column::InterfaceA.eq(interface_b))
            .add(tunnel::Column::DeviceB.eq(device_a))
            .add(tunnel::Column::InterfaceB.eq(interface_a));

        tunnel::Entity::find()
            .filter(tunnel::Column::Org.eq(org))
            .filter(tunnel::Column::IsActive.eq(true))
            .filter(Condition::any().add(forward).add(reverse))
            .one(&self.db)
            .await
    }

    /// Active tunnel a job correlation payload refers to
    pub async fn find_active_for_job(
        &self,
        response: &TunnelJobResponse,
    ) -> Result<Option<tunnel::Model>, DbErr> {
        tunnel::Entity::find()
            .filter(Self::job_condition(response))
            .one(&self.db)
            .await
    }

    /// Persist a freshly allocated tunnel, keyed by `(org, num)`
    ///
    /// A reclaimed number already has a record; it is rewritten in place under
    /// a new attempt id.
    pub async fn save_active(&self, new: &NewTunnel) -> Result<tunnel::Model, DbErr> {
        let now = Utc::now();
        let attempt_id = Uuid::new_v4();
        let model = tunnel::ActiveModel {
            id: Set(Uuid::new_v4()),
            org: Set(new.org.clone()),
            num: Set(new.num as i32),
            device_a: Set(new.device_a),
            interface_a: Set(new.interface_a),
            device_b: Set(new.device_b),
            interface_b: Set(new.interface_b),
            is_active: Set(true),
            device_a_conf: Set(false),
            device_b_conf: Set(false),
            device_a_status: Set(SideStatus::Pending),
            device_b_status: Set(SideStatus::Pending),
            attempt_id: Set(Some(attempt_id)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        tunnel::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([tunnel::Column::Org, tunnel::Column::Num])
                    .update_columns([
                        tunnel::Column::DeviceA,
                        tunnel::Column::InterfaceA,
                        tunnel::Column::DeviceB,
                        tunnel::Column::InterfaceB,
                        tunnel::Column::IsActive,
                        tunnel::Column::DeviceAConf,
                        tunnel::Column::DeviceBConf,
                        tunnel::Column::DeviceAStatus,
                        tunnel::Column::DeviceBStatus,
                        tunnel::Column::AttemptId,
                        tunnel::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let saved = self
            .find_by_num(&new.org, new.num)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("tunnel {}/{}", new.org, new.num)))?;

        debug!(
            org = %new.org,
            tunnel_num = new.num,
            tunnel_id = %saved.id,
            attempt_id = %attempt_id,
            "Tunnel record saved"
        );
        Ok(saved)
    }

    /// Record that the job side of `response` completed
    ///
    /// Returns false when no active tunnel matched.
    pub async fn set_confirmed(&self, response: &TunnelJobResponse) -> Result<bool, DbErr> {
        let mut update = tunnel::ActiveModel {
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        match response.side {
            Side::A => {
                update.device_a_conf = Set(true);
                update.device_a_status = Set(SideStatus::Completed);
            }
            Side::B => {
                update.device_b_conf = Set(true);
                update.device_b_status = Set(SideStatus::Completed);
            }
        }

        let result = tunnel::Entity::update_many()
            .set(update)
            .filter(Self::job_condition(response))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Set the status of the job side of `response` on the active tunnel
    pub async fn set_status_for_job(
        &self,
        response: &TunnelJobResponse,
        status: SideStatus,
    ) -> Result<bool, DbErr> {
        let result = tunnel::Entity::update_many()
            .set(Self::status_update(response.side, status))
            .filter(Self::job_condition(response))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Mark the job side of `response` failed and take ownership of the rollback
    ///
    /// Only the first failure of an attempt wins: the update is skipped when
    /// either side is already failed, and false is returned.
    pub async fn claim_rollback(&self, response: &TunnelJobResponse) -> Result<bool, DbErr> {
        let result = tunnel::Entity::update_many()
            .set(Self::status_update(response.side, SideStatus::Failed))
            .filter(Self::job_condition(response))
            .filter(tunnel::Column::DeviceAStatus.ne(SideStatus::Failed))
            .filter(tunnel::Column::DeviceBStatus.ne(SideStatus::Failed))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn set_side_status(
        &self,
        tunnel: &tunnel::Model,
        side: Side,
        status: SideStatus,
    ) -> Result<bool, DbErr> {
        let result = tunnel::Entity::update_many()
            .set(Self::status_update(side, status))
            .filter(Self::record_condition(tunnel))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Mark a tunnel inactive, returning its number to the pool
    ///
    /// Returns false if the tunnel was already inactive or its number has
    /// since been reused by another attempt.
    pub async fn deactivate(&self, tunnel: &tunnel::Model) -> Result<bool, DbErr> {
        let result = tunnel::Entity::update_many()
            .set(tunnel::ActiveModel {
                is_active: Set(false),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Self::record_condition(tunnel))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Tunnels of an organization ordered by number
    pub async fn list(&self, org: &str, active_only: bool) -> Result<Vec<tunnel::Model>, DbErr> {
        let mut condition = Condition::all().add(tunnel::Column::Org.eq(org));
        if active_only {
            condition = condition.add(tunnel::Column::IsActive.eq(true));
        }

        tunnel::Entity::find()
            .filter(condition)
            .order_by_asc(tunnel::Column::Num)
            .all(&self.db)
            .await
    }

    fn job_condition(response: &TunnelJobResponse) -> Condition {
        Condition::all()
            .add(tunnel::Column::Org.eq(response.org.as_str()))
            .add(tunnel::Column::Num.eq(response.tunnel_num as i32))
            .add(tunnel::Column::DeviceA.eq(response.device_a))
            .add(tunnel::Column::DeviceB.eq(response.device_b))
            .add(tunnel::Column::AttemptId.eq(response.attempt_id))
            .add(tunnel::Column::IsActive.eq(true))
    }

    /// The active record as loaded, still on the same attempt
    fn record_condition(tunnel: &tunnel::Model) -> Condition {
        let attempt = match tunnel.attempt_id {
            Some(attempt_id) => tunnel::Column::AttemptId.eq(attempt_id),
            None => tunnel::Column::AttemptId.is_null(),
        };
        Condition::all()
            .add(tunnel::Column::Id.eq(tunnel.id))
            .add(attempt)
            .add(tunnel::Column::IsActive.eq(true))
    }

    fn status_update(side: Side, status: SideStatus) -> tunnel::ActiveModel {
        let mut update = tunnel::ActiveModel {
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        let value: ActiveValue<SideStatus> = Set(status);
        match side {
            Side::A => update.device_a_status = value,
            Side::B => update.device_b_status = value,
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wanmesh_proto::JobOperation;

    async fn setup() -> TunnelStore {
        let db = wanmesh_db::connect("sqlite::memory:").await.unwrap();
        wanmesh_db::migrate(&db).await.unwrap();
        TunnelStore::new(db)
    }

    fn new_tunnel(num: u32) -> NewTunnel {
        NewTunnel {
            org: "org-1".to_string(),
            num,
            device_a: Uuid::new_v4(),
            interface_a: Uuid::new_v4(),
            device_b: Uuid::new_v4(),
            interface_b: Uuid::new_v4(),
        }
    }

    fn response_for(tunnel: &tunnel::Model, side: Side) -> TunnelJobResponse {
        TunnelJobResponse {
            operation: JobOperation::Add,
            org: tunnel.org.clone(),
            device_a: tunnel.device_a,
            device_b: tunnel.device_b,
            tunnel_num: tunnel.num as u32,
            attempt_id: tunnel.attempt_id.unwrap(),
            side,
        }
    }

    #[tokio::test]
    async fn test_find_active_between_either_ordering() {
        let store = setup().await;
        let new = new_tunnel(0);
        store.save_active(&new).await.unwrap();

        let forward = store
            .find_active_between("org-1", new.device_a, new.interface_a, new.device_b, new.interface_b)
            .await
            .unwrap();
        let reverse = store
            .find_active_between("org-1", new.device_b, new.interface_b, new.device_a, new.interface_a)
            .await
            .unwrap();
        assert!(forward.is_some());
        assert_eq!(forward, reverse);

        let other_org = store
            .find_active_between("org-2", new.device_a, new.interface_a, new.device_b, new.interface_b)
            .await
            .unwrap();
        assert!(other_org.is_none());
    }

    #[tokio::test]
    async fn test_save_active_rewrites_existing_number() {
        let store = setup().await;
        let first = store.save_active(&new_tunnel(4)).await.unwrap();
        store.deactivate(&first).await.unwrap();

        let replacement = new_tunnel(4);
        let second = store.save_active(&replacement).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_ne!(second.attempt_id, first.attempt_id);
        assert!(second.is_active);
        assert_eq!(second.device_a, replacement.device_a);
        assert_eq!(store.list("org-1", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_and_status_updates() {
        let store = setup().await;
        let tunnel = store.save_active(&new_tunnel(0)).await.unwrap();

        assert!(store.set_confirmed(&response_for(&tunnel, Side::B)).await.unwrap());
        assert!(store
            .set_status_for_job(&response_for(&tunnel, Side::A), SideStatus::JobDeleted)
            .await
            .unwrap());

        let reloaded = store.find("org-1", tunnel.id).await.unwrap().unwrap();
        assert!(!reloaded.device_a_conf);
        assert!(reloaded.device_b_conf);
        assert_eq!(reloaded.device_a_status, SideStatus::JobDeleted);
        assert_eq!(reloaded.device_b_status, SideStatus::Completed);
    }

    #[tokio::test]
    async fn test_updates_ignore_inactive_tunnels() {
        let store = setup().await;
        let tunnel = store.save_active(&new_tunnel(0)).await.unwrap();

        assert!(store.deactivate(&tunnel).await.unwrap());
        assert!(!store.deactivate(&tunnel).await.unwrap());

        assert!(!store.set_confirmed(&response_for(&tunnel, Side::A)).await.unwrap());
        assert!(!store
            .set_side_status(&tunnel, Side::A, SideStatus::Failed)
            .await
            .unwrap());
        assert!(store
            .find_active_for_job(&response_for(&tunnel, Side::A))
            .await
            .unwrap()
            .is_none());

        assert!(store.list("org-1", true).await.unwrap().is_empty());
        assert_eq!(store.list("org-1", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_callbacks_ignore_earlier_attempts() {
        let store = setup().await;
        let new = new_tunnel(0);
        let first = store.save_active(&new).await.unwrap();
        let stale = response_for(&first, Side::B);

        // Same endpoints and number, rolled back and set up again
        store.deactivate(&first).await.unwrap();
        let second = store.save_active(&new).await.unwrap();
        assert_eq!(second.id, first.id);

        assert!(!store.set_confirmed(&stale).await.unwrap());
        assert!(!store.claim_rollback(&stale).await.unwrap());
        assert!(store.find_active_for_job(&stale).await.unwrap().is_none());
        // The stale model no longer matches the reused record
        assert!(!store.deactivate(&first).await.unwrap());

        let reloaded = store.find("org-1", second.id).await.unwrap().unwrap();
        assert!(reloaded.is_active);
        assert!(!reloaded.device_b_conf);
        assert_eq!(reloaded.device_b_status, SideStatus::Pending);

        assert!(store.set_confirmed(&response_for(&second, Side::B)).await.unwrap());
    }

    #[tokio::test]
    async fn test_only_first_failure_claims_rollback() {
        let store = setup().await;
        let tunnel = store.save_active(&new_tunnel(0)).await.unwrap();

        let response_a = response_for(&tunnel, Side::A);
        let response_b = response_for(&tunnel, Side::B);
        let (side_a, side_b) = tokio::join!(
            store.claim_rollback(&response_a),
            store.claim_rollback(&response_b),
        );
        let claims = [side_a.unwrap(), side_b.unwrap()];
        assert_eq!(claims.iter().filter(|won| **won).count(), 1);

        // Repeating the winning callback does not claim again
        let winner = if claims[0] { Side::A } else { Side::B };
        assert!(!store.claim_rollback(&response_for(&tunnel, winner)).await.unwrap());
    }
}
