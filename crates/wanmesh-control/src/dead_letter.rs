//! Rollbacks that could not be completed
//!
//! When every rollback attempt of a failed tunnel errors out, the tunnel is
//! parked in the `dead_letters` table instead of being left silently active.
//! Entries survive restarts; `wanmesh rollbacks retry` works them off.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;
use wanmesh_db::entities::dead_letter;

/// A tunnel whose rollback gave up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub tunnel_id: Uuid,
    pub org: String,
    pub num: u32,
    /// Last error seen
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl From<dead_letter::Model> for DeadLetter {
    fn from(model: dead_letter::Model) -> Self {
        Self {
            tunnel_id: model.tunnel_id,
            org: model.org,
            num: model.num.max(0) as u32,
            reason: model.reason,
            attempts: model.attempts.max(0) as u32,
            failed_at: model.failed_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetterStore {
    db: DatabaseConnection,
}

impl DeadLetterStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Park a tunnel, replacing an older entry for the same tunnel
    pub async fn push(&self, letter: &DeadLetter) -> Result<(), DbErr> {
        let model = dead_letter::ActiveModel {
            tunnel_id: Set(letter.tunnel_id),
            org: Set(letter.org.clone()),
            num: Set(letter.num as i32),
            reason: Set(letter.reason.clone()),
            attempts: Set(letter.attempts as i32),
            failed_at: Set(letter.failed_at),
        };

        dead_letter::Entity::insert(model)
            .on_conflict(
                OnConflict::column(dead_letter::Column::TunnelId)
                    .update_columns([
                        dead_letter::Column::Org,
                        dead_letter::Column::Num,
                        dead_letter::Column::Reason,
                        dead_letter::Column::Attempts,
                        dead_letter::Column::FailedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(tunnel_id = %letter.tunnel_id, org = %letter.org, "Tunnel parked");
        Ok(())
    }

    /// Parked tunnels, oldest first, optionally limited to one organization
    pub async fn list(&self, org: Option<&str>) -> Result<Vec<DeadLetter>, DbErr> {
        let mut query = dead_letter::Entity::find();
        if let Some(org) = org {
            query = query.filter(dead_letter::Column::Org.eq(org));
        }

        let letters = query
            .order_by_asc(dead_letter::Column::FailedAt)
            .all(&self.db)
            .await?;
        Ok(letters.into_iter().map(DeadLetter::from).collect())
    }

    /// Returns false if the tunnel was not parked
    pub async fn remove(&self, tunnel_id: Uuid) -> Result<bool, DbErr> {
        let result = dead_letter::Entity::delete_by_id(tunnel_id)
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup() -> DeadLetterStore {
        let db = wanmesh_db::connect("sqlite::memory:").await.unwrap();
        wanmesh_db::migrate(&db).await.unwrap();
        DeadLetterStore::new(db)
    }

    fn letter(tunnel_id: Uuid, org: &str, attempts: u32) -> DeadLetter {
        DeadLetter {
            tunnel_id,
            org: org.to_string(),
            num: 3,
            reason: "store unavailable".to_string(),
            attempts,
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_push_replaces_same_tunnel() {
        let store = setup().await;
        let id = Uuid::new_v4();

        store.push(&letter(id, "org-1", 3)).await.unwrap();
        store.push(&letter(Uuid::new_v4(), "org-1", 3)).await.unwrap();
        store.push(&letter(id, "org-1", 6)).await.unwrap();

        let letters = store.list(None).await.unwrap();
        assert_eq!(letters.len(), 2);
        let latest = letters.into_iter().find(|l| l.tunnel_id == id).unwrap();
        assert_eq!(latest.attempts, 6);
    }

    #[tokio::test]
    async fn test_list_filters_by_org_oldest_first() {
        let store = setup().await;
        let mut older = letter(Uuid::new_v4(), "org-1", 1);
        older.failed_at = Utc::now() - Duration::minutes(5);
        let newer = letter(Uuid::new_v4(), "org-1", 1);

        store.push(&newer).await.unwrap();
        store.push(&older).await.unwrap();
        store.push(&letter(Uuid::new_v4(), "org-2", 1)).await.unwrap();

        let org_1 = store.list(Some("org-1")).await.unwrap();
        assert_eq!(org_1.len(), 2);
        assert_eq!(org_1[0].tunnel_id, older.tunnel_id);
        assert_eq!(store.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = setup().await;
        let id = Uuid::new_v4();
        store.push(&letter(id, "org-1", 1)).await.unwrap();

        assert!(store.remove(id).await.unwrap());
        assert!(!store.remove(id).await.unwrap());
        assert!(store.list(None).await.unwrap().is_empty());
    }
}
