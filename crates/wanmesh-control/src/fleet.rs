//! Device fleet access and version compatibility
//!
//! Devices are owned by the fleet service; the control plane only reads them.
//! `DbDeviceFleet` serves them from the local inventory table, while
//! `InMemoryDeviceFleet` is handy for embedding and tests.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use wanmesh_db::entities::device;
use wanmesh_proto::{Device, DeviceVersions, Interface};

/// Errors that can occur while reading the fleet
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Device store error: {0}")]
    Store(#[from] DbErr),

    #[error("Device {id} has unreadable interfaces: {source}")]
    InvalidInterfaces {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to the devices of an organization
#[async_trait]
pub trait DeviceFleet: Send + Sync {
    /// Load the requested devices of `org`, in request order
    ///
    /// Unknown ids and devices of other organizations are silently omitted.
    async fn devices(&self, org: &str, ids: &[Uuid]) -> Result<Vec<Device>, FleetError>;

    /// Load a single device
    async fn device(&self, org: &str, id: Uuid) -> Result<Option<Device>, FleetError> {
        Ok(self.devices(org, &[id]).await?.pop())
    }
}

/// Decides whether two devices can terminate a tunnel together
pub trait VersionPolicy: Send + Sync {
    fn compatible(&self, a: &DeviceVersions, b: &DeviceVersions) -> bool;
}

/// Devices are compatible when both agent and router share a major version
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorVersionPolicy;

impl MajorVersionPolicy {
    fn major(version: &str) -> Option<u32> {
        version
            .trim()
            .trim_start_matches('v')
            .split(['.', '-'])
            .next()?
            .parse()
            .ok()
    }
}

impl VersionPolicy for MajorVersionPolicy {
    fn compatible(&self, a: &DeviceVersions, b: &DeviceVersions) -> bool {
        let same = |x: &str, y: &str| match (Self::major(x), Self::major(y)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
        same(&a.agent, &b.agent) && same(&a.router, &b.router)
    }
}

/// Fleet kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryDeviceFleet {
    devices: DashMap<Uuid, Device>,
}

impl InMemoryDeviceFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a device
    pub fn insert(&self, device: Device) {
        debug!(device_id = %device.id, hostname = %device.hostname, "Fleet device stored");
        self.devices.insert(device.id, device);
    }

    pub fn remove(&self, id: Uuid) -> Option<Device> {
        self.devices.remove(&id).map(|(_, device)| device)
    }
}

#[async_trait]
impl DeviceFleet for InMemoryDeviceFleet {
    async fn devices(&self, org: &str, ids: &[Uuid]) -> Result<Vec<Device>, FleetError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.devices.get(id).map(|d| d.value().clone()))
            .filter(|device| device.org == org)
            .collect())
    }
}

/// Fleet served from the `devices` table
#[derive(Debug, Clone)]
pub struct DbDeviceFleet {
    db: DatabaseConnection,
}

impl DbDeviceFleet {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or refresh a device record
    pub async fn upsert(&self, device: &Device) -> Result<(), FleetError> {
        let interfaces = serde_json::to_string(&device.interfaces).map_err(|source| {
            FleetError::InvalidInterfaces {
                id: device.id,
                source,
            }
        })?;
        let now = Utc::now();

        let model = device::ActiveModel {
            id: Set(device.id),
            org: Set(device.org.clone()),
            hostname: Set(device.hostname.clone()),
            machine_id: Set(device.machine_id.clone()),
            agent_version: Set(device.versions.agent.clone()),
            router_version: Set(device.versions.router.clone()),
            interfaces: Set(interfaces),
            created_at: Set(now),
            updated_at: Set(now),
        };

        device::Entity::insert(model)
            .on_conflict(
                OnConflict::column(device::Column::Id)
                    .update_columns([
                        device::Column::Org,
                        device::Column::Hostname,
                        device::Column::MachineId,
                        device::Column::AgentVersion,
                        device::Column::RouterVersion,
                        device::Column::Interfaces,
                        device::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(device_id = %device.id, hostname = %device.hostname, "Device record upserted");
        Ok(())
    }

    fn to_device(model: device::Model) -> Result<Device, FleetError> {
        let interfaces: Vec<Interface> =
            serde_json::from_str(&model.interfaces).map_err(|source| {
                FleetError::InvalidInterfaces {
                    id: model.id,
                    source,
                }
            })?;

        Ok(Device {
            id: model.id,
            org: model.org,
            hostname: model.hostname,
            machine_id: model.machine_id,
            versions: DeviceVersions {
                agent: model.agent_version,
                router: model.router_version,
            },
            interfaces,
        })
    }
}

#[async_trait]
impl DeviceFleet for DbDeviceFleet {
    async fn devices(&self, org: &str, ids: &[Uuid]) -> Result<Vec<Device>, FleetError> {
        let models = device::Entity::find()
            .filter(device::Column::Org.eq(org))
            .filter(device::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;

        let mut by_id: HashMap<Uuid, device::Model> =
            models.into_iter().map(|m| (m.id, m)).collect();

        ids.iter()
            .filter_map(|id| by_id.remove(id))
            .map(Self::to_device)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wanmesh_proto::InterfaceKind;

    fn versions(agent: &str, router: &str) -> DeviceVersions {
        DeviceVersions {
            agent: agent.to_string(),
            router: router.to_string(),
        }
    }

    fn device(org: &str, machine_id: &str) -> Device {
        Device {
            id: Uuid::new_v4(),
            org: org.to_string(),
            hostname: format!("host-{}", machine_id),
            machine_id: machine_id.to_string(),
            versions: versions("5.2.1", "21.01.3"),
            interfaces: vec![Interface {
                id: Uuid::new_v4(),
                name: "eth0".to_string(),
                is_assigned: true,
                kind: InterfaceKind::Wan,
                ipv4: "192.168.1.2".to_string(),
                ipv4_mask: "24".to_string(),
                public_ip: None,
                mac: "52:54:00:00:00:01".to_string(),
                routing: "NONE".to_string(),
            }],
        }
    }

    #[test]
    fn test_major_version_policy() {
        let policy = MajorVersionPolicy;
        assert!(policy.compatible(&versions("5.2.1", "21.01.3"), &versions("5.0.0", "21.04")));
        assert!(!policy.compatible(&versions("5.2.1", "21.01.3"), &versions("4.9.0", "21.01.3")));
        assert!(!policy.compatible(&versions("5.2.1", "21.01.3"), &versions("5.2.1", "19.01-rc1")));
        assert!(policy.compatible(&versions("v5.1", "21-rc0"), &versions("5.3", "21.04.1")));
        assert!(!policy.compatible(&versions("unknown", "21.01"), &versions("5.3", "21.04.1")));
    }

    #[tokio::test]
    async fn test_in_memory_fleet_scopes_by_org_and_keeps_order() {
        let fleet = InMemoryDeviceFleet::new();
        let a = device("org-1", "m-a");
        let b = device("org-1", "m-b");
        let other = device("org-2", "m-c");
        fleet.insert(a.clone());
        fleet.insert(b.clone());
        fleet.insert(other.clone());

        let found = fleet
            .devices("org-1", &[b.id, other.id, a.id, Uuid::new_v4()])
            .await
            .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        assert!(fleet.device("org-1", other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_db_fleet_round_trip() {
        let db = wanmesh_db::connect("sqlite::memory:").await.unwrap();
        wanmesh_db::migrate(&db).await.unwrap();
        let fleet = DbDeviceFleet::new(db);

        let mut a = device("org-1", "m-a");
        fleet.upsert(&a).await.unwrap();

        a.hostname = "renamed".to_string();
        fleet.upsert(&a).await.unwrap();

        let loaded = fleet.device("org-1", a.id).await.unwrap().unwrap();
        assert_eq!(loaded, a);
        assert!(fleet.device("org-2", a.id).await.unwrap().is_none());
    }
}
