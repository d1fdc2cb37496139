//! Tunnel lifecycle controller
//!
//! Drives mesh creation and deletion and reconciles tunnel records with the
//! outcome of the device jobs:
//!
//! - `apply_tunnel_add` pairs every selected device with every other and builds
//!   one tunnel per pair of tunnel-capable WAN interfaces
//! - `apply_tunnel_del` tears down a single tunnel
//! - job events confirm a side, roll a failed tunnel back, or mark a cancelled
//!   job
//!
//! Only remote-execution failures trigger a rollback. A job the delivery system
//! refused never touched the device, so the record is annotated and kept.

use chrono::Utc;
use futures::future::join_all;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wanmesh_db::entities::tunnel::{self, SideStatus};
use wanmesh_proto::{
    Device, Interface, JobEvent, JobOperation, Side, TaskGroup, TunnelJobResponse,
};

use crate::allocator::{AllocationError, TunnelIdAllocator};
use crate::config::{MeshConfig, RollbackPolicy};
use crate::dead_letter::{DeadLetter, DeadLetterStore};
use crate::delivery::JobQueue;
use crate::dispatcher::{DeviceJob, DispatchSummary, Dispatcher};
use crate::error::MeshError;
use crate::fleet::{DeviceFleet, MajorVersionPolicy, VersionPolicy};
use crate::pair_locks::PairLocks;
use crate::params::{derive_tunnel_params, TunnelKeys};
use crate::preparer::{prepare_add, prepare_remove};
use crate::store::{NewTunnel, TunnelStore};

/// A tunnel created by a mesh request
#[derive(Debug, Clone)]
pub struct CreatedTunnel {
    pub tunnel_id: Uuid,
    pub num: u32,
    pub device_a: Uuid,
    pub device_b: Uuid,
    pub jobs: DispatchSummary,
}

/// Result of a mesh creation request
#[derive(Debug, Clone, Default)]
pub struct MeshAddSummary {
    pub devices: usize,
    pub pairs: usize,
    pub created: Vec<CreatedTunnel>,
    /// Interface pairs that already had an active tunnel
    pub skipped: usize,
    /// Interface pairs that could not be set up
    pub failed: Vec<String>,
    pub jobs_total: usize,
    pub jobs_accepted: usize,
}

impl MeshAddSummary {
    pub fn message(&self) -> String {
        format!(
            "Tunnels creation: {} created, {} already present, {} failed; {}/{} jobs dispatched",
            self.created.len(),
            self.skipped,
            self.failed.len(),
            self.jobs_accepted,
            self.jobs_total
        )
    }
}

/// Result of a tunnel deletion (or rollback) attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDelSummary {
    pub tunnel_id: Uuid,
    pub num: u32,
    pub jobs_total: usize,
    pub jobs_accepted: usize,
    /// The record was deactivated and its number freed
    pub deactivated: bool,
}

enum AddOutcome {
    Created(CreatedTunnel),
    Skipped,
}

pub struct TunnelLifecycle {
    db: DatabaseConnection,
    store: TunnelStore,
    allocator: TunnelIdAllocator,
    queue: Arc<dyn JobQueue>,
    dispatcher: Dispatcher,
    fleet: Arc<dyn DeviceFleet>,
    versions: Arc<dyn VersionPolicy>,
    locks: PairLocks,
    dead_letters: DeadLetterStore,
    config: MeshConfig,
}

impl TunnelLifecycle {
    pub fn new(
        db: DatabaseConnection,
        queue: Arc<dyn JobQueue>,
        fleet: Arc<dyn DeviceFleet>,
    ) -> Self {
        let config = MeshConfig::default();
        Self {
            store: TunnelStore::new(db.clone()),
            allocator: TunnelIdAllocator::with_capacity(db.clone(), config.tunnel_capacity),
            dispatcher: Dispatcher::new(queue.clone(), config.job.clone()),
            db: db.clone(),
            queue,
            fleet,
            versions: Arc::new(MajorVersionPolicy),
            locks: PairLocks::new(),
            dead_letters: DeadLetterStore::new(db.clone()),
            config,
        }
    }

    pub fn with_config(mut self, config: MeshConfig) -> Self {
        self.allocator = TunnelIdAllocator::with_capacity(self.db.clone(), config.tunnel_capacity);
        self.dispatcher = Dispatcher::new(self.queue.clone(), config.job.clone());
        self.config = config;
        self
    }

    pub fn with_version_policy(mut self, policy: Arc<dyn VersionPolicy>) -> Self {
        self.versions = policy;
        self
    }

    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.config.rollback = policy;
        self
    }

    pub fn store(&self) -> &TunnelStore {
        &self.store
    }

    pub fn dead_letters(&self) -> &DeadLetterStore {
        &self.dead_letters
    }

    pub fn pair_locks(&self) -> &PairLocks {
        &self.locks
    }

    /// Build a full tunnel mesh between the selected devices
    ///
    /// Fails before touching any state when fewer than two devices are
    /// selected or when any pair runs incompatible versions. Failures of
    /// individual interface pairs are reported in the summary.
    pub async fn apply_tunnel_add(
        &self,
        org: &str,
        device_ids: &[Uuid],
        requester: &str,
    ) -> Result<MeshAddSummary, MeshError> {
        let mut ids: Vec<Uuid> = Vec::with_capacity(device_ids.len());
        for id in device_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        if ids.len() < 2 {
            return Err(MeshError::validation(
                "At least two devices are required to build a tunnel mesh",
            ));
        }

        let devices = self.fleet.devices(org, &ids).await?;
        if devices.len() < 2 {
            return Err(MeshError::validation(format!(
                "Only {} of the {} selected devices exist in this organization",
                devices.len(),
                ids.len()
            )));
        }

        let mut pairs: Vec<(&Device, &Device)> = Vec::new();
        for (i, a) in devices.iter().enumerate() {
            for b in &devices[i + 1..] {
                pairs.push((a, b));
            }
        }

        for (a, b) in &pairs {
            if !self.versions.compatible(&a.versions, &b.versions) {
                warn!(org = %org, device_a = %a.id, device_b = %b.id, "Incompatible device versions");
                return Err(MeshError::IncompatibleVersions {
                    host_a: a.hostname.clone(),
                    version_a: format!("agent {}, router {}", a.versions.agent, a.versions.router),
                    host_b: b.hostname.clone(),
                    version_b: format!("agent {}, router {}", b.versions.agent, b.versions.router),
                });
            }
        }

        let mut combinations: Vec<(&Device, &Interface, &Device, &Interface)> = Vec::new();
        for (a, b) in &pairs {
            for iface_a in a.tunnel_interfaces() {
                for iface_b in b.tunnel_interfaces() {
                    combinations.push((a, iface_a, b, iface_b));
                }
            }
        }

        info!(
            org = %org,
            devices = devices.len(),
            pairs = pairs.len(),
            combinations = combinations.len(),
            "Building tunnel mesh"
        );

        let results = join_all(
            combinations
                .iter()
                .map(|(a, iface_a, b, iface_b)| self.add_tunnel(org, requester, a, iface_a, b, iface_b)),
        )
        .await;

        let mut summary = MeshAddSummary {
            devices: devices.len(),
            pairs: pairs.len(),
            ..Default::default()
        };
        let mut capacity_error = None;

        for ((a, iface_a, b, iface_b), result) in combinations.iter().zip(results) {
            match result {
                Ok(AddOutcome::Created(created)) => {
                    summary.jobs_total += created.jobs.total();
                    summary.jobs_accepted += created.jobs.accepted_count();
                    summary.created.push(created);
                }
                Ok(AddOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(
                        org = %org,
                        device_a = %a.id,
                        device_b = %b.id,
                        "Failed to create tunnel: {}",
                        e
                    );
                    summary.failed.push(format!(
                        "{}/{} <-> {}/{}: {}",
                        a.hostname, iface_a.name, b.hostname, iface_b.name, e
                    ));
                    if let MeshError::Allocation(err @ AllocationError::CapacityExhausted { .. }) = e
                    {
                        capacity_error.get_or_insert(err);
                    }
                }
            }
        }

        // Nothing could be built because the organization ran out of numbers
        if summary.created.is_empty() && summary.skipped == 0 {
            if let Some(err) = capacity_error {
                return Err(err.into());
            }
        }

        info!(org = %org, "{}", summary.message());
        Ok(summary)
    }

    /// Delete one tunnel
    ///
    /// The record is deactivated once both remove jobs are accepted; a refused
    /// side leaves it active and annotated.
    pub async fn apply_tunnel_del(
        &self,
        org: &str,
        tunnel_ids: &[Uuid],
        requester: &str,
    ) -> Result<TunnelDelSummary, MeshError> {
        let id = match tunnel_ids {
            [] => return Err(MeshError::validation("No tunnel selected")),
            [id] => *id,
            _ => {
                return Err(MeshError::validation(
                    "Only one tunnel can be deleted per request",
                ))
            }
        };

        let tunnel = self
            .store
            .find(org, id)
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| MeshError::validation(format!("No active tunnel {} found", id)))?;

        self.remove_tunnel(&tunnel, requester).await
    }

    pub async fn list_tunnels(
        &self,
        org: &str,
        active_only: bool,
    ) -> Result<Vec<tunnel::Model>, MeshError> {
        Ok(self.store.list(org, active_only).await?)
    }

    /// A device confirmed its side of a new tunnel
    pub async fn complete_tunnel_add(&self, job_id: &str, result: &Value) {
        if let Some(response) = Self::decode(job_id, result) {
            self.on_add_completed(job_id, &response).await;
        }
    }

    /// A device failed to configure its side of a new tunnel
    pub async fn error_tunnel_add(&self, job_id: &str, result: &Value) {
        if let Some(response) = Self::decode(job_id, result) {
            self.on_add_failed(job_id, &response, None).await;
        }
    }

    /// A tunnel job was cancelled or expired before it ran
    pub async fn removed_tunnel_add(&self, job_id: &str, result: &Value) {
        if let Some(response) = Self::decode(job_id, result) {
            self.on_add_removed(job_id, &response).await;
        }
    }

    /// Route one job event to its handler
    pub async fn handle_event(&self, event: JobEvent) {
        let job_id = event.job_id();
        let Some(response) = Self::decode(job_id, event.result()) else {
            return;
        };

        match (response.operation, &event) {
            (JobOperation::Add, JobEvent::Completed { .. }) => {
                self.on_add_completed(job_id, &response).await
            }
            (JobOperation::Add, JobEvent::Failed { error, .. }) => {
                self.on_add_failed(job_id, &response, error.as_deref()).await
            }
            (JobOperation::Add, JobEvent::Removed { .. }) => {
                self.on_add_removed(job_id, &response).await
            }
            (JobOperation::Del, JobEvent::Completed { .. }) => {
                info!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, side = %response.side, "Tunnel removed from device");
            }
            (JobOperation::Del, JobEvent::Failed { error, .. }) => {
                warn!(
                    job_id = %job_id,
                    org = %response.org,
                    tunnel_num = response.tunnel_num,
                    side = %response.side,
                    "Tunnel removal failed on device: {}",
                    error.as_deref().unwrap_or("unknown error")
                );
            }
            (JobOperation::Del, JobEvent::Removed { .. }) => {
                warn!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, side = %response.side, "Tunnel removal job was cancelled");
            }
        }
    }

    /// Consume job events until the sender side closes
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<JobEvent>) {
        info!("Listening for job events");
        while let Some(event) = events.recv().await {
            let lifecycle = self.clone();
            tokio::spawn(async move {
                lifecycle.handle_event(event).await;
            });
        }
        info!("Job event channel closed");
    }

    /// Retry the rollback of every parked tunnel, optionally in one organization
    ///
    /// Returns how many entries were resolved. Entries that fail again stay
    /// parked with the new error.
    pub async fn retry_dead_letters(&self, org: Option<&str>) -> Result<usize, MeshError> {
        let mut resolved = 0;

        for letter in self.dead_letters.list(org).await? {
            let tunnel = self.store.find(&letter.org, letter.tunnel_id).await?;
            match tunnel {
                Some(tunnel) if tunnel.is_active => {
                    if self.rollback(tunnel).await {
                        resolved += 1;
                    }
                }
                _ => {
                    debug!(tunnel_id = %letter.tunnel_id, "Dead-lettered tunnel already inactive");
                    self.dead_letters.remove(letter.tunnel_id).await?;
                    resolved += 1;
                }
            }
        }

        info!(resolved, "Dead-lettered rollbacks retried");
        Ok(resolved)
    }

    async fn add_tunnel(
        &self,
        org: &str,
        requester: &str,
        dev_a: &Device,
        iface_a: &Interface,
        dev_b: &Device,
        iface_b: &Interface,
    ) -> Result<AddOutcome, MeshError> {
        let guard = self
            .locks
            .lock(org, (dev_a.id, iface_a.id), (dev_b.id, iface_b.id))
            .await;

        if let Some(existing) = self
            .store
            .find_active_between(org, dev_a.id, iface_a.id, dev_b.id, iface_b.id)
            .await?
        {
            debug!(
                org = %org,
                tunnel_num = existing.num,
                "Tunnel between {}/{} and {}/{} already exists",
                dev_a.hostname, iface_a.name, dev_b.hostname, iface_b.name
            );
            return Ok(AddOutcome::Skipped);
        }

        let num = self.allocator.allocate(org).await?;
        let params = derive_tunnel_params(num);
        let keys = TunnelKeys::generate();
        let (tasks_a, tasks_b) = prepare_add(num, &params, &keys, iface_a, iface_b);

        let new = NewTunnel {
            org: org.to_string(),
            num,
            device_a: dev_a.id,
            interface_a: iface_a.id,
            device_b: dev_b.id,
            interface_b: iface_b.id,
        };
        let record = match self.store.save_active(&new).await {
            Ok(record) => record,
            Err(e) => {
                if let Err(release_err) = self.allocator.release(org, num).await {
                    error!(org = %org, tunnel_num = num, "Failed to release tunnel number: {}", release_err);
                }
                return Err(e.into());
            }
        };
        drop(guard);

        let attempt_id = record.attempt_id.unwrap_or_default();
        let jobs = Self::tunnel_jobs(
            JobOperation::Add,
            org,
            num,
            attempt_id,
            dev_a,
            dev_b,
            tasks_a,
            tasks_b,
        );
        let summary = self.dispatcher.submit(org, requester, jobs).await;
        self.annotate_rejected(&record, &summary).await;

        info!(
            org = %org,
            tunnel_num = num,
            tunnel_id = %record.id,
            accepted = summary.accepted_count(),
            "Tunnel {}/{} <-> {}/{} created",
            dev_a.hostname, iface_a.name, dev_b.hostname, iface_b.name
        );

        Ok(AddOutcome::Created(CreatedTunnel {
            tunnel_id: record.id,
            num,
            device_a: dev_a.id,
            device_b: dev_b.id,
            jobs: summary,
        }))
    }

    /// Send remove jobs for `tunnel` and deactivate it once both are accepted
    async fn remove_tunnel(
        &self,
        tunnel: &tunnel::Model,
        requester: &str,
    ) -> Result<TunnelDelSummary, MeshError> {
        let devices = self
            .fleet
            .devices(&tunnel.org, &[tunnel.device_a, tunnel.device_b])
            .await?;
        let find_device = |id: Uuid| {
            devices
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| MeshError::validation(format!("Device {} of tunnel {} not found", id, tunnel.id)))
        };
        let dev_a = find_device(tunnel.device_a)?;
        let dev_b = find_device(tunnel.device_b)?;

        let find_interface = |device: &Device, id: Uuid| {
            device.interface(id).cloned().ok_or_else(|| {
                MeshError::validation(format!(
                    "Interface {} of device {} not found",
                    id, device.hostname
                ))
            })
        };
        let iface_a = find_interface(dev_a, tunnel.interface_a)?;
        let iface_b = find_interface(dev_b, tunnel.interface_b)?;

        let num = tunnel.num as u32;
        let params = derive_tunnel_params(num);
        let (tasks_a, tasks_b) = prepare_remove(num, &params, &iface_a, &iface_b);

        // Records older than attempt tracking carry none; remove callbacks are
        // only logged
        let jobs = Self::tunnel_jobs(
            JobOperation::Del,
            &tunnel.org,
            num,
            tunnel.attempt_id.unwrap_or_default(),
            dev_a,
            dev_b,
            tasks_a,
            tasks_b,
        );
        let summary = self.dispatcher.submit(&tunnel.org, requester, jobs).await;

        let deactivated = if summary.all_accepted() {
            if !self.store.deactivate(tunnel).await? {
                debug!(tunnel_id = %tunnel.id, "Tunnel was already inactive");
            }
            info!(org = %tunnel.org, tunnel_num = num, tunnel_id = %tunnel.id, "Tunnel deactivated");
            true
        } else {
            self.annotate_rejected(tunnel, &summary).await;
            false
        };

        Ok(TunnelDelSummary {
            tunnel_id: tunnel.id,
            num,
            jobs_total: summary.total(),
            jobs_accepted: summary.accepted_count(),
            deactivated,
        })
    }

    /// Undo a tunnel whose setup failed on a device
    ///
    /// Returns true once the record is inactive, clearing any dead letter for
    /// it. After the last failed attempt the tunnel is parked instead.
    async fn rollback(&self, tunnel: tunnel::Model) -> bool {
        let policy = self.config.rollback.clone();
        let attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self
                .remove_tunnel(&tunnel, &self.config.system_requester)
                .await
            {
                Ok(summary) if summary.deactivated => {
                    info!(org = %tunnel.org, tunnel_num = tunnel.num, "Tunnel rolled back");
                    self.clear_dead_letter(&tunnel).await;
                    return true;
                }
                Ok(summary) => {
                    last_error = format!(
                        "{}/{} remove jobs accepted",
                        summary.jobs_accepted, summary.jobs_total
                    );
                }
                // Nothing left on the devices to clean up
                Err(MeshError::Validation(reason)) => {
                    warn!(org = %tunnel.org, tunnel_num = tunnel.num, "Deactivating without remove jobs: {}", reason);
                    match self.store.deactivate(&tunnel).await {
                        Ok(_) => {
                            self.clear_dead_letter(&tunnel).await;
                            return true;
                        }
                        Err(e) => last_error = e.to_string(),
                    }
                }
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                org = %tunnel.org,
                tunnel_num = tunnel.num,
                attempt = attempt + 1,
                "Rollback attempt failed: {}",
                last_error
            );
            if attempt + 1 < attempts {
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }

        error!(
            org = %tunnel.org,
            tunnel_num = tunnel.num,
            tunnel_id = %tunnel.id,
            "Rollback abandoned after {} attempts: {}",
            attempts,
            last_error
        );
        let letter = DeadLetter {
            tunnel_id: tunnel.id,
            org: tunnel.org.clone(),
            num: tunnel.num as u32,
            reason: last_error,
            attempts,
            failed_at: Utc::now(),
        };
        if let Err(e) = self.dead_letters.push(&letter).await {
            error!(tunnel_id = %tunnel.id, "Failed to park tunnel rollback: {}", e);
        }
        false
    }

    async fn clear_dead_letter(&self, tunnel: &tunnel::Model) {
        if let Err(e) = self.dead_letters.remove(tunnel.id).await {
            warn!(tunnel_id = %tunnel.id, "Failed to clear dead letter: {}", e);
        }
    }

    async fn on_add_completed(&self, job_id: &str, response: &TunnelJobResponse) {
        match self.store.set_confirmed(response).await {
            Ok(true) => {
                info!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, side = %response.side, device = %response.target_device(), "Tunnel side confirmed")
            }
            Ok(false) => {
                warn!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "No active tunnel for completed job")
            }
            Err(e) => {
                error!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Failed to confirm tunnel side: {}", e)
            }
        }
    }

    async fn on_add_failed(&self, job_id: &str, response: &TunnelJobResponse, reason: Option<&str>) {
        warn!(
            job_id = %job_id,
            org = %response.org,
            tunnel_num = response.tunnel_num,
            side = %response.side,
            device = %response.target_device(),
            "Tunnel setup failed on device: {}",
            reason.unwrap_or("unknown error")
        );

        // The first failure of an attempt owns the rollback
        match self.store.claim_rollback(response).await {
            Ok(true) => {}
            Ok(false) => {
                match self
                    .store
                    .set_status_for_job(response, SideStatus::Failed)
                    .await
                {
                    Ok(true) => {
                        info!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Rollback already under way")
                    }
                    Ok(false) => {
                        info!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Tunnel already reconciled, nothing to roll back")
                    }
                    Err(e) => {
                        error!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Failed to mark tunnel side failed: {}", e)
                    }
                }
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Failed to claim tunnel rollback: {}", e);
                return;
            }
        }

        let tunnel = match self.store.find_active_for_job(response).await {
            Ok(Some(tunnel)) => tunnel,
            Ok(None) => {
                debug!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Tunnel deactivated before rollback");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Failed to load tunnel for rollback: {}", e);
                return;
            }
        };

        self.rollback(tunnel).await;
    }

    async fn on_add_removed(&self, job_id: &str, response: &TunnelJobResponse) {
        match self
            .store
            .set_status_for_job(response, SideStatus::JobDeleted)
            .await
        {
            Ok(true) => {
                info!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, side = %response.side, "Tunnel job deleted before execution")
            }
            Ok(false) => {
                debug!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "No active tunnel for deleted job")
            }
            Err(e) => {
                error!(job_id = %job_id, org = %response.org, tunnel_num = response.tunnel_num, "Failed to mark job deleted: {}", e)
            }
        }
    }

    async fn annotate_rejected(&self, tunnel: &tunnel::Model, summary: &DispatchSummary) {
        for failure in &summary.rejected {
            if let Err(e) = self
                .store
                .set_side_status(tunnel, failure.side, SideStatus::DispatchFailed)
                .await
            {
                error!(tunnel_id = %tunnel.id, side = %failure.side, "Failed to annotate dispatch failure: {}", e);
            }
        }
    }

    fn decode(job_id: &str, result: &Value) -> Option<TunnelJobResponse> {
        match TunnelJobResponse::from_value(result) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(job_id = %job_id, "Dropping job result: {}", e);
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn tunnel_jobs(
        operation: JobOperation,
        org: &str,
        num: u32,
        attempt_id: Uuid,
        dev_a: &Device,
        dev_b: &Device,
        tasks_a: Vec<TaskGroup>,
        tasks_b: Vec<TaskGroup>,
    ) -> Vec<DeviceJob> {
        let verb = match operation {
            JobOperation::Add => "Add",
            JobOperation::Del => "Remove",
        };
        let response = |side: Side| TunnelJobResponse {
            operation,
            org: org.to_string(),
            device_a: dev_a.id,
            device_b: dev_b.id,
            tunnel_num: num,
            attempt_id,
            side,
        };

        vec![
            DeviceJob {
                target: dev_a.machine_id.clone(),
                device_id: dev_a.id,
                title: format!("{} tunnel {} to {}", verb, num, dev_b.hostname),
                tasks: tasks_a,
                response: response(Side::A),
            },
            DeviceJob {
                target: dev_b.machine_id.clone(),
                device_id: dev_b.id,
                title: format!("{} tunnel {} to {}", verb, num, dev_a.hostname),
                tasks: tasks_b,
                response: response(Side::B),
            },
        ]
    }
}
