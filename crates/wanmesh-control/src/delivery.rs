//! Job delivery seam
//!
//! The delivery system accepts jobs for device agents and later reports their
//! terminal outcome. `JobQueue` covers the submit side; outcomes come back as
//! [`JobEvent`]s on a channel consumed by the lifecycle controller.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wanmesh_proto::{JobEvent, JobRequest};

/// Why a job was not accepted for delivery
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Job for {target} rejected: {reason}")]
    Rejected { target: String, reason: String },

    #[error("Job delivery unavailable: {0}")]
    Unavailable(String),
}

/// Reference to an accepted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub target: String,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job; resolves once the job is accepted, not executed
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, DeliveryError>;
}

/// In-process job queue
///
/// Accepted jobs stay pending until `complete`, `fail` or `remove` resolves
/// them, which emits the matching event with the job's correlation payload.
#[derive(Debug)]
pub struct LocalJobQueue {
    next_id: AtomicU64,
    pending: DashMap<String, JobRequest>,
    rejected_targets: DashSet<String>,
    events: mpsc::UnboundedSender<JobEvent>,
}

impl LocalJobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let queue = Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            rejected_targets: DashSet::new(),
            events,
        };
        (queue, rx)
    }

    /// Refuse every job addressed to `target` until accepted again
    pub fn reject_target(&self, target: impl Into<String>) {
        self.rejected_targets.insert(target.into());
    }

    pub fn accept_target(&self, target: &str) {
        self.rejected_targets.remove(target);
    }

    /// Pending jobs ordered by submission
    pub fn pending(&self) -> Vec<(String, JobRequest)> {
        let mut jobs: Vec<(String, JobRequest)> = self
            .pending
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        jobs.sort_by_key(|(id, _)| id.parse::<u64>().unwrap_or(u64::MAX));
        jobs
    }

    pub fn get(&self, job_id: &str) -> Option<JobRequest> {
        self.pending.get(job_id).map(|job| job.value().clone())
    }

    pub fn complete(&self, job_id: &str) -> bool {
        self.resolve(job_id, |job_id, result| JobEvent::Completed { job_id, result })
    }

    pub fn fail(&self, job_id: &str, error: impl Into<String>) -> bool {
        let error = Some(error.into());
        self.resolve(job_id, move |job_id, result| JobEvent::Failed {
            job_id,
            result,
            error,
        })
    }

    /// Cancel a job before it runs
    pub fn remove(&self, job_id: &str) -> bool {
        self.resolve(job_id, |job_id, result| JobEvent::Removed { job_id, result })
    }

    fn resolve<F>(&self, job_id: &str, event: F) -> bool
    where
        F: FnOnce(String, serde_json::Value) -> JobEvent,
    {
        let Some((job_id, job)) = self.pending.remove(job_id) else {
            debug!(job_id = %job_id, "Job is not pending");
            return false;
        };

        let result = match serde_json::to_value(&job.data) {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %job_id, "Failed to encode job result: {}", e);
                serde_json::Value::Null
            }
        };

        if self.events.send(event(job_id.clone(), result)).is_err() {
            warn!(job_id = %job_id, "Job event receiver dropped");
        }
        true
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, DeliveryError> {
        if self.rejected_targets.contains(&request.target) {
            return Err(DeliveryError::Rejected {
                target: request.target,
                reason: "target unavailable".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let target = request.target.clone();
        debug!(job_id = %id, target = %target, title = %request.title, "Job accepted");
        self.pending.insert(id.clone(), request);

        Ok(JobHandle { id, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wanmesh_proto::{JobOperation, JobOptions, Side, TunnelJobResponse, JOB_METHOD_TUNNELS};

    fn request(target: &str) -> JobRequest {
        JobRequest {
            target: target.to_string(),
            requester: "user-1".to_string(),
            org: "org-1".to_string(),
            title: "Add tunnel".to_string(),
            tasks: Vec::new(),
            method: JOB_METHOD_TUNNELS.to_string(),
            data: TunnelJobResponse {
                operation: JobOperation::Add,
                org: "org-1".to_string(),
                device_a: Uuid::new_v4(),
                device_b: Uuid::new_v4(),
                tunnel_num: 0,
                attempt_id: Uuid::new_v4(),
                side: Side::A,
            },
            options: JobOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_submit_and_complete_emits_event() {
        let (queue, mut rx) = LocalJobQueue::new();

        let first = queue.submit(request("machine-a")).await.unwrap();
        let second = queue.submit(request("machine-b")).await.unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(second.target, "machine-b");
        assert_eq!(queue.pending().len(), 2);

        let data = queue.get(&first.id).unwrap().data;
        assert!(queue.complete(&first.id));
        assert!(!queue.complete(&first.id));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id(), "1");
        assert_eq!(
            TunnelJobResponse::from_value(event.result()).unwrap(),
            data
        );
        assert_eq!(queue.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_target() {
        let (queue, _rx) = LocalJobQueue::new();
        queue.reject_target("machine-a");

        let err = queue.submit(request("machine-a")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { ref target, .. } if target == "machine-a"));

        queue.accept_target("machine-a");
        assert!(queue.submit(request("machine-a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_and_remove_events() {
        let (queue, mut rx) = LocalJobQueue::new();
        let a = queue.submit(request("machine-a")).await.unwrap();
        let b = queue.submit(request("machine-b")).await.unwrap();

        queue.fail(&a.id, "agent exploded");
        queue.remove(&b.id);

        assert!(matches!(
            rx.recv().await.unwrap(),
            JobEvent::Failed { error: Some(ref e), .. } if e == "agent exploded"
        ));
        assert!(matches!(rx.recv().await.unwrap(), JobEvent::Removed { .. }));
    }
}
