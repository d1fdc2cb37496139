//! Paired job submission
//!
//! Turns per-device task lists into job requests, submits them concurrently
//! and reports which sides were accepted. Only acceptance is awaited; job
//! outcomes arrive later as events.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use wanmesh_proto::{
    JobOptions, JobRequest, Side, TaskGroup, TunnelJobResponse, JOB_METHOD_TUNNELS,
};

use crate::delivery::{DeliveryError, JobHandle, JobQueue};

/// One job for one side of a tunnel
#[derive(Debug, Clone)]
pub struct DeviceJob {
    /// Machine id of the target agent
    pub target: String,
    pub device_id: Uuid,
    pub title: String,
    pub tasks: Vec<TaskGroup>,
    pub response: TunnelJobResponse,
}

#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub device_id: Uuid,
    pub side: Side,
    pub error: DeliveryError,
}

/// Per-side acceptance of a batch of jobs
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub accepted: Vec<(Side, JobHandle)>,
    pub rejected: Vec<DispatchFailure>,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    options: JobOptions,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, options: JobOptions) -> Self {
        Self { queue, options }
    }

    pub async fn submit(&self, org: &str, requester: &str, jobs: Vec<DeviceJob>) -> DispatchSummary {
        let submissions = jobs.into_iter().map(|job| {
            let side = job.response.side;
            let device_id = job.device_id;
            let request = JobRequest {
                target: job.target,
                requester: requester.to_string(),
                org: org.to_string(),
                title: job.title,
                tasks: job.tasks,
                method: JOB_METHOD_TUNNELS.to_string(),
                data: job.response,
                options: self.options.clone(),
            };
            let queue = self.queue.clone();

            async move { (side, device_id, queue.submit(request).await) }
        });

        let mut summary = DispatchSummary::default();
        for (side, device_id, result) in join_all(submissions).await {
            match result {
                Ok(handle) => {
                    debug!(job_id = %handle.id, device_id = %device_id, side = %side, "Job dispatched");
                    summary.accepted.push((side, handle));
                }
                Err(error) => {
                    warn!(device_id = %device_id, side = %side, "Job dispatch failed: {}", error);
                    summary.rejected.push(DispatchFailure {
                        device_id,
                        side,
                        error,
                    });
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::LocalJobQueue;
    use wanmesh_proto::{JobOperation, JobPriority};

    fn job(target: &str, side: Side) -> DeviceJob {
        DeviceJob {
            target: target.to_string(),
            device_id: Uuid::new_v4(),
            title: "Add tunnel".to_string(),
            tasks: Vec::new(),
            response: TunnelJobResponse {
                operation: JobOperation::Add,
                org: "org-1".to_string(),
                device_a: Uuid::new_v4(),
                device_b: Uuid::new_v4(),
                tunnel_num: 1,
                attempt_id: Uuid::new_v4(),
                side,
            },
        }
    }

    #[tokio::test]
    async fn test_submit_builds_requests() {
        let (queue, _rx) = LocalJobQueue::new();
        let queue = Arc::new(queue);
        let options = JobOptions {
            priority: JobPriority::Normal,
            attempts: 2,
            remove_on_complete: true,
        };
        let dispatcher = Dispatcher::new(queue.clone(), options.clone());

        let summary = dispatcher
            .submit("org-1", "user-1", vec![job("m-a", Side::A), job("m-b", Side::B)])
            .await;

        assert!(summary.all_accepted());
        assert_eq!(summary.total(), 2);

        let pending = queue.pending();
        assert_eq!(pending.len(), 2);
        for (_, request) in pending {
            assert_eq!(request.method, "tunnels");
            assert_eq!(request.requester, "user-1");
            assert_eq!(request.options, options);
        }
    }

    #[tokio::test]
    async fn test_partial_acceptance() {
        let (queue, _rx) = LocalJobQueue::new();
        queue.reject_target("m-b");
        let dispatcher = Dispatcher::new(Arc::new(queue), JobOptions::default());

        let summary = dispatcher
            .submit("org-1", "user-1", vec![job("m-a", Side::A), job("m-b", Side::B)])
            .await;

        assert!(!summary.all_accepted());
        assert_eq!(summary.accepted_count(), 1);
        assert_eq!(summary.accepted[0].0, Side::A);
        assert_eq!(summary.rejected[0].side, Side::B);
    }
}
