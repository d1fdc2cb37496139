//! JSON-lines job spool
//!
//! Accepted jobs are appended to a spool file, one `{"job_id", "request"}`
//! object per line, for the external broker to pick up. Job outcomes are fed
//! back with `wanmesh event`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use wanmesh_control::{DeliveryError, JobHandle, JobQueue};
use wanmesh_proto::JobRequest;

/// One spooled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolEntry {
    pub job_id: String,
    pub request: JobRequest,
}

#[derive(Debug)]
pub struct SpoolJobQueue {
    path: PathBuf,
    // Keeps concurrent submissions from interleaving lines
    write_lock: Mutex<()>,
}

impl SpoolJobQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }
}

#[async_trait]
impl JobQueue for SpoolJobQueue {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, DeliveryError> {
        let target = request.target.clone();
        let entry = SpoolEntry {
            job_id: Uuid::new_v4().to_string(),
            request,
        };

        let line = serde_json::to_string(&entry).map_err(|e| DeliveryError::Rejected {
            target: target.clone(),
            reason: e.to_string(),
        })?;
        self.append(&line).await.map_err(|e| {
            DeliveryError::Unavailable(format!("spool {:?}: {}", self.path, e))
        })?;

        debug!(job_id = %entry.job_id, target = %target, "Job spooled");
        Ok(JobHandle {
            id: entry.job_id,
            target,
        })
    }
}
