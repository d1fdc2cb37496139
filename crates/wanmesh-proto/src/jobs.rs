//! Job envelopes exchanged with the job-delivery system

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::tasks::TaskGroup;

/// Response method under which tunnel job results are routed back
pub const JOB_METHOD_TUNNELS: &str = "tunnels";

/// Which tunnel operation a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOperation {
    Add,
    Del,
}

/// Which end of the tunnel a job configures
///
/// Serialized as the name of the confirmation flag the job sets on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "deviceAconf")]
    A,
    #[serde(rename = "deviceBconf")]
    B,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// Correlation payload attached to every tunnel job and echoed back in callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelJobResponse {
    pub operation: JobOperation,
    pub org: String,
    pub device_a: Uuid,
    pub device_b: Uuid,
    pub tunnel_num: u32,
    /// Setup attempt of the tunnel record the job was issued for
    pub attempt_id: Uuid,
    #[serde(rename = "target")]
    pub side: Side,
}

/// A callback result that cannot be correlated to a tunnel
#[derive(Error, Debug)]
pub enum MalformedCallback {
    #[error("malformed job result: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("job result is missing {0}")]
    Missing(&'static str),
}

impl TunnelJobResponse {
    /// Decode the raw result handed back by the delivery system
    pub fn from_value(value: &serde_json::Value) -> Result<Self, MalformedCallback> {
        let response: TunnelJobResponse = serde_json::from_value(value.clone())?;
        if response.org.trim().is_empty() {
            return Err(MalformedCallback::Missing("org"));
        }
        if response.device_a.is_nil() {
            return Err(MalformedCallback::Missing("deviceA"));
        }
        if response.device_b.is_nil() {
            return Err(MalformedCallback::Missing("deviceB"));
        }
        Ok(response)
    }

    /// The device this job was sent to
    pub fn target_device(&self) -> Uuid {
        match self.side {
            Side::A => self.device_a,
            Side::B => self.device_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    Normal,
    #[default]
    High,
}

/// Delivery options passed through to the job-delivery system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    pub priority: JobPriority,
    pub attempts: u32,
    pub remove_on_complete: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: JobPriority::High,
            attempts: 1,
            remove_on_complete: false,
        }
    }
}

/// A job submitted for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Machine id of the device agent
    pub target: String,
    pub requester: String,
    pub org: String,
    pub title: String,
    pub tasks: Vec<TaskGroup>,
    pub method: String,
    pub data: TunnelJobResponse,
    pub options: JobOptions,
}

/// Terminal outcome of a job, reported by the delivery system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobEvent {
    Completed {
        job_id: String,
        result: serde_json::Value,
    },
    Failed {
        job_id: String,
        result: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Cancelled or expired before execution
    Removed {
        job_id: String,
        result: serde_json::Value,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Removed { job_id, .. } => job_id,
        }
    }

    pub fn result(&self) -> &serde_json::Value {
        match self {
            JobEvent::Completed { result, .. }
            | JobEvent::Failed { result, .. }
            | JobEvent::Removed { result, .. } => result,
        }
    }
}
