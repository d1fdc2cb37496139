//! Wire types shared by the mesh control plane
//!
//! This crate defines the device model read from the fleet, the task payloads
//! executed by edge agents, and the job envelopes exchanged with the external
//! job-delivery system.

pub mod device;
pub mod jobs;
pub mod tasks;

pub use device::{Device, DeviceVersions, Interface, InterfaceKind};
pub use jobs::{
    JobEvent, JobOperation, JobOptions, JobPriority, JobRequest, MalformedCallback, Side,
    TunnelJobResponse, JOB_METHOD_TUNNELS,
};
pub use tasks::{
    AddTunnelParams, AgentTask, ApplicationParams, IpsecParams, LoopbackIface, RemoveTunnelParams,
    SecurityAssociation, TaskDecodeError, TaskGroup, CRYPTO_ALG, INTEGR_ALG,
};
