//! Operator tooling for the wanmesh control plane

pub mod config;
pub mod spool;
