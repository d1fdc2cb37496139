//! Control plane configuration
//!
//! Every field has a default so a partial YAML file (or none at all) yields a
//! working configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use wanmesh_proto::JobOptions;

use crate::allocator::TUNNEL_ID_CAPACITY;

/// How failed tunnel creations are rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackPolicy {
    /// Attempts before the tunnel is parked in the dead-letter queue
    pub max_attempts: u32,
    /// Base delay; doubles after every failed attempt
    pub backoff_ms: u64,
}

impl RollbackPolicy {
    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(10);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub database_url: String,

    /// Tunnel numbers available to each organization
    pub tunnel_capacity: u32,

    /// Requester recorded on jobs the control plane issues by itself
    pub system_requester: String,

    pub job: JobOptions,

    pub rollback: RollbackPolicy,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./wanmesh.db?mode=rwc".to_string(),
            tunnel_capacity: TUNNEL_ID_CAPACITY,
            system_requester: "system".to_string(),
            job: JobOptions::default(),
            rollback: RollbackPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: MeshConfig =
            serde_json::from_str(r#"{ "tunnel_capacity": 10, "rollback": { "max_attempts": 5 } }"#)
                .unwrap();

        assert_eq!(config.tunnel_capacity, 10);
        assert_eq!(config.rollback.max_attempts, 5);
        assert_eq!(config.rollback.backoff_ms, 500);
        assert_eq!(config.job.attempts, 1);
        assert_eq!(config.system_requester, "system");
    }

    #[test]
    fn test_rollback_backoff_doubles() {
        let policy = RollbackPolicy {
            max_attempts: 4,
            backoff_ms: 100,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }
}
