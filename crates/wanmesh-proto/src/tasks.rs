//! Agent task payloads
//!
//! A job carries a list of task groups; each group is an ordered list of
//! `{"entity": "agent", "message": ..., "params": {...}}` objects that the edge
//! agent executes in order. The JSON shape is consumed by deployed agents and
//! must not change.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Cipher used for both tunnel security associations
pub const CRYPTO_ALG: &str = "aes-cbc-128";

/// Integrity algorithm used for both tunnel security associations
pub const INTEGR_ALG: &str = "sha-256-128";

const AGENT_ENTITY: &str = "agent";

/// An ordered list of tasks executed together by the agent
pub type TaskGroup = Vec<AgentTask>;

/// Loopback interface backing the tunnel on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopbackIface {
    /// Tunnel address with prefix length, e.g. `10.100.0.2/31`
    pub addr: String,
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
}

/// One direction of an IPsec tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityAssociation {
    pub spi: u32,
    pub crypto_key: String,
    pub integr_key: String,
    pub crypto_alg: String,
    pub integr_alg: String,
}

impl SecurityAssociation {
    /// Security association using the fixed tunnel algorithms
    pub fn new(spi: u32, crypto_key: impl Into<String>, integr_key: impl Into<String>) -> Self {
        Self {
            spi,
            crypto_key: crypto_key.into(),
            integr_key: integr_key.into(),
            crypto_alg: CRYPTO_ALG.to_string(),
            integr_alg: INTEGR_ALG.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IpsecParams {
    pub local_sa: SecurityAssociation,
    pub remote_sa: SecurityAssociation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AddTunnelParams {
    pub src: String,
    pub dst: String,
    pub tunnel_id: u32,
    pub loopback_iface: LoopbackIface,
    pub ipsec: IpsecParams,
}

/// Teardown is keyed by tunnel identity, so no secrets are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoveTunnelParams {
    pub src: String,
    pub dst: String,
    pub tunnel_id: u32,
    pub loopback_iface: LoopbackIface,
}

/// Application definitions are opaque to the tunnel engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApplicationParams {
    #[serde(default)]
    pub applications: Vec<serde_json::Value>,
}

/// A single task for the edge agent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTask")]
pub enum AgentTask {
    AddTunnel(AddTunnelParams),
    RemoveTunnel(RemoveTunnelParams),
    AddApplication(ApplicationParams),
    RemoveApplication(ApplicationParams),
}

impl AgentTask {
    /// The `message` discriminator on the wire
    pub fn message(&self) -> &'static str {
        match self {
            AgentTask::AddTunnel(_) => "add-tunnel",
            AgentTask::RemoveTunnel(_) => "remove-tunnel",
            AgentTask::AddApplication(_) => "add-application",
            AgentTask::RemoveApplication(_) => "remove-application",
        }
    }
}

impl Serialize for AgentTask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AgentTask", 3)?;
        state.serialize_field("entity", AGENT_ENTITY)?;
        state.serialize_field("message", self.message())?;
        match self {
            AgentTask::AddTunnel(params) => state.serialize_field("params", params)?,
            AgentTask::RemoveTunnel(params) => state.serialize_field("params", params)?,
            AgentTask::AddApplication(params) | AgentTask::RemoveApplication(params) => {
                state.serialize_field("params", params)?
            }
        }
        state.end()
    }
}

/// Errors decoding a task received in untyped form
#[derive(Error, Debug)]
pub enum TaskDecodeError {
    #[error("unsupported task entity: {0}")]
    UnknownEntity(String),

    #[error("unsupported task message: {0}")]
    UnknownMessage(String),

    #[error("invalid params for {message}: {source}")]
    InvalidParams {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawTask {
    entity: String,
    message: String,
    #[serde(default)]
    params: serde_json::Value,
}

impl TryFrom<RawTask> for AgentTask {
    type Error = TaskDecodeError;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        if raw.entity != AGENT_ENTITY {
            return Err(TaskDecodeError::UnknownEntity(raw.entity));
        }

        let invalid = |source| TaskDecodeError::InvalidParams {
            message: raw.message.clone(),
            source,
        };

        match raw.message.as_str() {
            "add-tunnel" => serde_json::from_value(raw.params.clone())
                .map(AgentTask::AddTunnel)
                .map_err(invalid),
            "remove-tunnel" => serde_json::from_value(raw.params.clone())
                .map(AgentTask::RemoveTunnel)
                .map_err(invalid),
            "add-application" => serde_json::from_value(raw.params.clone())
                .map(AgentTask::AddApplication)
                .map_err(invalid),
            "remove-application" => serde_json::from_value(raw.params.clone())
                .map(AgentTask::RemoveApplication)
                .map_err(invalid),
            other => Err(TaskDecodeError::UnknownMessage(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn remove_task() -> AgentTask {
        AgentTask::RemoveTunnel(RemoveTunnelParams {
            src: "192.168.1.2".to_string(),
            dst: "203.0.113.9".to_string(),
            tunnel_id: 7,
            loopback_iface: LoopbackIface {
                addr: "10.100.0.16/31".to_string(),
                mac: "02:00:27:fd:00:10".to_string(),
                mtu: None,
                routing: None,
            },
        })
    }

    #[test]
    fn test_remove_tunnel_wire_shape() {
        let value = serde_json::to_value(remove_task()).unwrap();
        assert_eq!(
            value,
            json!({
                "entity": "agent",
                "message": "remove-tunnel",
                "params": {
                    "src": "192.168.1.2",
                    "dst": "203.0.113.9",
                    "tunnel-id": 7,
                    "loopback-iface": {
                        "addr": "10.100.0.16/31",
                        "mac": "02:00:27:fd:00:10"
                    }
                }
            })
        );
    }

    #[test]
    fn test_add_tunnel_ipsec_keys_are_kebab_case() {
        let task = AgentTask::AddTunnel(AddTunnelParams {
            src: "192.168.1.2".to_string(),
            dst: "192.168.2.2".to_string(),
            tunnel_id: 0,
            loopback_iface: LoopbackIface {
                addr: "10.100.0.2/31".to_string(),
                mac: "02:00:27:fd:00:02".to_string(),
                mtu: Some(1350),
                routing: Some("ospf".to_string()),
            },
            ipsec: IpsecParams {
                local_sa: SecurityAssociation::new(2, "aa", "bb"),
                remote_sa: SecurityAssociation::new(3, "cc", "dd"),
            },
        });

        let value = serde_json::to_value(&task).unwrap();
        let sa = &value["params"]["ipsec"]["local-sa"];
        assert_eq!(sa["spi"], 2);
        assert_eq!(sa["crypto-alg"], "aes-cbc-128");
        assert_eq!(sa["integr-alg"], "sha-256-128");
        assert_eq!(sa["crypto-key"], "aa");
        assert_eq!(value["params"]["loopback-iface"]["mtu"], 1350);

        let decoded: AgentTask = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn test_application_task_decodes() {
        let task: AgentTask = serde_json::from_value(json!({
            "entity": "agent",
            "message": "add-application",
            "params": { "applications": [{ "name": "voip" }] }
        }))
        .unwrap();

        assert_eq!(task.message(), "add-application");
    }

    #[test]
    fn test_unknown_message_rejected() {
        let result: Result<AgentTask, _> = serde_json::from_value(json!({
            "entity": "agent",
            "message": "reboot",
            "params": {}
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unsupported task message"), "{}", err);
    }

    #[test]
    fn test_foreign_entity_rejected() {
        let result: Result<AgentTask, _> = serde_json::from_value(json!({
            "entity": "router",
            "message": "remove-tunnel",
            "params": {}
        }));
        assert!(result.is_err());
    }
}
