//! Device task lists for tunnel setup and teardown
//!
//! Both functions return `(tasks_a, tasks_b)`: one single-group task list per
//! side, where `src` is the side's own address and `dst` the address its peer
//! is reachable at.

use wanmesh_proto::{
    AddTunnelParams, AgentTask, Interface, IpsecParams, LoopbackIface, RemoveTunnelParams,
    SecurityAssociation, TaskGroup,
};

use crate::params::{TunnelKeys, TunnelParams};

/// MTU of the tunnel loopback interface
pub const LOOPBACK_MTU: u16 = 1350;

/// Routing protocol run over the tunnel
pub const LOOPBACK_ROUTING: &str = "ospf";

/// Build the add-tunnel tasks of both sides
pub fn prepare_add(
    num: u32,
    params: &TunnelParams,
    keys: &TunnelKeys,
    iface_a: &Interface,
    iface_b: &Interface,
) -> (Vec<TaskGroup>, Vec<TaskGroup>) {
    let sa_a_to_b = SecurityAssociation::new(params.sa1, &keys.key1, &keys.key2);
    let sa_b_to_a = SecurityAssociation::new(params.sa2, &keys.key3, &keys.key4);

    let side_a = AddTunnelParams {
        src: iface_a.ipv4.clone(),
        dst: iface_b.reachable_address().to_string(),
        tunnel_id: num,
        loopback_iface: loopback(params.loopback_a(), &params.mac_a),
        ipsec: IpsecParams {
            local_sa: sa_a_to_b.clone(),
            remote_sa: sa_b_to_a.clone(),
        },
    };

    // Deployed B-side agents expect the A naming mirrored.
    let side_b = AddTunnelParams {
        src: iface_b.ipv4.clone(),
        dst: iface_a.reachable_address().to_string(),
        tunnel_id: num,
        loopback_iface: loopback(params.loopback_b(), &params.mac_b),
        ipsec: IpsecParams {
            local_sa: sa_b_to_a,
            remote_sa: sa_a_to_b,
        },
    };

    (
        vec![vec![AgentTask::AddTunnel(side_a)]],
        vec![vec![AgentTask::AddTunnel(side_b)]],
    )
}

/// Build the remove-tunnel tasks of both sides
///
/// Teardown never carries key material.
pub fn prepare_remove(
    num: u32,
    params: &TunnelParams,
    iface_a: &Interface,
    iface_b: &Interface,
) -> (Vec<TaskGroup>, Vec<TaskGroup>) {
    let side_a = RemoveTunnelParams {
        src: iface_a.ipv4.clone(),
        dst: iface_b.reachable_address().to_string(),
        tunnel_id: num,
        loopback_iface: LoopbackIface {
            addr: params.loopback_a(),
            mac: params.mac_a.clone(),
            mtu: None,
            routing: None,
        },
    };
    let side_b = RemoveTunnelParams {
        src: iface_b.ipv4.clone(),
        dst: iface_a.reachable_address().to_string(),
        tunnel_id: num,
        loopback_iface: LoopbackIface {
            addr: params.loopback_b(),
            mac: params.mac_b.clone(),
            mtu: None,
            routing: None,
        },
    };

    (
        vec![vec![AgentTask::RemoveTunnel(side_a)]],
        vec![vec![AgentTask::RemoveTunnel(side_b)]],
    )
}

fn loopback(addr: String, mac: &str) -> LoopbackIface {
    LoopbackIface {
        addr,
        mac: mac.to_string(),
        mtu: Some(LOOPBACK_MTU),
        routing: Some(LOOPBACK_ROUTING.to_string()),
    }
}
