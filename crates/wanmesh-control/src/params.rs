//! Deterministic tunnel parameters
//!
//! Every tunnel number maps to a private /31 link, a pair of loopback MACs and
//! a pair of SPIs. Agents already in the field rely on this exact mapping, so
//! the output format must stay bit-for-bit stable.
//!
//! Numbers are laid out in blocks of 127: the block index `l` becomes the third
//! octet and `h = (n mod 127 + 1) * 2` the (always even) fourth octet of side A.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use std::net::Ipv4Addr;

/// Locally-administered prefix of tunnel loopback MACs
pub const MAC_PREFIX: &str = "02:00:27:fd";

const TUNNELS_PER_BLOCK: u32 = 127;

/// Addressing and SA identifiers derived from a tunnel number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelParams {
    pub ip_a: Ipv4Addr,
    pub ip_b: Ipv4Addr,
    pub mac_a: String,
    pub mac_b: String,
    pub sa1: u32,
    pub sa2: u32,
}

impl TunnelParams {
    /// Side A loopback address in `addr/31` form
    pub fn loopback_a(&self) -> String {
        format!("{}/31", self.ip_a)
    }

    /// Side B loopback address in `addr/31` form
    pub fn loopback_b(&self) -> String {
        format!("{}/31", self.ip_b)
    }
}

/// Derive the parameters of tunnel `num`
///
/// `num` must lie below [`crate::MAX_TUNNEL_NUMBERS`]; the allocator never
/// hands out larger values.
pub fn derive_tunnel_params(num: u32) -> TunnelParams {
    let h = (num % TUNNELS_PER_BLOCK + 1) * 2;
    let l = num / TUNNELS_PER_BLOCK;

    let octet_l = (l & 0xff) as u8;
    let octet_h = h as u8;

    let sa1 = (l << 8) + h;

    TunnelParams {
        ip_a: Ipv4Addr::new(10, 100, octet_l, octet_h),
        ip_b: Ipv4Addr::new(10, 100, octet_l, octet_h + 1),
        mac_a: format!("{}:{:02x}:{:02x}", MAC_PREFIX, octet_l, octet_h),
        mac_b: format!("{}:{:02x}:{:02x}", MAC_PREFIX, octet_l, octet_h + 1),
        sa1,
        sa2: sa1 + 1,
    }
}

/// Symmetric keys of one tunnel
///
/// `key1`/`key2` protect the A→B direction (cipher, integrity), `key3`/`key4`
/// the B→A direction. Keys are random and never derived from the number.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelKeys {
    pub key1: String,
    pub key2: String,
    pub key3: String,
    pub key4: String,
}

impl TunnelKeys {
    /// Generate fresh keys from the operating system CSPRNG
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            key1: random_key(rng),
            key2: random_key(rng),
            key3: random_key(rng),
            key4: random_key(rng),
        }
    }
}

impl std::fmt::Debug for TunnelKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelKeys").finish_non_exhaustive()
    }
}

/// 128-bit key, hex encoded
fn random_key<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
