//! Control plane for tunnel mesh orchestration
pub mod allocator;
pub mod config;
pub mod dead_letter;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod fleet;
pub mod lifecycle;
pub mod pair_locks;
pub mod params;
pub mod preparer;
pub mod store;

pub use allocator::{AllocationError, TunnelIdAllocator, MAX_TUNNEL_NUMBERS, TUNNEL_ID_CAPACITY};
pub use config::{MeshConfig, RollbackPolicy};
pub use dead_letter::{DeadLetter, DeadLetterStore};
pub use delivery::{DeliveryError, JobHandle, JobQueue, LocalJobQueue};
pub use dispatcher::{DeviceJob, DispatchFailure, DispatchSummary, Dispatcher};
pub use error::MeshError;
pub use fleet::{
    DbDeviceFleet, DeviceFleet, FleetError, InMemoryDeviceFleet, MajorVersionPolicy,
    VersionPolicy,
};
pub use lifecycle::{CreatedTunnel, MeshAddSummary, TunnelDelSummary, TunnelLifecycle};
pub use pair_locks::{PairGuard, PairLocks};
pub use params::{derive_tunnel_params, TunnelKeys, TunnelParams};
pub use store::{NewTunnel, TunnelStore};
