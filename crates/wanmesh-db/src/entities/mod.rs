//! Database entities

pub mod dead_letter;
pub mod device;
pub mod tunnel;
pub mod tunnel_counter;

pub use dead_letter::Entity as DeadLetter;
pub use device::Entity as Device;
pub use tunnel::Entity as Tunnel;
pub use tunnel_counter::Entity as TunnelCounter;

pub mod prelude {
    pub use super::dead_letter::Entity as DeadLetter;
    pub use super::device::Entity as Device;
    pub use super::tunnel::Entity as Tunnel;
    pub use super::tunnel_counter::Entity as TunnelCounter;
}
