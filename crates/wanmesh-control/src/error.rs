//! Errors surfaced by mesh operations

use sea_orm::DbErr;
use thiserror::Error;

use crate::allocator::AllocationError;
use crate::delivery::DeliveryError;
use crate::fleet::FleetError;

/// Errors returned by the tunnel lifecycle entry points
#[derive(Error, Debug)]
pub enum MeshError {
    /// The request itself is unusable (device count, tunnel selection)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Two selected devices cannot build tunnels with each other
    #[error("Incompatible versions between {host_a} ({version_a}) and {host_b} ({version_b})")]
    IncompatibleVersions {
        host_a: String,
        version_a: String,
        host_b: String,
        version_b: String,
    },

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("Store error: {0}")]
    Store(#[from] DbErr),

    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl MeshError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        MeshError::Validation(message.into())
    }
}
