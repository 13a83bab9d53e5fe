//! Error types for the fleet inventory.

use provision_resources::ResourceError;
use thiserror::Error;

/// Result type alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Errors that can occur while building or updating the inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("duplicate hostname in node list: {0}")]
    DuplicateHostname(String),

    #[error("invalid flavor for {hostname}: {source}")]
    InvalidFlavor {
        hostname: String,
        #[source]
        source: ResourceError,
    },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("not a host: {0}")]
    NotAHost(String),

    #[error("failed to decode node list: {0}")]
    Deserialize(String),

    #[error("inventory lock poisoned")]
    LockPoisoned,

    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),

    #[error("lock does not belong to this inventory")]
    ForeignLock,

    #[error("change to {hostname} is outside the held lock ({scope})")]
    OutOfScope { hostname: String, scope: String },

    #[error("snapshot is stale: expected generation {expected}, current is {current}")]
    Conflict { expected: u64, current: u64 },

    #[error("nodes of host {0} changed since the snapshot was taken")]
    HostConflict(String),
}
