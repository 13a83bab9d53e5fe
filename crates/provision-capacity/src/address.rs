//! Address pool accounting.
//!
//! Free addresses are derived from the snapshot on every call: the size of
//! the host's pool minus what its children claim. Nothing is stored, so the
//! count always agrees with the children in the snapshot.

use serde::{Deserialize, Serialize};

/// How many pool addresses each child of a host claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressPolicy {
    pub per_child: u32,
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self { per_child: 1 }
    }
}

impl AddressPolicy {
    pub fn new(per_child: u32) -> Self {
        Self { per_child }
    }

    /// Free addresses in a pool of `pool_size` shared by `children`.
    ///
    /// Negative when the children claim more than the pool holds. That is
    /// an upstream consistency bug and is returned as-is for the caller to
    /// act on.
    pub fn free_addresses(&self, pool_size: usize, children: usize) -> i64 {
        pool_size as i64 - children as i64 * i64::from(self.per_child)
    }
}
