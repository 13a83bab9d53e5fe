//! provision-capacity: spare capacity accounting for container hosts.
//!
//! Given an immutable [`NodeList`](provision_inventory::NodeList) and a
//! [`HostResourcesCalculator`], [`HostCapacity`] answers the questions a
//! placement algorithm asks about each host: how much is free, does a
//! request fit, how unevenly is the host filled, how many addresses are
//! left, and which host should be tried first.
//!
//! The engine holds no locks and no mutable state. Callers that act on its
//! answers do so under an [`InventoryLock`](provision_inventory::InventoryLock).
//!
//! # Components
//!
//! - **`calculator`**: host overhead: flavor resources → guest-available resources
//! - **`capacity`**: the engine (free capacity, fit, compare, ranking)
//! - **`skew`**: allocation skew policy
//! - **`address`**: address pool accounting policy
//! - **`config`**: TOML configuration of the policies above

pub mod address;
pub mod calculator;
pub mod capacity;
pub mod config;
pub mod skew;

pub use address::AddressPolicy;
pub use calculator::{HostResourcesCalculator, IdentityCalculator, ReservedCalculator};
pub use capacity::{ChildFilter, HostCapacity};
pub use config::{CapacityConfig, OverheadConfig};
pub use skew::{SkewWeights, skew};
