//! provision-inventory: the fleet inventory as seen by capacity accounting.
//!
//! # Architecture
//!
//! A [`NodeList`] is an immutable, point-in-time view of every node in the
//! fleet. It is cheap to clone (`Arc` inside) and indexes children by parent
//! hostname so per-host queries only touch that host's children.
//!
//! [`Inventory`] holds the current snapshot and the writer locks. Readers
//! take a [`Snapshot`] and never block writers; writers take a host or
//! fleet lock, compute the next node list and [`publish`](Inventory::publish)
//! it while still holding the lock.

pub mod error;
pub mod ip_pool;
pub mod node_list;
pub mod store;
pub mod types;

pub use error::{InventoryError, InventoryResult};
pub use ip_pool::IpPool;
pub use node_list::NodeList;
pub use store::{Inventory, InventoryLock, LockScope, Snapshot};
pub use types::*;
