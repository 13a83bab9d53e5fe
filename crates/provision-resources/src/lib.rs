//! provision-resources: compute resource vectors for fleet accounting.
//!
//! A [`NodeResources`] value describes a quantity of vcpu, memory, disk and
//! network bandwidth together with a disk-speed class. Values are plain
//! `Copy` data: arithmetic never clamps, so an over-committed host shows up
//! as a negative component rather than being hidden.
//!
//! # Components
//!
//! - **`resources`**: the resource vector and its operators
//! - **`order`**: the default ranking order over resource vectors
//! - **`error`**: validation errors for caller-supplied vectors

pub mod error;
pub mod order;
pub mod resources;

pub use error::{ResourceError, ResourceResult};
pub use order::default_order;
pub use resources::{DiskSpeed, NodeResources};
