//! Host resources calculators.
//!
//! A host does not give its whole flavor to guests: the host OS and the
//! container runtime keep a share. A calculator maps the nominal flavor to
//! what is actually available for children. Implementations must be pure
//! and deterministic; the engine calls them on every query.

use provision_resources::NodeResources;

/// Maps a host's nominal flavor to the resources available to its children.
pub trait HostResourcesCalculator: Send + Sync {
    fn available_capacity_of(&self, flavor: &NodeResources) -> NodeResources;
}

impl<F> HostResourcesCalculator for F
where
    F: Fn(&NodeResources) -> NodeResources + Send + Sync,
{
    fn available_capacity_of(&self, flavor: &NodeResources) -> NodeResources {
        self(flavor)
    }
}

/// No host overhead: the whole flavor is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCalculator;

impl HostResourcesCalculator for IdentityCalculator {
    fn available_capacity_of(&self, flavor: &NodeResources) -> NodeResources {
        *flavor
    }
}

/// Keeps a fixed share of every host for itself.
///
/// Components never drop below zero; the disk speed of the flavor is kept.
#[derive(Debug, Clone, Copy)]
pub struct ReservedCalculator {
    reserved: NodeResources,
}

impl ReservedCalculator {
    pub fn new(reserved: NodeResources) -> Self {
        Self { reserved }
    }

    pub fn reserved(&self) -> &NodeResources {
        &self.reserved
    }
}

impl HostResourcesCalculator for ReservedCalculator {
    fn available_capacity_of(&self, flavor: &NodeResources) -> NodeResources {
        let r = &self.reserved;
        NodeResources::new(
            (flavor.vcpu - r.vcpu).max(0.0),
            (flavor.memory_gb - r.memory_gb).max(0.0),
            (flavor.disk_gb - r.disk_gb).max(0.0),
            (flavor.bandwidth_gbps - r.bandwidth_gbps).max(0.0),
            flavor.disk_speed,
        )
    }
}
