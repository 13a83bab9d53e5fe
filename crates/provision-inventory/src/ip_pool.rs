//! Routable address pool owned by a host.

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::node_list::NodeList;

/// The fixed set of addresses a host hands out to its children.
///
/// Assigned at provisioning time and never changed by capacity accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpPool {
    addresses: BTreeSet<IpAddr>,
}

impl IpPool {
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn contains(&self, address: &IpAddr) -> bool {
        self.addresses.contains(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addresses.iter()
    }

    /// Pool addresses not assigned to any node in `nodes`, in address order.
    pub fn find_unused(&self, nodes: &NodeList) -> BTreeSet<IpAddr> {
        let mut unused = self.addresses.clone();
        for node in nodes.iter() {
            for address in &node.ip_addresses {
                unused.remove(address);
            }
        }
        unused
    }
}

impl FromIterator<IpAddr> for IpPool {
    fn from_iter<T: IntoIterator<Item = IpAddr>>(iter: T) -> Self {
        Self::new(iter)
    }
}
