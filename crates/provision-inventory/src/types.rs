//! Domain types for the fleet inventory.
//!
//! These types describe nodes (bare hosts and the containers running on
//! them), the workload allocated to a node and its cluster membership. All
//! types are serializable to/from JSON so snapshots can be decoded from the
//! provisioning service.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use provision_resources::NodeResources;
use serde::{Deserialize, Serialize};

use crate::ip_pool::IpPool;

/// Unique hostname of a node.
pub type Hostname = String;

// ── Node type and state ───────────────────────────────────────────

/// Role of a node in the fleet. Only [`NodeType::Host`] carries spare
/// capacity for tenant containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Host,
    Tenant,
    Proxy,
    ProxyHost,
    Config,
    ConfigHost,
    Controller,
    ControllerHost,
}

impl NodeType {
    /// Whether nodes of this type run other nodes as children.
    pub fn is_docker_host(self) -> bool {
        matches!(
            self,
            NodeType::Host | NodeType::ProxyHost | NodeType::ConfigHost | NodeType::ControllerHost
        )
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Provisioned,
    Ready,
    Reserved,
    Active,
    Inactive,
    Parked,
    Failed,
    Dirty,
    Deprovisioned,
}

impl NodeState {
    /// States in which a node normally carries an allocation.
    pub fn is_allocated(self) -> bool {
        matches!(self, NodeState::Reserved | NodeState::Active | NodeState::Inactive)
    }
}

// ── Allocation ────────────────────────────────────────────────────

/// Owner of an allocation: `tenant:application:instance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    pub tenant: String,
    pub application: String,
    pub instance: String,
}

impl ApplicationId {
    pub fn new(tenant: &str, application: &str, instance: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            application: application.to_string(),
            instance: instance.to_string(),
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.application, self.instance)
    }
}

/// Kind of cluster a node is a member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    Admin,
    Container,
    Content,
    Combined,
}

/// A node's membership in an application cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub cluster_type: ClusterType,
    pub cluster_id: String,
    /// Content group index, when the cluster is grouped.
    #[serde(default)]
    pub group: Option<u32>,
    /// Scheduled for removal from the cluster but not yet reclaimed.
    #[serde(default)]
    pub retired: bool,
}

impl Membership {
    pub fn new(cluster_type: ClusterType, cluster_id: &str) -> Self {
        Self {
            cluster_type,
            cluster_id: cluster_id.to_string(),
            group: None,
            retired: false,
        }
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }

    /// Copy of this membership marked as retired.
    pub fn retire(mut self) -> Self {
        self.retired = true;
        self
    }
}

/// The workload currently allocated to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub owner: ApplicationId,
    pub membership: Membership,
}

impl Allocation {
    pub fn new(owner: ApplicationId, membership: Membership) -> Self {
        Self { owner, membership }
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A machine or container in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: Hostname,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub state: NodeState,
    /// Full nominal resources of the node as provisioned.
    pub flavor: NodeResources,
    /// Host this node runs on; `None` for bare hosts.
    #[serde(default)]
    pub parent_hostname: Option<Hostname>,
    #[serde(default)]
    pub allocation: Option<Allocation>,
    /// Addresses assigned to this node itself.
    #[serde(default)]
    pub ip_addresses: BTreeSet<IpAddr>,
    /// Addresses this node hands out to its children. Hosts only.
    #[serde(default)]
    pub ip_pool: IpPool,
}

impl Node {
    /// A bare host in `ready` state with an empty address pool.
    pub fn host(hostname: &str, flavor: NodeResources) -> Self {
        Self::new(hostname, NodeType::Host, flavor)
    }

    /// A tenant container running on `parent`.
    pub fn child(hostname: &str, parent: &str, flavor: NodeResources) -> Self {
        let mut node = Self::new(hostname, NodeType::Tenant, flavor);
        node.parent_hostname = Some(parent.to_string());
        node
    }

    pub fn new(hostname: &str, node_type: NodeType, flavor: NodeResources) -> Self {
        Self {
            hostname: hostname.to_string(),
            node_type,
            state: NodeState::Ready,
            flavor,
            parent_hostname: None,
            allocation: None,
            ip_addresses: BTreeSet::new(),
            ip_pool: IpPool::default(),
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = Some(allocation);
        self
    }

    pub fn with_ip_addresses(mut self, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        self.ip_addresses = addresses.into_iter().collect();
        self
    }

    pub fn with_ip_pool(mut self, pool: IpPool) -> Self {
        self.ip_pool = pool;
        self
    }

    /// Allocate this node to `owner` and mark it active.
    pub fn allocate(self, owner: ApplicationId, membership: Membership) -> Self {
        self.with_allocation(Allocation::new(owner, membership))
            .with_state(NodeState::Active)
    }

    /// Whether the allocation on this node is retired.
    pub fn is_retired(&self) -> bool {
        self.allocation
            .as_ref()
            .is_some_and(|a| a.membership.retired)
    }

    /// The host whose lock covers changes to this node: its parent, or
    /// itself for bare hosts.
    pub fn lock_owner(&self) -> &str {
        self.parent_hostname.as_deref().unwrap_or(&self.hostname)
    }
}
