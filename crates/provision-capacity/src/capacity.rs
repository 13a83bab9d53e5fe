//! Host capacity engine.
//!
//! Capacity is computed from an immutable snapshot of all nodes, so every
//! answer is a pure function of the snapshot, the calculator and the
//! arguments. Nothing here takes a lock or caches results.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use provision_inventory::{Node, NodeList, NodeState, NodeType};
use provision_resources::{NodeResources, default_order};
use tracing::{debug, trace, warn};

use crate::address::AddressPolicy;
use crate::calculator::HostResourcesCalculator;
use crate::config::CapacityConfig;
use crate::skew::{SkewWeights, skew};

/// Which children of a host count against its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildFilter {
    /// Every child consumes resources.
    All,
    /// Children that are inactive or hold a retired allocation are treated
    /// as already gone.
    ExcludeInactiveOrRetired,
}

impl ChildFilter {
    pub fn from_exclude_inactive(exclude_inactive: bool) -> Self {
        if exclude_inactive {
            ChildFilter::ExcludeInactiveOrRetired
        } else {
            ChildFilter::All
        }
    }

    /// Whether `child` consumes its parent's resources under this filter.
    pub fn counts(self, child: &Node) -> bool {
        match self {
            ChildFilter::All => true,
            ChildFilter::ExcludeInactiveOrRetired => !is_inactive_or_retired(child),
        }
    }
}

fn is_inactive_or_retired(node: &Node) -> bool {
    node.state == NodeState::Inactive || node.is_retired()
}

/// Capacity queries over one snapshot of the fleet.
#[derive(Clone)]
pub struct HostCapacity {
    nodes: NodeList,
    calculator: Arc<dyn HostResourcesCalculator>,
    addresses: AddressPolicy,
    skew_weights: SkewWeights,
}

impl HostCapacity {
    /// Create an engine over `nodes` with default address and skew policies.
    pub fn new(nodes: NodeList, calculator: Arc<dyn HostResourcesCalculator>) -> Self {
        Self {
            nodes,
            calculator,
            addresses: AddressPolicy::default(),
            skew_weights: SkewWeights::default(),
        }
    }

    /// Create an engine with the calculator and policies from `config`.
    pub fn from_config(nodes: NodeList, config: &CapacityConfig) -> Self {
        Self::new(nodes, config.calculator())
            .with_address_policy(config.addresses)
            .with_skew_weights(config.skew)
    }

    pub fn with_address_policy(mut self, policy: AddressPolicy) -> Self {
        self.addresses = policy;
        self
    }

    pub fn with_skew_weights(mut self, weights: SkewWeights) -> Self {
        self.skew_weights = weights;
        self
    }

    /// The snapshot this engine answers for.
    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    /// Free capacity of `host`, counting every child.
    pub fn free_capacity(&self, host: &Node) -> NodeResources {
        self.free_capacity_of(host, false)
    }

    /// Free capacity of `host`. With `exclude_inactive`, children that are
    /// inactive or retired do not count as using resources.
    ///
    /// Returns the zero vector for nodes that are not of type `host`.
    pub fn free_capacity_of(&self, host: &Node, exclude_inactive: bool) -> NodeResources {
        self.free_capacity_filtered(host, ChildFilter::from_exclude_inactive(exclude_inactive))
    }

    /// Free capacity of `host` counting the children `filter` selects.
    pub fn free_capacity_filtered(&self, host: &Node, filter: ChildFilter) -> NodeResources {
        if host.node_type != NodeType::Host {
            return NodeResources::zero();
        }
        let available = self.calculator.available_capacity_of(&host.flavor);

        // Allocations made before disk speed was tracked may not carry the
        // host's real speed, so subtract without speed and put the host's
        // speed back on the result.
        let free = self
            .nodes
            .children_of(host)
            .filter(|child| filter.counts(child))
            .map(|child| child.flavor.any_speed())
            .fold(available.any_speed(), |acc, used| acc.subtract(&used))
            .with_disk_speed(host.flavor.disk_speed);

        if free.is_overcommitted() {
            warn!(host = %host.hostname, %free, ?filter, "host is over-committed");
        }
        trace!(host = %host.hostname, %free, ?filter, "computed free capacity");
        free
    }

    /// Whether `requested` fits on `host`: enough free resources of a
    /// compatible disk speed and at least one free address.
    pub fn has_capacity(&self, host: &Node, requested: &NodeResources) -> bool {
        debug_assert!(
            requested.validated().is_ok(),
            "invalid resource request {requested}"
        );
        self.free_capacity(host).satisfies(requested) && self.free_ips(host) > 0
    }

    /// Allocation skew of `host` with its current children.
    pub fn skew(&self, host: &Node) -> f64 {
        let free = self.free_capacity(host);
        skew(&host.flavor, &free, &self.skew_weights)
    }

    /// Skew `host` would have after also placing `requested` on it.
    pub fn skew_with(&self, host: &Node, requested: &NodeResources) -> f64 {
        let free = self.free_capacity(host).subtract(&requested.any_speed());
        skew(&host.flavor, &free, &self.skew_weights)
    }

    /// Placement order of two hosts. `Less` means `a` should be tried
    /// first.
    ///
    /// Hosts with more free capacity (not counting inactive or retired
    /// children) come first under the default resource order; equal hosts
    /// are ordered by more free addresses first.
    pub fn compare(&self, a: &Node, b: &Node) -> Ordering {
        self.rank_key(a).cmp_before(&self.rank_key(b))
    }

    /// Free addresses in `host`'s pool. Zero for nodes that are not hosts.
    ///
    /// Never clamped: a negative count means the snapshot has more children
    /// than the pool can address.
    pub fn free_ips(&self, host: &Node) -> i64 {
        if host.node_type != NodeType::Host {
            return 0;
        }
        let children = self.nodes.children_of(host).count();
        let free = self
            .addresses
            .free_addresses(host.ip_pool.len(), children);
        if free < 0 {
            warn!(
                host = %host.hostname,
                pool = host.ip_pool.len(),
                children,
                free,
                "children claim more addresses than the host's pool holds"
            );
        }
        free
    }

    /// The concrete pool addresses of `host` not assigned to any node.
    pub fn unused_addresses(&self, host: &Node) -> BTreeSet<IpAddr> {
        if host.node_type != NodeType::Host {
            return BTreeSet::new();
        }
        host.ip_pool.find_unused(&self.nodes)
    }

    /// Hosts that can take `requested`, best first by [`compare`](Self::compare).
    ///
    /// Hosts that compare equal keep their snapshot order.
    pub fn rank_hosts(&self, requested: &NodeResources) -> Vec<&Node> {
        let mut candidates: Vec<(RankKey, &Node)> = self
            .nodes
            .hosts()
            .filter(|host| self.has_capacity(host, requested))
            .map(|host| (self.rank_key(host), host))
            .collect();
        candidates.sort_by(|(a, _), (b, _)| a.cmp_before(b));

        debug!(
            %requested,
            candidates = candidates.len(),
            best = candidates.first().map(|(_, h)| h.hostname.as_str()),
            "ranked hosts"
        );
        candidates.into_iter().map(|(_, host)| host).collect()
    }

    fn rank_key(&self, host: &Node) -> RankKey {
        RankKey {
            free: self.free_capacity_of(host, true),
            free_ips: self.free_ips(host),
        }
    }
}

/// What [`HostCapacity::compare`] orders hosts by.
struct RankKey {
    free: NodeResources,
    free_ips: i64,
}

impl RankKey {
    /// `Less` when `self` should be tried before `other`.
    fn cmp_before(&self, other: &RankKey) -> Ordering {
        default_order(&other.free, &self.free).then_with(|| other.free_ips.cmp(&self.free_ips))
    }
}
