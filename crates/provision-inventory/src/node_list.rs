//! Immutable point-in-time collection of nodes.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::error::{InventoryError, InventoryResult};
use crate::types::{ApplicationId, Node, NodeState, NodeType};

/// An immutable snapshot of fleet nodes.
///
/// Cloning shares the underlying storage. Insertion order carries no
/// meaning beyond making iteration deterministic.
#[derive(Debug, Clone, Default)]
pub struct NodeList {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: Vec<Node>,
    by_hostname: HashMap<String, usize>,
    /// Parent hostname → indices of its children.
    children: HashMap<String, Vec<usize>>,
}

impl NodeList {
    /// Build a node list, rejecting duplicate hostnames and flavors that
    /// are not finite and non-negative.
    pub fn new(nodes: Vec<Node>) -> InventoryResult<Self> {
        let mut by_hostname = HashMap::with_capacity(nodes.len());
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, node) in nodes.iter().enumerate() {
            node.flavor
                .validated()
                .map_err(|source| InventoryError::InvalidFlavor {
                    hostname: node.hostname.clone(),
                    source,
                })?;

            match by_hostname.entry(node.hostname.clone()) {
                Entry::Occupied(_) => {
                    return Err(InventoryError::DuplicateHostname(node.hostname.clone()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(index);
                }
            }

            if let Some(parent) = &node.parent_hostname {
                children.entry(parent.clone()).or_default().push(index);
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                nodes,
                by_hostname,
                children,
            }),
        })
    }

    /// Decode a JSON array of nodes.
    pub fn from_json(json: &str) -> InventoryResult<Self> {
        let nodes: Vec<Node> =
            serde_json::from_str(json).map_err(|e| InventoryError::Deserialize(e.to_string()))?;
        Self::new(nodes)
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.inner.nodes.iter()
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.inner.nodes
    }

    pub fn get(&self, hostname: &str) -> Option<&Node> {
        self.inner
            .by_hostname
            .get(hostname)
            .map(|&i| &self.inner.nodes[i])
    }

    /// Look up a node that must exist.
    pub fn require(&self, hostname: &str) -> InventoryResult<&Node> {
        self.get(hostname)
            .ok_or_else(|| InventoryError::NodeNotFound(hostname.to_string()))
    }

    /// Look up a node that must exist and be of type `host`.
    pub fn require_host(&self, hostname: &str) -> InventoryResult<&Node> {
        let node = self.require(hostname)?;
        if node.node_type != NodeType::Host {
            return Err(InventoryError::NotAHost(hostname.to_string()));
        }
        Ok(node)
    }

    /// All nodes whose parent hostname is `host`'s hostname.
    pub fn children_of<'a>(&'a self, host: &Node) -> impl Iterator<Item = &'a Node> + use<'a> {
        self.children_of_hostname(&host.hostname)
    }

    /// All nodes whose parent hostname is `hostname`.
    pub fn children_of_hostname<'a>(
        &'a self,
        hostname: &str,
    ) -> impl Iterator<Item = &'a Node> + use<'a> {
        self.inner
            .children
            .get(hostname)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.inner.nodes[i])
    }

    /// Nodes of type `host`.
    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.of_type(NodeType::Host)
    }

    pub fn of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.iter().filter(move |n| n.node_type == node_type)
    }

    pub fn in_state(&self, state: NodeState) -> impl Iterator<Item = &Node> {
        self.iter().filter(move |n| n.state == state)
    }

    /// Nodes allocated to `owner`.
    pub fn owned_by<'a>(&'a self, owner: &'a ApplicationId) -> impl Iterator<Item = &'a Node> + 'a {
        self.iter()
            .filter(move |n| n.allocation.as_ref().is_some_and(|a| &a.owner == owner))
    }

    /// Nodes whose allocation is retired.
    pub fn retired(&self) -> impl Iterator<Item = &Node> {
        self.iter().filter(|n| n.is_retired())
    }

    /// A new list with `node` added, or replacing the node of the same
    /// hostname.
    pub fn with(&self, node: Node) -> InventoryResult<Self> {
        let mut nodes = self.inner.nodes.clone();
        match self.inner.by_hostname.get(&node.hostname) {
            Some(&i) => nodes[i] = node,
            None => nodes.push(node),
        }
        Self::new(nodes)
    }

    /// A new list without the node named `hostname`.
    pub fn without(&self, hostname: &str) -> InventoryResult<Self> {
        if !self.inner.by_hostname.contains_key(hostname) {
            return Err(InventoryError::NodeNotFound(hostname.to_string()));
        }
        let nodes = self
            .iter()
            .filter(|n| n.hostname != hostname)
            .cloned()
            .collect();
        Self::new(nodes)
    }
}

impl PartialEq for NodeList {
    fn eq(&self, other: &Self) -> bool {
        self.inner.nodes == other.inner.nodes
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
