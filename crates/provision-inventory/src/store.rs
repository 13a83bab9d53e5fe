//! Inventory: the current node snapshot and the writer locks around it.
//!
//! Readers call [`Inventory::snapshot`] and work on an immutable
//! [`NodeList`] for as long as they like. Writers serialize through
//! [`InventoryLock`]s: either one host (covering the host and its children)
//! or the whole fleet. A lock is released when its guard is dropped, so
//! every exit path of a writer releases it, including early returns and
//! panics.
//!
//! A queued fleet writer holds off new host locks until it has run, so a
//! steady stream of host writers cannot starve it. A thread must therefore
//! not wait for a second lock while holding one.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::error::{InventoryError, InventoryResult};
use crate::node_list::NodeList;
use crate::types::Node;

/// What an [`InventoryLock`] covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// Every node. Excludes all host locks.
    Fleet,
    /// One host and the nodes whose parent it is.
    Host(String),
}

impl LockScope {
    pub fn host(hostname: &str) -> Self {
        LockScope::Host(hostname.to_string())
    }

    /// Whether a change to a node owned by `lock_owner` is covered.
    fn covers(&self, lock_owner: &str) -> bool {
        match self {
            LockScope::Fleet => true,
            LockScope::Host(h) => h == lock_owner,
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Fleet => f.write_str("fleet"),
            LockScope::Host(h) => write!(f, "host {h}"),
        }
    }
}

/// A published node list together with its generation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    nodes: NodeList,
}

impl Snapshot {
    /// Monotonically increasing publication counter, starting at 0.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    pub fn into_nodes(self) -> NodeList {
        self.nodes
    }
}

#[derive(Debug, Default)]
struct LockTable {
    fleet: bool,
    /// Fleet writers blocked in `acquire`.
    fleet_waiting: usize,
    hosts: HashSet<String>,
}

impl LockTable {
    fn is_free(&self, scope: &LockScope) -> bool {
        match scope {
            LockScope::Fleet => !self.fleet && self.hosts.is_empty(),
            LockScope::Host(h) => !self.fleet && self.fleet_waiting == 0 && !self.hosts.contains(h),
        }
    }

    fn acquire(&mut self, scope: &LockScope) {
        match scope {
            LockScope::Fleet => self.fleet = true,
            LockScope::Host(h) => {
                self.hosts.insert(h.clone());
            }
        }
    }

    fn release(&mut self, scope: &LockScope) {
        match scope {
            LockScope::Fleet => self.fleet = false,
            LockScope::Host(h) => {
                self.hosts.remove(h);
            }
        }
    }
}

struct Shared {
    current: RwLock<Snapshot>,
    locks: Mutex<LockTable>,
    released: Condvar,
}

/// Thread-safe holder of the current fleet snapshot.
///
/// `Clone` shares the same snapshot and lock table.
#[derive(Clone)]
pub struct Inventory {
    shared: Arc<Shared>,
}

/// Exclusive hold on part of the inventory. Released on drop.
pub struct InventoryLock {
    shared: Arc<Shared>,
    scope: LockScope,
}

impl InventoryLock {
    pub fn scope(&self) -> &LockScope {
        &self.scope
    }
}

impl fmt::Debug for InventoryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryLock")
            .field("scope", &self.scope)
            .finish()
    }
}

impl Drop for InventoryLock {
    fn drop(&mut self) {
        // Release even if another holder panicked while the table was locked.
        let mut table = self
            .shared
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        table.release(&self.scope);
        drop(table);
        self.shared.released.notify_all();
        debug!(scope = %self.scope, "inventory lock released");
    }
}

impl Inventory {
    /// Create an inventory whose first snapshot (generation 0) is `nodes`.
    pub fn new(nodes: NodeList) -> Self {
        Self {
            shared: Arc::new(Shared {
                current: RwLock::new(Snapshot {
                    generation: 0,
                    nodes,
                }),
                locks: Mutex::new(LockTable::default()),
                released: Condvar::new(),
            }),
        }
    }

    /// The current snapshot. Never blocks on writer locks.
    pub fn snapshot(&self) -> InventoryResult<Snapshot> {
        let current = self
            .shared
            .current
            .read()
            .map_err(|_| InventoryError::LockPoisoned)?;
        Ok(current.clone())
    }

    /// Block until `scope` can be held exclusively.
    pub fn lock(&self, scope: LockScope) -> InventoryResult<InventoryLock> {
        self.acquire(scope, None)
    }

    /// Like [`lock`](Self::lock), giving up after `timeout`.
    pub fn try_lock(&self, scope: LockScope, timeout: Duration) -> InventoryResult<InventoryLock> {
        self.acquire(scope, Some(timeout))
    }

    pub fn lock_host(&self, hostname: &str) -> InventoryResult<InventoryLock> {
        self.lock(LockScope::host(hostname))
    }

    pub fn lock_fleet(&self) -> InventoryResult<InventoryLock> {
        self.lock(LockScope::Fleet)
    }

    fn acquire(&self, scope: LockScope, timeout: Option<Duration>) -> InventoryResult<InventoryLock> {
        let mut table = self
            .shared
            .locks
            .lock()
            .map_err(|_| InventoryError::LockPoisoned)?;

        let fleet = scope == LockScope::Fleet;
        if fleet {
            table.fleet_waiting += 1;
        }

        let released = &self.shared.released;
        let (mut table, timed_out, poisoned) = match timeout {
            None => match released.wait_while(table, |t| !t.is_free(&scope)) {
                Ok(table) => (table, false, false),
                Err(e) => (e.into_inner(), false, true),
            },
            Some(timeout) => match released.wait_timeout_while(table, timeout, |t| !t.is_free(&scope)) {
                Ok((table, result)) => (table, result.timed_out(), false),
                Err(e) => (e.into_inner().0, false, true),
            },
        };

        if fleet {
            table.fleet_waiting -= 1;
        }
        if poisoned || timed_out {
            // Host writers held back by this fleet writer may go ahead now.
            drop(table);
            if fleet {
                released.notify_all();
            }
            return Err(if poisoned {
                InventoryError::LockPoisoned
            } else {
                InventoryError::LockTimeout(scope.to_string())
            });
        }

        table.acquire(&scope);
        debug!(%scope, "inventory lock acquired");
        Ok(InventoryLock {
            shared: Arc::clone(&self.shared),
            scope,
        })
    }

    /// Publish `next` as the current snapshot.
    ///
    /// `base` is the snapshot `next` was computed from, and `lock` must come
    /// from this inventory and cover every node `next` adds, removes or
    /// changes relative to `base`.
    ///
    /// Under a fleet lock `next` replaces the current node list, and `base`
    /// must still be current. Under a host lock only that host's nodes are
    /// taken from `next` and merged into the current list, so writers on
    /// different hosts do not invalidate each other; `base` must agree with
    /// the current list on that host's nodes.
    pub fn publish(
        &self,
        lock: &InventoryLock,
        base: &Snapshot,
        next: NodeList,
    ) -> InventoryResult<Snapshot> {
        if !Arc::ptr_eq(&lock.shared, &self.shared) {
            return Err(InventoryError::ForeignLock);
        }
        check_scope(&lock.scope, base.nodes(), &next)?;

        let mut current = self
            .shared
            .current
            .write()
            .map_err(|_| InventoryError::LockPoisoned)?;

        let nodes = match &lock.scope {
            LockScope::Fleet => {
                if current.generation != base.generation {
                    return Err(InventoryError::Conflict {
                        expected: base.generation,
                        current: current.generation,
                    });
                }
                next
            }
            LockScope::Host(hostname) => {
                if scoped(base.nodes(), hostname).ne(scoped(&current.nodes, hostname)) {
                    return Err(InventoryError::HostConflict(hostname.clone()));
                }
                merge_host(&current.nodes, &next, hostname)?
            }
        };

        *current = Snapshot {
            generation: current.generation + 1,
            nodes,
        };
        debug!(
            scope = %lock.scope,
            generation = current.generation,
            nodes = current.nodes.len(),
            "inventory snapshot published"
        );
        Ok(current.clone())
    }

    /// Lock `scope`, compute the next node list from the current snapshot
    /// and publish it. The lock is released when this returns, whether `f`
    /// succeeds or not.
    pub fn update<T, F>(&self, scope: LockScope, f: F) -> InventoryResult<(Snapshot, T)>
    where
        F: FnOnce(&NodeList) -> InventoryResult<(NodeList, T)>,
    {
        let lock = self.lock(scope)?;
        let base = self.snapshot()?;
        let (next, value) = f(base.nodes())?;
        let published = self.publish(&lock, &base, next)?;
        Ok((published, value))
    }
}

/// Nodes of `nodes` covered by the lock on `hostname`.
fn scoped<'a>(nodes: &'a NodeList, hostname: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
    nodes.iter().filter(move |n| n.lock_owner() == hostname)
}

/// `current` with the nodes of `hostname` taken from `next`. Keeps the
/// order of `current`; nodes new in `next` go last.
fn merge_host(current: &NodeList, next: &NodeList, hostname: &str) -> InventoryResult<NodeList> {
    let mut merged: Vec<Node> = current
        .iter()
        .filter_map(|node| {
            if node.lock_owner() != hostname {
                Some(node.clone())
            } else {
                next.get(&node.hostname)
                    .filter(|n| n.lock_owner() == hostname)
                    .cloned()
            }
        })
        .collect();
    merged.extend(
        scoped(next, hostname)
            .filter(|n| current.get(&n.hostname).is_none())
            .cloned(),
    );
    NodeList::new(merged)
}

/// Reject changes from `base` to `next` outside `scope`. A changed node
/// must be covered both where it was and where it ends up, so moving a
/// child between hosts takes the fleet lock.
fn check_scope(scope: &LockScope, base: &NodeList, next: &NodeList) -> InventoryResult<()> {
    if *scope == LockScope::Fleet {
        return Ok(());
    }

    let out_of_scope = |node: &Node| InventoryError::OutOfScope {
        hostname: node.hostname.clone(),
        scope: scope.to_string(),
    };

    for node in next.iter() {
        let before = base.get(&node.hostname);
        if before == Some(node) {
            continue;
        }
        if !scope.covers(node.lock_owner()) {
            return Err(out_of_scope(node));
        }
        if let Some(before) = before {
            if !scope.covers(before.lock_owner()) {
                return Err(out_of_scope(node));
            }
        }
    }
    for node in base.iter().filter(|n| next.get(&n.hostname).is_none()) {
        if !scope.covers(node.lock_owner()) {
            return Err(out_of_scope(node));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Node, NodeState};
    use provision_resources::{DiskSpeed, NodeResources};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn flavor() -> NodeResources {
        NodeResources::new(2.0, 8.0, 50.0, 1.0, DiskSpeed::Any)
    }

    fn test_inventory() -> Inventory {
        let nodes = NodeList::new(vec![
            Node::host("h1", flavor()),
            Node::host("h2", flavor()),
            Node::child("c1", "h1", flavor()),
        ])
        .unwrap();
        Inventory::new(nodes)
    }

    #[test]
    fn publish_bumps_generation() {
        let inventory = test_inventory();
        let before = inventory.snapshot().unwrap();
        assert_eq!(before.generation(), 0);

        let lock = inventory.lock_host("h1").unwrap();
        let next = before.nodes().with(Node::child("c2", "h1", flavor())).unwrap();
        let after = inventory.publish(&lock, &before, next).unwrap();

        assert_eq!(after.generation(), 1);
        assert_eq!(inventory.snapshot().unwrap().nodes().len(), 4);
        // The old snapshot is unaffected.
        assert_eq!(before.nodes().len(), 3);
    }

    #[test]
    fn stale_fleet_publish_conflicts() {
        let inventory = test_inventory();
        let lock = inventory.lock_fleet().unwrap();
        let base = inventory.snapshot().unwrap();

        inventory.publish(&lock, &base, base.nodes().clone()).unwrap();
        let err = inventory
            .publish(&lock, &base, base.nodes().clone())
            .unwrap_err();
        assert!(matches!(err, InventoryError::Conflict { expected: 0, current: 1 }));
    }

    #[test]
    fn host_writers_merge_independently() {
        let inventory = test_inventory();
        let base = inventory.snapshot().unwrap();

        let h1 = inventory.lock_host("h1").unwrap();
        let h2 = inventory.lock_host("h2").unwrap();

        let on_h1 = base.nodes().with(Node::child("c2", "h1", flavor())).unwrap();
        let on_h2 = base.nodes().with(Node::child("c3", "h2", flavor())).unwrap();
        inventory.publish(&h1, &base, on_h1).unwrap();
        let after = inventory.publish(&h2, &base, on_h2).unwrap();

        assert_eq!(after.generation(), 2);
        let nodes = after.nodes();
        assert_eq!(nodes.children_of_hostname("h1").count(), 2);
        assert_eq!(nodes.children_of_hostname("h2").count(), 1);
        // Existing nodes keep their order.
        let order: Vec<&str> = nodes.iter().map(|n| n.hostname.as_str()).collect();
        assert_eq!(order, vec!["h1", "h2", "c1", "c2", "c3"]);
    }

    #[test]
    fn stale_host_publish_conflicts() {
        let inventory = test_inventory();
        let base = inventory.snapshot().unwrap();
        let lock = inventory.lock_host("h1").unwrap();

        let first = base.nodes().with(Node::child("c2", "h1", flavor())).unwrap();
        inventory.publish(&lock, &base, first).unwrap();

        let second = base.nodes().with(Node::child("c3", "h1", flavor())).unwrap();
        let err = inventory.publish(&lock, &base, second).unwrap_err();
        assert!(matches!(err, InventoryError::HostConflict(ref h) if h == "h1"));
        assert_eq!(err.to_string(), "nodes of host h1 changed since the snapshot was taken");
    }

    #[test]
    fn host_publish_can_remove_children() {
        let inventory = test_inventory();
        let base = inventory.snapshot().unwrap();
        let lock = inventory.lock_host("h1").unwrap();

        let next = base.nodes().without("c1").unwrap();
        let after = inventory.publish(&lock, &base, next).unwrap();
        assert!(after.nodes().get("c1").is_none());
        assert_eq!(after.nodes().len(), 2);
    }

    #[test]
    fn host_lock_cannot_touch_other_hosts() {
        let inventory = test_inventory();
        let lock = inventory.lock_host("h1").unwrap();
        let base = inventory.snapshot().unwrap();
        let nodes = base.nodes();

        let next = nodes.with(Node::child("c9", "h2", flavor())).unwrap();
        let err = inventory.publish(&lock, &base, next).unwrap_err();
        assert!(matches!(err, InventoryError::OutOfScope { hostname, .. } if hostname == "c9"));

        let removed = nodes.without("h2").unwrap();
        assert!(inventory.publish(&lock, &base, removed).is_err());

        let own = nodes
            .with(Node::child("c1", "h1", flavor()).with_state(NodeState::Dirty))
            .unwrap();
        assert!(inventory.publish(&lock, &base, own).is_ok());
    }

    #[test]
    fn moving_a_child_between_hosts_needs_the_fleet_lock() {
        let inventory = Inventory::new(
            NodeList::new(vec![
                Node::host("h1", flavor()),
                Node::host("h2", flavor()),
                Node::child("c1", "h2", flavor()),
            ])
            .unwrap(),
        );
        let base = inventory.snapshot().unwrap();
        let moved = base.nodes().with(Node::child("c1", "h1", flavor())).unwrap();

        // Neither host lock alone covers both ends of the move.
        for host in ["h1", "h2"] {
            let lock = inventory.lock_host(host).unwrap();
            let err = inventory.publish(&lock, &base, moved.clone()).unwrap_err();
            assert!(matches!(err, InventoryError::OutOfScope { ref hostname, .. } if hostname == "c1"));
        }
        assert_eq!(inventory.snapshot().unwrap().generation(), 0);

        let fleet = inventory.lock_fleet().unwrap();
        let after = inventory.publish(&fleet, &base, moved).unwrap();
        let c1 = after.nodes().get("c1").unwrap();
        assert_eq!(c1.parent_hostname.as_deref(), Some("h1"));
    }

    #[test]
    fn foreign_lock_is_rejected() {
        let a = test_inventory();
        let b = test_inventory();
        let lock = b.lock_fleet().unwrap();
        let base = a.snapshot().unwrap();

        assert!(matches!(
            a.publish(&lock, &base, base.nodes().clone()),
            Err(InventoryError::ForeignLock)
        ));
    }

    #[test]
    fn host_lock_times_out_while_held() {
        let inventory = test_inventory();
        let _held = inventory.lock_host("h1").unwrap();

        let err = inventory
            .try_lock(LockScope::host("h1"), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, InventoryError::LockTimeout(_)));

        // Other hosts are independent.
        assert!(inventory
            .try_lock(LockScope::host("h2"), Duration::from_millis(20))
            .is_ok());
        // The fleet lock waits for every host lock.
        assert!(inventory
            .try_lock(LockScope::Fleet, Duration::from_millis(20))
            .is_err());
        // A fleet writer that gave up no longer holds hosts back.
        assert!(inventory
            .try_lock(LockScope::host("h2"), Duration::from_millis(20))
            .is_ok());
    }

    #[test]
    fn queued_fleet_writer_holds_off_new_host_locks() {
        let inventory = test_inventory();
        let held = inventory.lock_host("h1").unwrap();
        let fleet_done = Arc::new(AtomicBool::new(false));

        let fleet_writer = {
            let inventory = inventory.clone();
            let fleet_done = Arc::clone(&fleet_done);
            thread::spawn(move || {
                let _lock = inventory.lock_fleet().unwrap();
                fleet_done.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(50));

        let err = inventory
            .try_lock(LockScope::host("h2"), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, InventoryError::LockTimeout(_)));

        drop(held);
        fleet_writer.join().unwrap();
        assert!(fleet_done.load(Ordering::SeqCst));
        assert!(inventory
            .try_lock(LockScope::host("h2"), Duration::from_millis(20))
            .is_ok());
    }

    #[test]
    fn lock_released_on_drop() {
        let inventory = test_inventory();
        {
            let _lock = inventory.lock_host("h1").unwrap();
        }
        assert!(inventory
            .try_lock(LockScope::host("h1"), Duration::from_millis(20))
            .is_ok());
    }

    #[test]
    fn failed_update_releases_lock() {
        let inventory = test_inventory();

        let result: InventoryResult<(Snapshot, ())> = inventory.update(LockScope::host("h1"), |_| {
            Err(InventoryError::NodeNotFound("c7".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(inventory.snapshot().unwrap().generation(), 0);

        assert!(inventory
            .try_lock(LockScope::host("h1"), Duration::from_millis(20))
            .is_ok());
    }

    #[test]
    fn waiting_writer_proceeds_after_release() {
        let inventory = test_inventory();
        let held = inventory.lock_host("h1").unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let waiter = {
            let inventory = inventory.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _lock = inventory.lock_host("h1").unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(held);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
