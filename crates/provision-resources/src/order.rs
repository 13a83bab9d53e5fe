//! Default ranking order over resource vectors.
//!
//! Dimensions are compared lexicographically in this priority:
//!
//! 1. memory
//! 2. disk
//! 3. vcpu
//! 4. bandwidth
//! 5. disk speed (fast > slow > any)
//!
//! Two vectors compare equal only when all four numeric components are
//! equal and the disk speeds match, so the order is total over finite
//! values (negative components included).

use std::cmp::Ordering;

use crate::resources::NodeResources;

/// Compare `a` and `b` under the default order. `Greater` means `a` has
/// more resources.
pub fn default_order(a: &NodeResources, b: &NodeResources) -> Ordering {
    cmp_f64(a.memory_gb, b.memory_gb)
        .then_with(|| cmp_f64(a.disk_gb, b.disk_gb))
        .then_with(|| cmp_f64(a.vcpu, b.vcpu))
        .then_with(|| cmp_f64(a.bandwidth_gbps, b.bandwidth_gbps))
        .then_with(|| a.disk_speed.rank().cmp(&b.disk_speed.rank()))
}

/// Total order on floats that agrees with `==` for zeros of either sign.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    normalize_zero(a).total_cmp(&normalize_zero(b))
}

fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}
