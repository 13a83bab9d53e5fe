//! Allocation skew.
//!
//! Skew measures how unevenly a host's resource dimensions are used. For
//! each weighted dimension the used fraction is `(total - free) / total`;
//! skew is the weighted population standard deviation of those fractions:
//!
//! ```text
//! mean = Σ wᵢ·uᵢ / Σ wᵢ
//! skew = sqrt( Σ wᵢ·(uᵢ - mean)² / Σ wᵢ )
//! ```
//!
//! A host with every dimension equally used has skew 0. Dimensions with
//! zero weight or zero total capacity take no part. The default weights
//! cover vcpu, memory and disk equally and ignore bandwidth.

use provision_resources::NodeResources;
use serde::{Deserialize, Serialize};

/// Weight of each resource dimension in the skew metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewWeights {
    pub vcpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub bandwidth: f64,
}

impl Default for SkewWeights {
    fn default() -> Self {
        Self {
            vcpu: 1.0,
            memory: 1.0,
            disk: 1.0,
            bandwidth: 0.0,
        }
    }
}

impl SkewWeights {
    pub(crate) fn as_array(&self) -> [f64; 4] {
        [self.vcpu, self.memory, self.disk, self.bandwidth]
    }
}

/// Skew of a host with full resources `total` and free resources `free`.
///
/// Disk speed is ignored. Over-committed hosts (negative free components)
/// give used fractions above 1 and are measured the same way.
pub fn skew(total: &NodeResources, free: &NodeResources, weights: &SkewWeights) -> f64 {
    let all = total.any_speed();
    let allocated = all.subtract(&free.any_speed());

    let mut fractions = [(0.0, 0.0); 4];
    let mut len = 0;
    for ((w, (_, t)), (_, a)) in weights
        .as_array()
        .into_iter()
        .zip(all.dimensions())
        .zip(allocated.dimensions())
    {
        if w > 0.0 && t > 0.0 {
            fractions[len] = (w, a / t);
            len += 1;
        }
    }
    let fractions = &fractions[..len];

    let weight_sum: f64 = fractions.iter().map(|(w, _)| w).sum();
    if weight_sum == 0.0 {
        return 0.0;
    }
    let mean = fractions.iter().map(|(w, u)| w * u).sum::<f64>() / weight_sum;
    let variance = fractions
        .iter()
        .map(|(w, u)| w * (u - mean).powi(2))
        .sum::<f64>()
        / weight_sum;
    variance.sqrt()
}
