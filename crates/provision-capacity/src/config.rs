//! Capacity policy configuration (TOML).
//!
//! ```toml
//! [addresses]
//! per_child = 1
//!
//! [skew]
//! vcpu = 1.0
//! memory = 1.0
//! disk = 1.0
//! bandwidth = 0.0
//!
//! [overhead]
//! vcpu = 2.0
//! memory_gb = 16.0
//! ```
//!
//! Every section is optional. Without `[overhead]` hosts give their whole
//! flavor to children.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, ensure};
use provision_resources::{DiskSpeed, NodeResources};
use serde::{Deserialize, Serialize};

use crate::address::AddressPolicy;
use crate::calculator::{HostResourcesCalculator, IdentityCalculator, ReservedCalculator};
use crate::skew::SkewWeights;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub addresses: AddressPolicy,
    pub skew: SkewWeights,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overhead: Option<OverheadConfig>,
}

/// Host share reserved for the host itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverheadConfig {
    pub vcpu: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
    pub bandwidth_gbps: f64,
}

impl OverheadConfig {
    pub fn as_resources(&self) -> NodeResources {
        NodeResources::new(
            self.vcpu,
            self.memory_gb,
            self.disk_gb,
            self.bandwidth_gbps,
            DiskSpeed::Any,
        )
    }
}

impl CapacityConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading capacity config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: CapacityConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.addresses.per_child >= 1,
            "addresses.per_child must be at least 1"
        );

        let weights = self.skew.as_array();
        ensure!(
            weights.iter().all(|w| w.is_finite() && *w >= 0.0),
            "skew weights must be finite and non-negative"
        );
        ensure!(
            weights.iter().sum::<f64>() > 0.0,
            "at least one skew weight must be positive"
        );

        if let Some(overhead) = &self.overhead {
            overhead
                .as_resources()
                .validated()
                .context("invalid host overhead")?;
        }
        Ok(())
    }

    /// The calculator this configuration describes.
    pub fn calculator(&self) -> Arc<dyn HostResourcesCalculator> {
        match &self.overhead {
            Some(overhead) => Arc::new(ReservedCalculator::new(overhead.as_resources())),
            None => Arc::new(IdentityCalculator),
        }
    }
}
