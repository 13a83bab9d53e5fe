//! The resource vector.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, ResourceResult};

/// Disk speed class of a node or a resource request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskSpeed {
    #[default]
    Fast,
    Slow,
    /// No preference; compatible with either class.
    Any,
}

impl DiskSpeed {
    /// Whether a resource with this speed can serve a request for `requested`.
    pub fn is_compatible_with(self, requested: DiskSpeed) -> bool {
        self == DiskSpeed::Any || self == requested
    }

    /// Rank used by the default order: fast > slow > any.
    pub(crate) fn rank(self) -> u8 {
        match self {
            DiskSpeed::Fast => 2,
            DiskSpeed::Slow => 1,
            DiskSpeed::Any => 0,
        }
    }
}

impl fmt::Display for DiskSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiskSpeed::Fast => "fast",
            DiskSpeed::Slow => "slow",
            DiskSpeed::Any => "any",
        };
        f.write_str(s)
    }
}

/// An immutable quantity of compute resources.
///
/// Components are non-negative for anything provisioned, but the result of
/// [`subtract`](Self::subtract) may be negative. A negative component means
/// the subtracted quantity did not fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeResources {
    pub vcpu: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
    pub bandwidth_gbps: f64,
    #[serde(default)]
    pub disk_speed: DiskSpeed,
}

impl NodeResources {
    pub const fn new(
        vcpu: f64,
        memory_gb: f64,
        disk_gb: f64,
        bandwidth_gbps: f64,
        disk_speed: DiskSpeed,
    ) -> Self {
        Self {
            vcpu,
            memory_gb,
            disk_gb,
            bandwidth_gbps,
            disk_speed,
        }
    }

    /// The empty vector, with the default disk speed.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, DiskSpeed::Fast)
    }

    /// Check that every component is a finite, non-negative number.
    ///
    /// Vectors coming from outside the process (snapshots, requests) go
    /// through this before they reach capacity accounting.
    pub fn validated(self) -> ResourceResult<Self> {
        for (dimension, value) in self.dimensions() {
            if !value.is_finite() {
                return Err(ResourceError::NotFinite { dimension });
            }
            if value < 0.0 {
                return Err(ResourceError::Negative { dimension, value });
            }
        }
        Ok(self)
    }

    /// Named numeric components, in declaration order.
    pub fn dimensions(&self) -> [(&'static str, f64); 4] {
        [
            ("vcpu", self.vcpu),
            ("memory_gb", self.memory_gb),
            ("disk_gb", self.disk_gb),
            ("bandwidth_gbps", self.bandwidth_gbps),
        ]
    }

    pub fn with_vcpu(self, vcpu: f64) -> Self {
        Self { vcpu, ..self }
    }

    pub fn with_memory_gb(self, memory_gb: f64) -> Self {
        Self { memory_gb, ..self }
    }

    pub fn with_disk_gb(self, disk_gb: f64) -> Self {
        Self { disk_gb, ..self }
    }

    pub fn with_bandwidth_gbps(self, bandwidth_gbps: f64) -> Self {
        Self {
            bandwidth_gbps,
            ..self
        }
    }

    /// Copy with the disk speed overridden.
    pub fn with_disk_speed(self, disk_speed: DiskSpeed) -> Self {
        Self { disk_speed, ..self }
    }

    /// Copy with disk speed `any`, for aggregating regardless of speed.
    pub fn any_speed(self) -> Self {
        self.with_disk_speed(DiskSpeed::Any)
    }

    /// Component-wise `self - other`. Keeps the disk speed of `self` and
    /// never clamps.
    pub fn subtract(self, other: &NodeResources) -> Self {
        Self {
            vcpu: self.vcpu - other.vcpu,
            memory_gb: self.memory_gb - other.memory_gb,
            disk_gb: self.disk_gb - other.disk_gb,
            bandwidth_gbps: self.bandwidth_gbps - other.bandwidth_gbps,
            disk_speed: self.disk_speed,
        }
    }

    /// Component-wise `self + other`, keeping the disk speed of `self`.
    pub fn add(self, other: &NodeResources) -> Self {
        Self {
            vcpu: self.vcpu + other.vcpu,
            memory_gb: self.memory_gb + other.memory_gb,
            disk_gb: self.disk_gb + other.disk_gb,
            bandwidth_gbps: self.bandwidth_gbps + other.bandwidth_gbps,
            disk_speed: self.disk_speed,
        }
    }

    /// Whether these resources can serve `requested`: every numeric
    /// component is at least as large and the disk speeds are compatible.
    pub fn satisfies(&self, requested: &NodeResources) -> bool {
        self.vcpu >= requested.vcpu
            && self.memory_gb >= requested.memory_gb
            && self.disk_gb >= requested.disk_gb
            && self.bandwidth_gbps >= requested.bandwidth_gbps
            && self.disk_speed.is_compatible_with(requested.disk_speed)
    }

    /// Whether every numeric component is zero.
    pub fn is_zero(&self) -> bool {
        self.dimensions().iter().all(|(_, v)| *v == 0.0)
    }

    /// Whether any numeric component is negative.
    pub fn is_overcommitted(&self) -> bool {
        self.dimensions().iter().any(|(_, v)| *v < 0.0)
    }
}

impl Default for NodeResources {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for NodeResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[vcpu: {:.1}, memory: {:.1} Gb, disk: {:.1} Gb, bandwidth: {:.1} Gbps, disk speed: {}]",
            self.vcpu, self.memory_gb, self.disk_gb, self.bandwidth_gbps, self.disk_speed
        )
    }
}
