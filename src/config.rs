//! Harness configuration
//!
//! Names of the cluster objects the provisioner is deployed with, the
//! polling bounds every wait uses, and the target Kubernetes version that
//! gates version-dependent scenarios.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Kubernetes Version
// =============================================================================

/// `major.minor` version of the cluster under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KubernetesVersion {
    pub major: u32,
    pub minor: u32,
}

impl KubernetesVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// True if this version is at least `1.<minor>`
    pub fn supports_minor(&self, minor: u32) -> bool {
        self.major > 1 || (self.major == 1 && self.minor >= minor)
    }
}

impl FromStr for KubernetesVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().trim_start_matches('v').split('.').collect();
        if parts.len() != 2 {
            return Err(Error::Configuration(format!(
                "kubernetes version must be MAJOR.MINOR, got {:?}",
                s
            )));
        }
        let parse = |part: &str| {
            part.parse::<u32>().map_err(|e| {
                Error::Configuration(format!("invalid kubernetes version {:?}: {}", s, e))
            })
        };
        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
        })
    }
}

impl fmt::Display for KubernetesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// =============================================================================
// Polling Bounds
// =============================================================================

/// Timeouts shared by every wait in the harness
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Default deadline for a convergence wait
    pub timeout: Duration,
    /// Default interval between polls
    pub interval: Duration,
    /// Deadline for resize convergence
    pub resize_timeout: Duration,
    /// How long an unschedulable pod must stay unassigned
    pub unschedulable_grace: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            interval: Duration::from_secs(1),
            resize_timeout: Duration::from_secs(300),
            unschedulable_grace: Duration::from_secs(15),
        }
    }
}

// =============================================================================
// Harness Configuration
// =============================================================================

/// Configuration for the e2e harness
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// kubectl binary
    pub kubectl: String,
    /// Privilege wrapper for LVM commands (empty to run directly)
    pub sudo: String,
    /// Namespace prefix for provisioning scenarios
    pub namespace_prefix: String,
    /// Namespace prefix for scheduler-extension scenarios
    pub scheduler_namespace_prefix: String,
    /// Namespace the provisioner is installed in
    pub system_namespace: String,
    /// Node excluded from capacity reasoning
    pub control_plane_node: String,
    /// Device class whose capacity is tracked
    pub device_class: String,
    /// Prefix of the per-device-class capacity annotation
    pub capacity_key_prefix: String,
    /// CSI driver name (also the inline volume attribute prefix)
    pub driver_name: String,
    /// Extended resource requested by capacity-aware pods
    pub capacity_resource: String,
    /// StorageClass with WaitForFirstConsumer binding
    pub storage_class: String,
    /// StorageClass with Immediate binding
    pub immediate_storage_class: String,
    /// Image used for consumer pods
    pub image: String,
    /// Label selector of the scheduler-extension pods
    pub scheduler_selector: String,
    /// Label selector of the node-plugin pods
    pub node_plugin_selector: String,
    /// Polling bounds
    pub polling: PollingConfig,
    /// Cluster version; required by version-gated scenarios
    pub kubernetes_version: Option<KubernetesVersion>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            sudo: "sudo".to_string(),
            namespace_prefix: "e2etest-".to_string(),
            scheduler_namespace_prefix: "scheduler-test".to_string(),
            system_namespace: "topolvm-system".to_string(),
            control_plane_node: "topolvm-e2e-control-plane".to_string(),
            device_class: "ssd".to_string(),
            capacity_key_prefix: "capacity.topolvm.cybozu.com/".to_string(),
            driver_name: "topolvm.cybozu.com".to_string(),
            capacity_resource: "topolvm.cybozu.com/capacity".to_string(),
            storage_class: "topolvm-provisioner".to_string(),
            immediate_storage_class: "topolvm-provisioner-immediate".to_string(),
            image: "quay.io/cybozu/ubuntu:18.04".to_string(),
            scheduler_selector: "app.kubernetes.io/name=topolvm-scheduler".to_string(),
            node_plugin_selector: "app.kubernetes.io/name=node".to_string(),
            polling: PollingConfig::default(),
            kubernetes_version: None,
        }
    }
}

impl HarnessConfig {
    /// Full annotation key carrying free capacity for the configured device class
    pub fn capacity_key(&self) -> String {
        format!("{}{}", self.capacity_key_prefix, self.device_class)
    }

    /// Volume attribute naming the size (GiB) of an inline ephemeral volume
    pub fn inline_size_attribute(&self) -> String {
        format!("{}/size", self.driver_name)
    }
}
