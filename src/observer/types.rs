//! Observed Records
//!
//! Typed views of the control-plane objects the harness reasons about,
//! reduced to the fields its assertions need.

use crate::crd::LogicalVolume;
use crate::error::Result;
use crate::quantity;
use k8s_openapi::api::core::v1::{Event, Node, PersistentVolumeClaim, Pod};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Volume Mode
// =============================================================================

/// How a claim's volume is presented to consumers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeMode {
    #[default]
    Filesystem,
    Block,
}

impl VolumeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeMode::Filesystem => "Filesystem",
            VolumeMode::Block => "Block",
        }
    }
}

impl std::fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Claim
// =============================================================================

/// Observed PersistentVolumeClaim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    pub name: String,
    pub namespace: String,
    /// Requested storage in bytes, if the request is present
    pub requested_bytes: Option<u64>,
    pub volume_mode: VolumeMode,
    pub storage_class_name: Option<String>,
    /// Name of the bound volume; `None` until binding completes
    pub bound_volume_name: Option<String>,
}

impl ClaimRecord {
    pub fn from_claim(pvc: &PersistentVolumeClaim) -> Result<Self> {
        let spec = pvc.spec.clone().unwrap_or_default();
        let requested_bytes = spec
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get("storage"))
            .map(|q| quantity::parse_bytes(&q.0))
            .transpose()?;

        Ok(Self {
            name: pvc.name_any(),
            namespace: pvc.namespace().unwrap_or_default(),
            requested_bytes,
            volume_mode: match spec.volume_mode.as_deref() {
                Some("Block") => VolumeMode::Block,
                _ => VolumeMode::Filesystem,
            },
            storage_class_name: spec.storage_class_name,
            bound_volume_name: spec.volume_name.filter(|v| !v.is_empty()),
        })
    }

    pub fn is_bound(&self) -> bool {
        self.bound_volume_name.is_some()
    }
}

// =============================================================================
// Workload
// =============================================================================

/// Observed Pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRecord {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Node the pod was scheduled onto; `None` until scheduling completes
    pub assigned_node: Option<String>,
    /// Condition type -> status ("True" / "False" / "Unknown")
    pub conditions: BTreeMap<String, String>,
    pub phase: Option<String>,
}

impl WorkloadRecord {
    pub fn from_pod(pod: &Pod) -> Self {
        let status = pod.status.clone().unwrap_or_default();
        let conditions = status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| (c.type_, c.status))
            .collect();

        Self {
            name: pod.name_any(),
            namespace: pod.namespace().unwrap_or_default(),
            labels: pod.labels().clone(),
            assigned_node: pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.clone())
                .filter(|n| !n.is_empty()),
            conditions,
            phase: status.phase,
        }
    }

    fn condition_is(&self, type_: &str, status: &str) -> bool {
        self.conditions.get(type_).map(String::as_str) == Some(status)
    }

    /// `Ready=True`
    pub fn is_ready(&self) -> bool {
        self.condition_is("Ready", "True")
    }

    /// `PodScheduled=False`: the scheduler has positively rejected the pod
    pub fn is_unschedulable(&self) -> bool {
        self.condition_is("PodScheduled", "False")
    }
}

// =============================================================================
// Node
// =============================================================================

/// Observed Node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn from_node(node: &Node) -> Self {
        Self {
            name: node.name_any(),
            annotations: node.annotations().clone(),
        }
    }
}

// =============================================================================
// Volume Record
// =============================================================================

/// Observed LogicalVolume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    /// Object name, equal to the PersistentVolume name
    pub name: String,
    /// Name of the logical volume on the node
    pub uid: Option<String>,
    pub node_name: String,
    /// Requested size as a quantity string
    pub size: String,
}

impl VolumeRecord {
    pub fn from_logical_volume(lv: &LogicalVolume) -> Self {
        Self {
            name: lv.name_any(),
            uid: lv.uid(),
            node_name: lv.spec.node_name.clone(),
            size: lv.spec.size.clone(),
        }
    }
}

// =============================================================================
// Event
// =============================================================================

/// Observed Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub name: String,
    pub involved_kind: String,
    pub involved_name: String,
    pub reason: String,
    pub message: String,
}

impl EventRecord {
    pub fn from_event(event: &Event) -> Self {
        Self {
            name: event.name_any(),
            involved_kind: event.involved_object.kind.clone().unwrap_or_default(),
            involved_name: event.involved_object.name.clone().unwrap_or_default(),
            reason: event.reason.clone().unwrap_or_default(),
            message: event.message.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake;

    #[test]
    fn test_claim_record() {
        let pvc: PersistentVolumeClaim =
            serde_json::from_value(fake::claim("ns", "topo-pvc", "1Gi", Some("pvc-1"))).unwrap();
        let record = ClaimRecord::from_claim(&pvc).unwrap();

        assert_eq!(record.requested_bytes, Some(quantity::gib(1)));
        assert_eq!(record.volume_mode, VolumeMode::Filesystem);
        assert_eq!(record.bound_volume_name.as_deref(), Some("pvc-1"));
        assert!(record.is_bound());
    }

    #[test]
    fn test_empty_volume_name_is_unbound() {
        let mut value = fake::claim("ns", "topo-pvc", "1Gi", None);
        value["spec"]["volumeName"] = serde_json::Value::String(String::new());
        value["spec"]["volumeMode"] = serde_json::Value::String("Block".into());
        let pvc: PersistentVolumeClaim = serde_json::from_value(value).unwrap();
        let record = ClaimRecord::from_claim(&pvc).unwrap();

        assert!(!record.is_bound());
        assert_eq!(record.volume_mode, VolumeMode::Block);
    }

    #[test]
    fn test_workload_conditions() {
        let pod: Pod = serde_json::from_value(fake::pod(
            "ns",
            "testhttpd",
            None,
            &[("PodScheduled", "False")],
        ))
        .unwrap();
        let record = WorkloadRecord::from_pod(&pod);

        assert!(record.assigned_node.is_none());
        assert!(record.is_unschedulable());
        assert!(!record.is_ready());
    }
}
