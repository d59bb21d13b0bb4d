//! LogicalVolume CRD
//!
//! Declarative mirror of a physical logical volume, written by the
//! provisioner and only ever read by the harness. The object's `uid` is the
//! name of the logical volume on the node.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// LogicalVolume CRD
// =============================================================================

/// LogicalVolume records which node a provisioned volume lives on.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "topolvm.cybozu.com",
    version = "v1",
    kind = "LogicalVolume",
    plural = "logicalvolumes",
    status = "LogicalVolumeStatus",
    printcolumn = r#"{"name": "Node", "type": "string", "jsonPath": ".spec.nodeName"}"#,
    printcolumn = r#"{"name": "Size", "type": "string", "jsonPath": ".spec.size"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LogicalVolumeSpec {
    /// Volume name (the PersistentVolume name)
    pub name: String,

    /// Node the volume was provisioned on
    pub node_name: String,

    /// Requested size as a quantity string
    #[serde(default)]
    pub size: String,

    /// Device class the volume was carved from
    #[serde(default)]
    pub device_class: Option<String>,
}

// =============================================================================
// Status
// =============================================================================

/// Status reported by the node plugin
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogicalVolumeStatus {
    /// Identifier of the created volume
    #[serde(default, rename = "volumeID")]
    pub volume_id: Option<String>,

    /// gRPC status code of the last operation
    #[serde(default)]
    pub code: Option<i32>,

    /// Error message of the last operation
    #[serde(default)]
    pub message: Option<String>,

    /// Size currently allocated
    #[serde(default)]
    pub current_size: Option<String>,
}
