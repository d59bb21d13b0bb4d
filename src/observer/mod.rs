//! State Observer
//!
//! Queries the control plane and decodes the snapshots into typed records.
//! A query that fails outright is fatal; an object that exists but has not
//! reached the desired state is reported as [`Error::NotConverged`] so the
//! eventual engine can poll it again.

pub mod decode;
pub mod types;

pub use decode::*;
pub use types::*;

use crate::cluster::{ControlPlane, OutputFormat, Query};
use crate::config::HarnessConfig;
use crate::crd::LogicalVolume;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{Event, Node, PersistentVolumeClaim, Pod};
use std::sync::Arc;
use tracing::debug;

/// Go templates render a missing field as this marker
const NO_VALUE: &str = "<no value>";

/// Typed, read-only view of the control plane
#[derive(Clone)]
pub struct StateObserver {
    control_plane: Arc<dyn ControlPlane>,
    config: Arc<HarnessConfig>,
}

impl StateObserver {
    pub fn new(control_plane: Arc<dyn ControlPlane>, config: Arc<HarnessConfig>) -> Self {
        Self {
            control_plane,
            config,
        }
    }

    async fn get_json(&self, query: &Query) -> Result<String> {
        self.control_plane.get(query, &OutputFormat::Json).await
    }

    async fn get_template(&self, query: &Query, template: &str) -> Result<String> {
        let raw = self
            .control_plane
            .get(query, &OutputFormat::Template(template.to_string()))
            .await?;
        let value = raw.trim();
        if value.is_empty() || value == NO_VALUE {
            return Err(Error::pending(format!("{} has no value for {}", query, template)));
        }
        Ok(value.to_string())
    }

    // =========================================================================
    // Claims
    // =========================================================================

    /// Fetch one claim
    pub async fn claim(&self, namespace: &str, name: &str) -> Result<ClaimRecord> {
        let query = Query::named("pvc", name).in_namespace(namespace);
        let pvc: PersistentVolumeClaim = decode("PersistentVolumeClaim", &self.get_json(&query).await?)?;
        ClaimRecord::from_claim(&pvc)
    }

    /// Fetch every claim in a namespace
    pub async fn claims(&self, namespace: &str) -> Result<Vec<ClaimRecord>> {
        let query = Query::all("pvc").in_namespace(namespace);
        let items: Vec<PersistentVolumeClaim> =
            decode_list("PersistentVolumeClaim", &self.get_json(&query).await?)?;
        items.iter().map(ClaimRecord::from_claim).collect()
    }

    /// Name of the volume bound to a claim; pending until bound
    pub async fn bound_volume(&self, namespace: &str, name: &str) -> Result<String> {
        let claim = self.claim(namespace, name).await?;
        claim
            .bound_volume_name
            .ok_or_else(|| Error::pending(format!("pvc {}/{} is not bound yet", namespace, name)))
    }

    // =========================================================================
    // Workloads
    // =========================================================================

    /// Fetch one pod
    pub async fn workload(&self, namespace: &str, name: &str) -> Result<WorkloadRecord> {
        let query = Query::named("pod", name).in_namespace(namespace);
        let pod: Pod = decode("Pod", &self.get_json(&query).await?)?;
        Ok(WorkloadRecord::from_pod(&pod))
    }

    /// Fetch pods matching a label selector
    pub async fn workloads(&self, namespace: &str, selector: &str) -> Result<Vec<WorkloadRecord>> {
        let query = Query::labeled("pods", selector).in_namespace(namespace);
        let pods: Vec<Pod> = decode_list("Pod", &self.get_json(&query).await?)?;
        Ok(pods.iter().map(WorkloadRecord::from_pod).collect())
    }

    /// Node a pod was scheduled onto; pending until assigned
    pub async fn assigned_node(&self, namespace: &str, name: &str) -> Result<String> {
        let workload = self.workload(namespace, name).await?;
        workload
            .assigned_node
            .ok_or_else(|| Error::pending(format!("pod {}/{} is not yet scheduled", namespace, name)))
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Fetch every node in the cluster
    pub async fn nodes(&self) -> Result<Vec<NodeRecord>> {
        let nodes: Vec<Node> = decode_list("Node", &self.get_json(&Query::all("nodes")).await?)?;
        Ok(nodes.iter().map(NodeRecord::from_node).collect())
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    /// Fetch the LogicalVolume record for a volume name
    pub async fn logical_volume(&self, name: &str) -> Result<VolumeRecord> {
        let query = Query::named("logicalvolumes", name).in_namespace(&self.config.system_namespace);
        let lv: LogicalVolume = decode("LogicalVolume", &self.get_json(&query).await?)?;
        Ok(VolumeRecord::from_logical_volume(&lv))
    }

    /// LogicalVolume record for the volume bound to a claim
    pub async fn volume_for_claim(&self, namespace: &str, claim: &str) -> Result<VolumeRecord> {
        let volume = self.bound_volume(namespace, claim).await?;
        self.logical_volume(&volume).await
    }

    /// Physical name of a LogicalVolume (its uid)
    pub async fn logical_volume_uid(&self, name: &str) -> Result<String> {
        let query = Query::named("logicalvolume", name).in_namespace(&self.config.system_namespace);
        self.get_template(&query, "{{.metadata.uid}}").await
    }

    /// Whether a PersistentVolume object currently exists
    pub async fn persistent_volume_exists(&self, name: &str) -> Result<bool> {
        let query = Query::named("pv", name).ignoring_not_found();
        let out = self.control_plane.get(&query, &OutputFormat::Table).await?;
        debug!("pv/{} lookup returned {} bytes", name, out.trim().len());
        Ok(!out.trim().is_empty())
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Events about `kind/name` with the given reason
    pub async fn events(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
        reason: &str,
    ) -> Result<Vec<EventRecord>> {
        let selector = format!(
            "involvedObject.kind={},involvedObject.name={},reason={}",
            kind, name, reason
        );
        let query = Query::all("events")
            .in_namespace(namespace)
            .with_field_selector(selector);
        let events: Vec<Event> = decode_list("Event", &self.get_json(&query).await?)?;
        Ok(events.iter().map(EventRecord::from_event).collect())
    }

    // =========================================================================
    // Namespaces
    // =========================================================================

    /// Pending until the namespace's default service account exists
    pub async fn default_service_account(&self, namespace: &str) -> Result<()> {
        let query = Query::named("sa", "default").in_namespace(namespace);
        self.control_plane.get(&query, &OutputFormat::Table).await?;
        Ok(())
    }
}
