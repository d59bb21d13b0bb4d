//! Scenario Context
//!
//! Everything a scenario needs to talk to the cluster, scoped to the
//! namespace the driver created for it. Steps are strictly sequential; every
//! wait goes through [`Eventually`].

use crate::cluster::{ControlPlane, Target, VolumeManager};
use crate::config::HarnessConfig;
use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::eventually::{Clock, Eventually};
use crate::observer::{ClaimRecord, StateObserver};
use crate::oracle::CapacityMap;
use crate::physical::PhysicalChecker;
use crate::resize::ResizeVerifier;
use std::fmt::Display;
use std::sync::Arc;
use tracing::info;

// =============================================================================
// Harness
// =============================================================================

/// Shared collaborators, one per test run
pub struct Harness {
    pub config: Arc<HarnessConfig>,
    pub control_plane: Arc<dyn ControlPlane>,
    pub volumes: Arc<dyn VolumeManager>,
    pub clock: Arc<dyn Clock>,
}

impl Harness {
    pub fn new(
        config: HarnessConfig,
        control_plane: Arc<dyn ControlPlane>,
        volumes: Arc<dyn VolumeManager>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            control_plane,
            volumes,
            clock,
        })
    }

    pub fn observer(&self) -> StateObserver {
        StateObserver::new(self.control_plane.clone(), self.config.clone())
    }

    pub fn eventually(&self, what: impl Into<String>) -> Eventually {
        Eventually::new(self.clock.clone(), &self.config.polling).describe(what)
    }

    /// Build the context for one scenario run in `namespace`
    pub fn context(&self, scenario: &'static str, namespace: impl Into<String>) -> ScenarioContext {
        let observer = self.observer();
        ScenarioContext {
            scenario,
            namespace: namespace.into(),
            config: self.config.clone(),
            control_plane: self.control_plane.clone(),
            physical: PhysicalChecker::new(
                self.volumes.clone(),
                observer.clone(),
                self.clock.clone(),
                self.config.clone(),
            ),
            resize: ResizeVerifier::new(
                self.control_plane.clone(),
                observer.clone(),
                self.clock.clone(),
                self.config.clone(),
            ),
            observer,
            clock: self.clock.clone(),
        }
    }
}

// =============================================================================
// Scenario Context
// =============================================================================

/// Per-scenario view of the harness
pub struct ScenarioContext {
    pub scenario: &'static str,
    pub namespace: String,
    pub config: Arc<HarnessConfig>,
    pub control_plane: Arc<dyn ControlPlane>,
    pub observer: StateObserver,
    pub physical: PhysicalChecker,
    pub resize: ResizeVerifier,
    clock: Arc<dyn Clock>,
}

impl ScenarioContext {
    /// Narrate a step
    pub fn by(&self, step: impl Display) {
        info!(scenario = self.scenario, namespace = %self.namespace, "{}", step);
    }

    pub fn eventually(&self, what: impl Into<String>) -> Eventually {
        Eventually::new(self.clock.clone(), &self.config.polling).describe(what)
    }

    pub fn consumer(&self, pod: &str) -> Consumer {
        Consumer::new(self.control_plane.clone(), self.namespace.clone(), pod)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn apply(&self, manifest: &str) -> Result<()> {
        self.control_plane
            .apply(Some(&self.namespace), manifest)
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, manifest: &str) -> Result<()> {
        self.control_plane
            .delete_manifest(Some(&self.namespace), manifest)
            .await
            .map(|_| ())
    }

    /// Restart the provisioner's node plugins by deleting their pods
    pub async fn restart_node_plugins(&self) -> Result<()> {
        self.control_plane
            .delete(
                Some(&self.config.system_namespace),
                "pod",
                &Target::Labels(self.config.node_plugin_selector.clone()),
            )
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Waits
    // =========================================================================

    /// Wait for a claim to bind; returns the volume name
    pub async fn wait_bound(&self, claim: &str) -> Result<String> {
        self.eventually(format!("pvc {} bound", claim))
            .run(|| self.observer.bound_volume(&self.namespace, claim))
            .await
    }

    /// Wait until the namespace holds exactly `count` claims, all bound
    pub async fn wait_all_bound(&self, count: usize) -> Result<Vec<ClaimRecord>> {
        self.eventually(format!("{} bound pvcs", count))
            .run(|| async move {
                let claims = self.observer.claims(&self.namespace).await?;
                if claims.len() != count {
                    return Err(Error::pending(format!(
                        "the length of PVC list should be {}, got {}",
                        count,
                        claims.len()
                    )));
                }
                if let Some(unbound) = claims.iter().find(|c| !c.is_bound()) {
                    return Err(Error::pending(format!("pvc {} is not bound yet", unbound.name)));
                }
                Ok(claims)
            })
            .await
    }

    /// Wait for a pod to be scheduled; returns the node
    pub async fn wait_scheduled(&self, pod: &str) -> Result<String> {
        self.eventually(format!("pod {} scheduled", pod))
            .run(|| self.observer.assigned_node(&self.namespace, pod))
            .await
    }

    /// Wait for a pod to be scheduled onto `node`
    pub async fn wait_scheduled_on(&self, pod: &str, node: &str) -> Result<()> {
        self.eventually(format!("pod {} scheduled onto {}", pod, node))
            .run(|| async move {
                let assigned = self.observer.assigned_node(&self.namespace, pod).await?;
                if assigned != node {
                    return Err(Error::pending(format!(
                        "pod {} is on {}, expected {}",
                        pod, assigned, node
                    )));
                }
                Ok(())
            })
            .await
    }

    pub async fn wait_ready(&self, pod: &str) -> Result<()> {
        self.eventually(format!("pod {} ready", pod))
            .run(|| async move {
                let workload = self.observer.workload(&self.namespace, pod).await?;
                if !workload.is_ready() {
                    return Err(Error::pending(format!(
                        "{} is not yet ready: {:?}",
                        pod, workload.conditions
                    )));
                }
                Ok(())
            })
            .await
    }

    /// Wait for the scheduler to reject a pod (`PodScheduled=False`)
    pub async fn wait_unschedulable(&self, pod: &str) -> Result<()> {
        self.eventually(format!("pod {} rejected by the scheduler", pod))
            .run(|| async move {
                let workload = self.observer.workload(&self.namespace, pod).await?;
                if let Some(node) = &workload.assigned_node {
                    return Err(Error::assertion(format!(
                        "{} should not be scheduled, but landed on {}",
                        pod, node
                    )));
                }
                if !workload.is_unschedulable() {
                    return Err(Error::pending(format!("{} has no PodScheduled=False condition yet", pod)));
                }
                Ok(())
            })
            .await
    }

    /// Reject the pod, then confirm it stays unassigned for the grace period
    pub async fn expect_never_scheduled(&self, pod: &str) -> Result<()> {
        self.wait_unschedulable(pod).await?;
        self.eventually(format!("pod {} unassigned", pod))
            .hold(self.config.polling.unschedulable_grace, || async move {
                let workload = self.observer.workload(&self.namespace, pod).await?;
                match workload.assigned_node {
                    Some(node) => Err(Error::assertion(format!("{} was scheduled onto {}", pod, node))),
                    None => Ok(()),
                }
            })
            .await
    }

    /// Wait until the PersistentVolume object is gone
    pub async fn wait_pv_deleted(&self, volume: &str) -> Result<()> {
        self.eventually(format!("pv {} deleted", volume))
            .run(|| async move {
                if self.observer.persistent_volume_exists(volume).await? {
                    return Err(Error::pending(format!("target pv exists {}", volume)));
                }
                Ok(())
            })
            .await
    }

    /// Current free capacity of every worker node
    pub async fn capacity(&self) -> Result<CapacityMap> {
        let nodes = self.observer.nodes().await?;
        CapacityMap::from_nodes(&nodes, &self.config)
    }
}
