//! Capacity-aware placement scenarios
//!
//! Both scenarios read node free capacity, consume some of it, and check each
//! placement against the oracle. They assume nothing else consumes capacity
//! while they run, so the driver runs them one at a time.

use crate::error::{Error, Result};
use crate::observer::VolumeMode;
use crate::oracle::{verify_immediate, CapacityMap, PlacementOracle, TieSetTracker};
use crate::quantity::{format_bytes, gib, parse_bytes};
use crate::scenario::manifest::{self, join, render};
use crate::scenario::{Scenario, ScenarioContext};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Worker nodes in the test cluster, all starting with equal capacity
const WORKER_NODES: usize = 3;

// =============================================================================
// Immediate Binding
// =============================================================================

/// Immediately bound claims land on a node with the most free capacity
pub struct ImmediateLargestCapacity;

impl ImmediateLargestCapacity {
    /// Wait for the capacity annotation of `node` to drop below `before`
    async fn wait_capacity_drop(ctx: &ScenarioContext, node: &str, before: u64) -> Result<()> {
        ctx.eventually(format!("capacity of {} to drop below {}", node, format_bytes(before)))
            .run(|| async move {
                let now = ctx.capacity().await?.get(node).ok_or_else(|| {
                    Error::assertion(format!("{} disappeared from the capacity map", node))
                })?;
                if now >= before {
                    return Err(Error::pending(format!(
                        "{} still reports {}",
                        node,
                        format_bytes(now)
                    )));
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl Scenario for ImmediateLargestCapacity {
    fn name(&self) -> &'static str {
        "immediate-largest-capacity"
    }

    fn description(&self) -> &'static str {
        "choosing the node with the largest capacity for immediate binding"
    }

    fn capacity_sensitive(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let mut tracker = TieSetTracker::expecting(WORKER_NODES);
        let mut claims = Vec::with_capacity(WORKER_NODES);
        let mut volumes = Vec::with_capacity(WORKER_NODES);

        for i in 0..WORKER_NODES {
            let name = format!("topo-pvc-{}", i);

            ctx.by("getting the node with max capacity");
            let capacity = ctx.capacity().await?;
            let tied = tracker.observe(&capacity)?;

            ctx.by(format!("creating pvc {}", name));
            let claim = render(&manifest::claim(
                &name,
                "1Gi",
                &ctx.config.immediate_storage_class,
                VolumeMode::Filesystem,
            ))?;
            ctx.apply(&claim).await?;
            let volume = ctx.wait_bound(&name).await?;

            ctx.by("confirming the volume was created on a max-capacity node");
            let record = ctx
                .eventually(format!("LogicalVolume {}", volume))
                .run(|| ctx.observer.logical_volume(&volume))
                .await?;
            verify_immediate(&tied, &record.node_name)?;

            let before = capacity.get(&record.node_name).unwrap_or_default();
            Self::wait_capacity_drop(ctx, &record.node_name, before).await?;

            claims.push(claim);
            volumes.push(volume);
        }

        ctx.by("deleting the PVCs");
        ctx.delete(&join(&claims)).await?;
        for volume in &volumes {
            ctx.wait_pv_deleted(volume).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Scheduler Extension Filter and Prioritize
// =============================================================================

/// Deferred-binding claims are placed by filter-then-rank, and a claim that
/// fits nowhere is never scheduled
pub struct SchedulerFilterPrioritize;

const DUMMY_SIZE: &str = "14Gi";

const DUMMIES: [&str; 2] = ["topo-pvc-dummy-1", "topo-pvc-dummy-2"];

/// (pod, claim, size in GiB) in the order they are created
const CONSUMERS: [(&str, &str, u64); 3] = [
    ("ubuntu1", "topo-pvc1", 8),
    ("ubuntu2", "topo-pvc2", 6),
    ("ubuntu3", "topo-pvc3", 8),
];

/// Deferred-binding claim of `size_gib` and a pod mounting it
fn consumer_manifests(ctx: &ScenarioContext, pod: &str, claim: &str, size_gib: u64) -> Result<[String; 2]> {
    let size = format!("{}Gi", size_gib);
    Ok([
        render(&manifest::claim(claim, &size, &ctx.config.storage_class, VolumeMode::Filesystem))?,
        render(&manifest::pod_with_mount(&ctx.config, pod, claim, "/test1"))?,
    ])
}

impl SchedulerFilterPrioritize {
    /// Bytes each node gave up to the dummy claims
    async fn dummy_usage(ctx: &ScenarioContext) -> Result<BTreeMap<String, u64>> {
        let mut used = BTreeMap::new();
        for claim in DUMMIES {
            let record = ctx
                .eventually(format!("LogicalVolume of {}", claim))
                .run(|| ctx.observer.volume_for_claim(&ctx.namespace, claim))
                .await?;
            *used.entry(record.node_name.clone()).or_insert(0) += parse_bytes(&record.size)?;
        }
        Ok(used)
    }

    /// Wait until every node's annotation reflects what the dummies took
    /// from `baseline`
    async fn wait_capacity_settled(
        ctx: &ScenarioContext,
        baseline: &CapacityMap,
        used: &BTreeMap<String, u64>,
    ) -> Result<CapacityMap> {
        ctx.eventually("node capacity to account for the dummy PVCs")
            .run(|| async move {
                let capacity = ctx.capacity().await?;
                for (node, bytes) in used {
                    let before = baseline.get(node).ok_or_else(|| {
                        Error::assertion(format!("dummy volume landed on {}, which has no capacity", node))
                    })?;
                    let now = capacity.get(node).unwrap_or_default();
                    let expected = before.saturating_sub(*bytes);
                    if now > expected {
                        return Err(Error::pending(format!(
                            "{} still reports {}, expected at most {}",
                            node,
                            format_bytes(now),
                            format_bytes(expected)
                        )));
                    }
                }
                Ok(capacity)
            })
            .await
    }
}

#[async_trait]
impl Scenario for SchedulerFilterPrioritize {
    fn name(&self) -> &'static str {
        "scheduler-filter-prioritize"
    }

    fn description(&self) -> &'static str {
        "scheduling pods by free capacity"
    }

    fn capacity_sensitive(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let config = &ctx.config;

        let baseline = ctx.capacity().await?;

        ctx.by("creating dummy PVCs to skew node capacity");
        let dummies = DUMMIES
            .iter()
            .map(|name| {
                render(&manifest::claim(
                    name,
                    DUMMY_SIZE,
                    &config.immediate_storage_class,
                    VolumeMode::Filesystem,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        ctx.apply(&join(&dummies)).await?;
        ctx.wait_all_bound(dummies.len()).await?;

        let used = Self::dummy_usage(ctx).await?;
        let capacity = Self::wait_capacity_settled(ctx, &baseline, &used).await?;
        ctx.by(format!("capacity after dummies: {:?}", capacity));
        let mut oracle = PlacementOracle::new(capacity);

        let mut created = Vec::new();
        let (last, placed) = CONSUMERS.split_last().ok_or_else(|| {
            Error::Internal("no consumers to place".to_string())
        })?;

        for (pod, claim, size) in placed {
            let bytes = gib(*size);
            ctx.by(format!("creating {} with a {}Gi claim", pod, size));
            let manifests = consumer_manifests(ctx, pod, claim, *size)?;
            ctx.apply(&join(&manifests)).await?;

            let node = ctx.wait_scheduled(pod).await?;
            ctx.by(format!("{} was scheduled onto {}", pod, node));
            oracle.place(bytes, &node)?;
            ctx.wait_bound(claim).await?;
            created.extend(manifests);
        }

        let (pod, claim, size) = last;
        let bytes = gib(*size);
        ctx.by(format!("creating {} whose {}Gi claim fits on no node", pod, size));
        oracle.expect_unschedulable(bytes)?;
        let manifests = consumer_manifests(ctx, pod, claim, *size)?;
        ctx.apply(&join(&manifests)).await?;
        ctx.expect_never_scheduled(pod).await?;
        created.extend(manifests);

        ctx.by("deleting the Pods and PVCs");
        created.extend(dummies);
        ctx.delete(&join(&created)).await
    }
}
