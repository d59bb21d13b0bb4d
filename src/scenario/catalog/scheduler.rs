//! Scheduler extension scenarios
//!
//! Pods that carry a capacity request in an annotation instead of a claim,
//! so the extension alone decides whether they fit.

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::quantity::gib;
use crate::scenario::manifest::{self, render};
use crate::scenario::{Scenario, ScenarioContext};
use async_trait::async_trait;

const POD: &str = "testhttpd";

// =============================================================================
// Scheduler Ready
// =============================================================================

pub struct SchedulerReady;

#[async_trait]
impl Scenario for SchedulerReady {
    fn name(&self) -> &'static str {
        "scheduler-ready"
    }

    fn description(&self) -> &'static str {
        "running the scheduler extension"
    }

    fn namespace_prefix(&self, config: &HarnessConfig) -> String {
        config.scheduler_namespace_prefix.clone()
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let namespace = &ctx.config.system_namespace;
        let selector = &ctx.config.scheduler_selector;

        ctx.by("waiting for topolvm-scheduler to become ready");
        ctx.eventually(format!("{} pods ready in {}", selector, namespace))
            .run(|| async move {
                let pods = ctx.observer.workloads(namespace, selector).await?;
                if pods.is_empty() {
                    return Err(Error::pending("topolvm-scheduler daemonset has no pods"));
                }
                if let Some(pod) = pods.iter().find(|p| !p.is_ready()) {
                    return Err(Error::pending(format!("{} is not yet ready", pod.name)));
                }
                Ok(())
            })
            .await
    }
}

// =============================================================================
// Capacity Requests
// =============================================================================

pub struct SchedulerSufficientCapacity;

#[async_trait]
impl Scenario for SchedulerSufficientCapacity {
    fn name(&self) -> &'static str {
        "scheduler-sufficient-capacity"
    }

    fn description(&self) -> &'static str {
        "scheduling a pod whose capacity request fits"
    }

    fn namespace_prefix(&self, config: &HarnessConfig) -> String {
        config.scheduler_namespace_prefix.clone()
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        ctx.by("creating a pod requesting 1Gi");
        ctx.apply(&render(&manifest::capacity_pod(&ctx.config, POD, gib(1)))?)
            .await?;

        ctx.by("waiting for the pod to become ready");
        ctx.wait_ready(POD).await
    }
}

pub struct SchedulerInsufficientCapacity;

#[async_trait]
impl Scenario for SchedulerInsufficientCapacity {
    fn name(&self) -> &'static str {
        "scheduler-insufficient-capacity"
    }

    fn description(&self) -> &'static str {
        "rejecting a pod whose capacity request fits nowhere"
    }

    fn namespace_prefix(&self, config: &HarnessConfig) -> String {
        config.scheduler_namespace_prefix.clone()
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        ctx.by("creating a pod requesting 20Gi");
        ctx.apply(&render(&manifest::capacity_pod(&ctx.config, POD, gib(20)))?)
            .await?;

        ctx.by("confirming the pod is not scheduled");
        ctx.wait_unschedulable(POD).await
    }
}
