//! Provisioning scenarios
//!
//! Claims consumed by a single pod: filesystem and raw block volumes, and an
//! immediately bound claim pulling its consumer onto the volume's node.

use crate::error::Result;
use crate::observer::VolumeMode;
use crate::scenario::manifest::{self, join, render};
use crate::scenario::{Scenario, ScenarioContext};
use async_trait::async_trait;

const CLAIM: &str = "topo-pvc";
const POD: &str = "ubuntu";
const MOUNT_PATH: &str = "/test1";
const DEVICE_PATH: &str = "/dev/e2etest";

// =============================================================================
// Filesystem Mount
// =============================================================================

pub struct FilesystemMount;

#[async_trait]
impl Scenario for FilesystemMount {
    fn name(&self) -> &'static str {
        "filesystem-mount"
    }

    fn description(&self) -> &'static str {
        "mounting a filesystem volume"
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let config = &ctx.config;
        let claim = render(&manifest::claim(CLAIM, "1Gi", &config.storage_class, VolumeMode::Filesystem))?;
        let pod = render(&manifest::pod_with_mount(config, POD, CLAIM, MOUNT_PATH))?;

        ctx.by("deploying Pod with PVC");
        ctx.apply(&join(&[claim.clone(), pod.clone()])).await?;

        ctx.by("confirming that the specified device exists in the Pod");
        let consumer = ctx.consumer(POD);
        ctx.eventually(format!("xfs mounted at {}", MOUNT_PATH))
            .run(|| consumer.expect_filesystem(MOUNT_PATH, "xfs"))
            .await?;

        ctx.by("writing file under /test1");
        let written = format!("{}/bootstrap.log", MOUNT_PATH);
        ctx.eventually(format!("{} written", written))
            .run(|| consumer.write_file("/var/log/bootstrap.log", &written))
            .await?;

        ctx.by("deleting the Pod, then recreating it");
        ctx.delete(&pod).await?;
        ctx.apply(&pod).await?;

        ctx.by("confirming that the file exists");
        ctx.eventually(format!("{} survives the restart", written))
            .run(|| consumer.read_file(&written))
            .await?;

        ctx.by("confirming that the lv correspond to LogicalVolume is created");
        let volume = ctx.wait_bound(CLAIM).await?;
        let lv_name = ctx.physical.expect_registered(&volume).await?;

        ctx.by("deleting the Pod and PVC");
        ctx.delete(&join(&[pod, claim])).await?;

        ctx.by("confirming the PV is deleted");
        ctx.wait_pv_deleted(&volume).await?;

        ctx.by("confirming the lv correspond to LogicalVolume is deleted");
        ctx.physical.expect_deleted(&lv_name).await
    }
}

// =============================================================================
// Block Device
// =============================================================================

pub struct BlockDevice;

#[async_trait]
impl Scenario for BlockDevice {
    fn name(&self) -> &'static str {
        "block-device"
    }

    fn description(&self) -> &'static str {
        "exposing a raw block volume"
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let config = &ctx.config;
        let claim = render(&manifest::claim(CLAIM, "1Gi", &config.storage_class, VolumeMode::Block))?;
        let pod = render(&manifest::pod_with_device(config, POD, CLAIM, DEVICE_PATH))?;

        ctx.by("deploying Pod with PVC");
        ctx.apply(&join(&[claim.clone(), pod.clone()])).await?;

        ctx.by("confirming that a block device exists in ubuntu pod");
        let consumer = ctx.consumer(POD);
        ctx.eventually(format!("block device {}", DEVICE_PATH))
            .run(|| consumer.block_device_exists(DEVICE_PATH))
            .await?;

        ctx.by("writing data to a block device");
        ctx.eventually(format!("marker written to {}", DEVICE_PATH))
            .run(|| consumer.write_device_marker(DEVICE_PATH))
            .await?;

        ctx.by("deleting the Pod, then recreating it");
        ctx.delete(&pod).await?;
        ctx.apply(&pod).await?;

        ctx.by("reading data from a block device");
        ctx.eventually(format!("marker read back from {}", DEVICE_PATH))
            .run(|| consumer.expect_device_marker(DEVICE_PATH))
            .await?;

        ctx.by("confirming that the lv correspond to LogicalVolume is created");
        let volume = ctx.wait_bound(CLAIM).await?;
        let lv_name = ctx.physical.expect_registered(&volume).await?;

        ctx.by("deleting the Pod and PVC");
        ctx.delete(&join(&[pod, claim])).await?;

        ctx.by("confirming the PV is deleted");
        ctx.wait_pv_deleted(&volume).await?;

        ctx.by("confirming the lv correspond to LogicalVolume is deleted");
        ctx.physical.expect_deleted(&lv_name).await
    }
}

// =============================================================================
// Immediate Reschedule
// =============================================================================

/// A pod using an immediately bound claim always lands on the volume's node
pub struct ImmediateReschedule;

#[async_trait]
impl Scenario for ImmediateReschedule {
    fn name(&self) -> &'static str {
        "immediate-reschedule"
    }

    fn description(&self) -> &'static str {
        "scheduling a pod onto its immediately bound volume"
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let config = &ctx.config;
        let claim = render(&manifest::claim(
            CLAIM,
            "1Gi",
            &config.immediate_storage_class,
            VolumeMode::Filesystem,
        ))?;
        let pod = render(&manifest::pod_with_mount(config, POD, CLAIM, MOUNT_PATH))?;

        ctx.by("creating a PVC with immediate binding");
        ctx.apply(&claim).await?;
        let volume = ctx.wait_bound(CLAIM).await?;

        ctx.by("finding the node the LogicalVolume was created on");
        let record = ctx
            .eventually(format!("LogicalVolume {}", volume))
            .run(|| ctx.observer.logical_volume(&volume))
            .await?;
        let node = record.node_name;

        ctx.by(format!("deploying the Pod, expecting it on {}", node));
        ctx.apply(&pod).await?;
        ctx.wait_scheduled_on(POD, &node).await?;

        ctx.by("deleting the Pod, then recreating it");
        ctx.delete(&pod).await?;
        ctx.apply(&pod).await?;
        ctx.wait_scheduled_on(POD, &node).await?;

        ctx.by("deleting the Pod and PVC");
        ctx.delete(&join(&[pod, claim])).await?;
        ctx.wait_pv_deleted(&volume).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{self, FakeCluster};
    use crate::cluster::CommandOutput;
    use crate::error::Error;
    use crate::scenario::catalog::testing::{context, NS};
    use assert_matches::assert_matches;

    fn bound_claim(fake: &FakeCluster) {
        fake.put("pvc", Some(NS), CLAIM, fake::claim(NS, CLAIM, "1Gi", Some("pvc-1")));
        fake.put("logicalvolumes", None, "pvc-1", fake::logical_volume("pvc-1", "worker-2", "uid-1"));
    }

    #[tokio::test]
    async fn test_filesystem_mount() {
        let fake = FakeCluster::new();
        bound_claim(&fake);
        fake.script_exec(POD, &["mountpoint", "-d", MOUNT_PATH], vec![CommandOutput::ok("253:1\n")]);
        fake.script_exec(
            POD,
            &["grep", MOUNT_PATH, "/proc/mounts"],
            vec![CommandOutput::ok("/dev/topolvm/uid-1 /test1 xfs rw,relatime 0 0\n")],
        );
        fake.script_exec(POD, &["cp", "/var/log/bootstrap.log", "/test1/bootstrap.log"], vec![CommandOutput::ok("")]);
        fake.script_exec(POD, &["sync"], vec![CommandOutput::ok("")]);
        fake.script_exec(POD, &["cat", "/test1/bootstrap.log"], vec![CommandOutput::ok("bootstrap\n")]);
        fake.script_lvs(vec![vec!["uid-1"], vec![]]);

        FilesystemMount.run(&context(&fake, "filesystem-mount")).await.unwrap();

        let deleted = fake.deleted();
        assert_eq!(deleted.first().map(String::as_str), Some("pods/ubuntu"));
        assert!(deleted.contains(&"pvc/topo-pvc".to_string()));
    }

    #[tokio::test]
    async fn test_filesystem_mount_wrong_fs_times_out() {
        let fake = FakeCluster::new();
        bound_claim(&fake);
        fake.script_exec(POD, &["mountpoint", "-d", MOUNT_PATH], vec![CommandOutput::ok("253:1\n")]);
        fake.script_exec(
            POD,
            &["grep", MOUNT_PATH, "/proc/mounts"],
            vec![CommandOutput::ok("/dev/topolvm/uid-1 /test1 ext4 rw 0 0\n")],
        );

        assert_matches!(
            FilesystemMount.run(&context(&fake, "filesystem-mount")).await,
            Err(Error::Timeout { .. })
        );
    }

    #[tokio::test]
    async fn test_immediate_reschedule_on_other_node_fails() {
        let fake = FakeCluster::new();
        bound_claim(&fake);
        fake.put("pod", Some(NS), POD, fake::pod(NS, POD, Some("worker-1"), &[]));

        assert_matches!(
            ImmediateReschedule.run(&context(&fake, "immediate-reschedule")).await,
            Err(Error::Timeout { .. })
        );
    }

    #[tokio::test]
    async fn test_immediate_reschedule() {
        let fake = FakeCluster::new();
        bound_claim(&fake);
        fake.converge_to("pod", Some(NS), POD, fake::pod(NS, POD, Some("worker-2"), &[]));

        ImmediateReschedule
            .run(&context(&fake, "immediate-reschedule"))
            .await
            .unwrap();
        assert_eq!(
            fake.deleted().iter().filter(|d| d.as_str() == "pods/ubuntu").count(),
            2
        );
    }
}
