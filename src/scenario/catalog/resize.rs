//! Volume expansion scenarios

use crate::error::Result;
use crate::observer::VolumeMode;
use crate::quantity::gib;
use crate::resize::{FsKind, ResizeSubject, ResizeTarget};
use crate::scenario::manifest::{self, join, render};
use crate::scenario::{Scenario, ScenarioContext};
use async_trait::async_trait;

const CLAIM: &str = "topo-pvc";
const POD: &str = "ubuntu";

fn claim(ctx: &ScenarioContext, size: &str, mode: VolumeMode) -> Result<String> {
    render(&manifest::claim(CLAIM, size, &ctx.config.storage_class, mode))
}

// =============================================================================
// Filesystem Resize
// =============================================================================

pub struct FilesystemResize;

#[async_trait]
impl Scenario for FilesystemResize {
    fn name(&self) -> &'static str {
        "filesystem-resize"
    }

    fn description(&self) -> &'static str {
        "resizing"
    }

    fn min_minor_version(&self) -> Option<u32> {
        Some(16)
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let pod = render(&manifest::pod_with_mount(&ctx.config, POD, CLAIM, "/test1"))?;
        let fs_claim = |size: &str| claim(ctx, size, VolumeMode::Filesystem);

        ctx.by("deploying Pod with PVC");
        ctx.apply(&join(&[fs_claim("1Gi")?, pod.clone()])).await?;

        let consumer = ctx.consumer(POD);
        ctx.eventually("xfs mounted at /test1")
            .run(|| consumer.expect_filesystem("/test1", "xfs"))
            .await?;

        let subject = ResizeSubject {
            namespace: ctx.namespace.clone(),
            claim: CLAIM.to_string(),
            pod_manifest: pod,
        };
        let target = ResizeTarget::filesystem("/test1", FsKind::Xfs);

        ctx.by("resizing PVC online");
        ctx.resize
            .online(&subject, &fs_claim("2Gi")?, &consumer, &target, gib(2))
            .await?;

        ctx.by("resizing PVC offline");
        ctx.resize
            .offline(&subject, &fs_claim("3Gi")?, &consumer, &target, gib(3))
            .await?;

        ctx.by("deleting topolvm-node pods to clear /dev/topolvm/*");
        ctx.restart_node_plugins().await?;

        ctx.by("resizing PVC");
        ctx.resize
            .online(&subject, &fs_claim("4Gi")?, &consumer, &target, gib(4))
            .await?;

        ctx.by("confirming that no failure event has occurred");
        ctx.resize.expect_no_failures(&subject).await?;

        ctx.by("resizing PVC over vg capacity");
        ctx.resize
            .over_capacity(&subject, &fs_claim("100Gi")?, &consumer, &target)
            .await
    }
}

// =============================================================================
// Block Resize
// =============================================================================

pub struct BlockResize;

#[async_trait]
impl Scenario for BlockResize {
    fn name(&self) -> &'static str {
        "block-resize"
    }

    fn description(&self) -> &'static str {
        "resizing"
    }

    fn min_minor_version(&self) -> Option<u32> {
        Some(16)
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        let device = "/dev/e2etest";
        let pod = render(&manifest::pod_with_device(&ctx.config, POD, CLAIM, device))?;

        ctx.by("deploying Pod with PVC");
        ctx.apply(&join(&[claim(ctx, "1Gi", VolumeMode::Block)?, pod.clone()]))
            .await?;

        let consumer = ctx.consumer(POD);
        ctx.eventually(format!("block device {}", device))
            .run(|| consumer.block_device_exists(device))
            .await?;

        let subject = ResizeSubject {
            namespace: ctx.namespace.clone(),
            claim: CLAIM.to_string(),
            pod_manifest: pod,
        };
        let target = ResizeTarget::block(device);
        ctx.resize.expect_size(&consumer, &target, gib(1)).await?;

        ctx.by("resizing PVC");
        ctx.resize
            .online(
                &subject,
                &claim(ctx, "2Gi", VolumeMode::Block)?,
                &consumer,
                &target,
                gib(2),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{self, FakeCluster};
    use crate::cluster::CommandOutput;
    use crate::error::Error;
    use crate::resize::RESIZE_FAILED_REASON;
    use crate::scenario::catalog::testing::{context, NS};
    use assert_matches::assert_matches;

    fn mounted_xfs(fake: &FakeCluster) {
        fake.script_exec(POD, &["mountpoint", "-d", "/test1"], vec![CommandOutput::ok("253:1\n")]);
        fake.script_exec(
            POD,
            &["grep", "/test1", "/proc/mounts"],
            vec![CommandOutput::ok("/dev/topolvm/x /test1 xfs rw 0 0\n")],
        );
    }

    #[tokio::test]
    async fn test_filesystem_resize_without_failure_event() {
        let fake = FakeCluster::new();
        mounted_xfs(&fake);
        fake.script_exec(
            POD,
            &["df", "--output=size", "/test1"],
            ["2086912", "3135488", "4184064"]
                .iter()
                .map(|blocks| CommandOutput::ok(format!("1K-blocks\n{}\n", blocks)))
                .collect(),
        );
        fake.put("pod", Some("topolvm-system"), "node", fake::pod("topolvm-system", "node", Some("worker-1"), &[]));

        let err = FilesystemResize
            .run(&context(&fake, "filesystem-resize"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Timeout { ref what, .. } if what.contains(RESIZE_FAILED_REASON));

        let deleted = fake.deleted();
        assert_eq!(deleted, vec!["pods/ubuntu", "pods/node"]);

        let sizes: Vec<_> = fake
            .applied()
            .iter()
            .filter(|doc| doc["kind"] == "PersistentVolumeClaim")
            .map(|doc| doc["spec"]["resources"]["requests"]["storage"].clone())
            .collect();
        assert_eq!(sizes, vec!["1Gi", "2Gi", "3Gi", "4Gi", "100Gi"]);
    }

    #[tokio::test]
    async fn test_filesystem_resize() {
        let fake = FakeCluster::new();
        mounted_xfs(&fake);
        fake.script_exec(
            POD,
            &["df", "--output=size", "/test1"],
            ["2086912", "3135488", "4184064"]
                .iter()
                .map(|blocks| CommandOutput::ok(format!("1K-blocks\n{}\n", blocks)))
                .collect(),
        );
        fake.put("pod", Some("topolvm-system"), "node", fake::pod("topolvm-system", "node", Some("worker-1"), &[]));
        // applies: initial, 2Gi, 3Gi claim, 3Gi pod, 4Gi, then the 100Gi request
        fake.on_nth_apply(
            6,
            "events",
            Some(NS),
            "topo-pvc.1",
            fake::event(NS, "topo-pvc.1", "PersistentVolumeClaim", CLAIM, RESIZE_FAILED_REASON),
        );

        FilesystemResize
            .run(&context(&fake, "filesystem-resize"))
            .await
            .unwrap();

        let last = fake.applied().pop().unwrap();
        assert_eq!(last["spec"]["resources"]["requests"]["storage"], "100Gi");
        assert_eq!(fake.deleted(), vec!["pods/ubuntu", "pods/node"]);
    }

    #[tokio::test]
    async fn test_filesystem_resize_rejects_earlier_failure() {
        let fake = FakeCluster::new();
        mounted_xfs(&fake);
        fake.script_exec(
            POD,
            &["df", "--output=size", "/test1"],
            ["2086912", "3135488", "4184064"]
                .iter()
                .map(|blocks| CommandOutput::ok(format!("1K-blocks\n{}\n", blocks)))
                .collect(),
        );
        fake.put(
            "events",
            Some(NS),
            "topo-pvc.1",
            fake::event(NS, "topo-pvc.1", "PersistentVolumeClaim", CLAIM, RESIZE_FAILED_REASON),
        );

        assert_matches!(
            FilesystemResize.run(&context(&fake, "filesystem-resize")).await,
            Err(Error::Assertion(_))
        );
    }

    #[tokio::test]
    async fn test_block_resize() {
        let fake = FakeCluster::new();
        fake.script_exec(POD, &["test", "-b", "/dev/e2etest"], vec![CommandOutput::ok("")]);
        fake.script_exec(
            POD,
            &["blockdev", "--getsize64", "/dev/e2etest"],
            vec![CommandOutput::ok("1073741824\n"), CommandOutput::ok("2147483648\n")],
        );

        BlockResize.run(&context(&fake, "block-resize")).await.unwrap();
        assert_eq!(fake.applied()[2]["spec"]["volumeMode"], "Block");
    }
}
