//! Inline ephemeral volumes
//!
//! Volumes declared inside the pod spec live and die with the pod; the LV
//! count on the host is the only place their removal is visible.

use crate::error::{Error, Result};
use crate::quantity::gib;
use crate::resize::{FsKind, ResizeTarget};
use crate::scenario::manifest::{self, render, InlineVolume};
use crate::scenario::{Scenario, ScenarioContext};
use async_trait::async_trait;

const POD: &str = "ubuntu";

/// Permission bits the node plugin gives a freshly formatted mount
const MOUNT_MODE: &str = "2777";

pub struct InlineEphemeral;

impl InlineEphemeral {
    fn volumes() -> Vec<InlineVolume> {
        vec![
            InlineVolume {
                name: "my-volume".to_string(),
                mount_path: "/test1".to_string(),
                fs_type: Some(FsKind::Xfs.to_string()),
                size_gib: Some(2),
            },
            InlineVolume {
                name: "my-default-volume".to_string(),
                mount_path: "/test2".to_string(),
                fs_type: None,
                size_gib: None,
            },
        ]
    }
}

#[async_trait]
impl Scenario for InlineEphemeral {
    fn name(&self) -> &'static str {
        "inline-ephemeral"
    }

    fn description(&self) -> &'static str {
        "inline ephemeral volumes"
    }

    fn min_minor_version(&self) -> Option<u32> {
        Some(16)
    }

    /// The LV count checks cover every volume on the hosts
    fn exclusive(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
        ctx.by("reading current count of LVMs");
        let base = ctx.physical.count().await?;

        ctx.by("deploying Pod with a TopoLVM inline ephemeral volume");
        let pod = render(&manifest::pod_with_inline_volumes(&ctx.config, POD, &Self::volumes()))?;
        ctx.apply(&pod).await?;

        ctx.by("confirming that the specified mountpoints exist in the Pod");
        let consumer = ctx.consumer(POD);
        let mounts = [
            ResizeTarget::filesystem("/test1", FsKind::Xfs),
            ResizeTarget::filesystem("/test2", FsKind::Ext4),
        ];
        let sizes = [gib(2), gib(1)];
        for target in &mounts {
            if let ResizeTarget::Filesystem { mount, fs } = target {
                ctx.eventually(format!("{} mounted at {}", fs, mount))
                    .run(|| consumer.expect_filesystem(mount, fs.as_str()))
                    .await?;
            }
        }
        for (target, bytes) in mounts.iter().zip(sizes) {
            ctx.resize.expect_size(&consumer, target, bytes).await?;
        }

        ctx.by("writing file under /test1");
        ctx.eventually("/test1/bootstrap.log written")
            .run(|| consumer.write_file("/var/log/bootstrap.log", "/test1/bootstrap.log"))
            .await?;

        ctx.by("confirming the mounted dir permission is 2777");
        let mode = ctx
            .eventually("mode of /test1")
            .run(|| consumer.mode("/test1"))
            .await?;
        if mode != MOUNT_MODE {
            return Err(Error::assertion(format!(
                "/test1 has mode {}, expected {}",
                mode, MOUNT_MODE
            )));
        }

        ctx.by("confirming two LVMs were created");
        ctx.physical.expect_count(base + 2).await?;

        ctx.by("deleting the Pod");
        ctx.delete(&pod).await?;

        ctx.by("verifying that the two LVMs were removed");
        ctx.physical.expect_count(base).await
    }
}
