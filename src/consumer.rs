//! In-consumer probes
//!
//! Commands run inside a workload's container through the control plane.
//! A probe command that fails is reported as not-yet-converged, since the
//! container, mount or device may simply not be ready; output that cannot
//! be parsed at all is fatal.

use crate::cluster::ControlPlane;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Contents of `/etc/hostname` in the consumer image
pub const DEVICE_MARKER: &str = "ubuntu";

/// A running pod the harness can execute commands in
#[derive(Clone)]
pub struct Consumer {
    control_plane: Arc<dyn ControlPlane>,
    namespace: String,
    pod: String,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Consumer({}/{})", self.namespace, self.pod)
    }
}

impl Consumer {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        namespace: impl Into<String>,
        pod: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            namespace: namespace.into(),
            pod: pod.into(),
        }
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    async fn exec(&self, command: &[&str]) -> Result<String> {
        let output = self
            .control_plane
            .exec(&self.namespace, &self.pod, command)
            .await?;
        if !output.success() {
            return Err(Error::pending(format!(
                "`{}` in {}/{} failed: stdout={}, stderr={}",
                command.join(" "),
                self.namespace,
                self.pod,
                output.stdout.trim(),
                output.stderr.trim()
            )));
        }
        debug!("{}/{}: `{}` ok", self.namespace, self.pod, command.join(" "));
        Ok(output.stdout)
    }

    // =========================================================================
    // Filesystem Probes
    // =========================================================================

    /// `path` is a mountpoint
    pub async fn mount_exists(&self, path: &str) -> Result<()> {
        self.exec(&["mountpoint", "-d", path]).await.map(|_| ())
    }

    /// Filesystem type `path` is mounted with, from `/proc/mounts`
    pub async fn filesystem_type(&self, path: &str) -> Result<String> {
        let stdout = self.exec(&["grep", path, "/proc/mounts"]).await?;
        parse_mount_fs_type(&stdout, path)
    }

    /// Mount exists and carries the expected filesystem
    pub async fn expect_filesystem(&self, path: &str, fs_type: &str) -> Result<()> {
        self.mount_exists(path).await?;
        let actual = self.filesystem_type(path).await?;
        if actual != fs_type {
            return Err(Error::pending(format!("{} is {}, not {}", path, actual, fs_type)));
        }
        Ok(())
    }

    /// Usable size of the filesystem at `path` in 1K blocks
    pub async fn usable_blocks(&self, path: &str) -> Result<u64> {
        let stdout = self.exec(&["df", "--output=size", path]).await?;
        parse_df_size(&stdout)
    }

    /// Copy `source` to `target`, flush, and read it back
    pub async fn write_file(&self, source: &str, target: &str) -> Result<()> {
        self.exec(&["cp", source, target]).await?;
        self.exec(&["sync"]).await?;
        self.read_file(target).await.map(|_| ())
    }

    /// Contents of `path`; an empty file counts as not written yet
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let stdout = self.exec(&["cat", path]).await?;
        if stdout.trim().is_empty() {
            return Err(Error::pending(format!("{} is empty", path)));
        }
        Ok(stdout)
    }

    /// Octal permission bits of `path`
    pub async fn mode(&self, path: &str) -> Result<String> {
        let stdout = self.exec(&["stat", path, "-c", "%a"]).await?;
        Ok(stdout.trim().trim_matches('\'').to_string())
    }

    // =========================================================================
    // Block Device Probes
    // =========================================================================

    /// `device` exists and is a block device
    pub async fn block_device_exists(&self, device: &str) -> Result<()> {
        self.exec(&["test", "-b", device]).await.map(|_| ())
    }

    /// Size of `device` in bytes
    pub async fn block_device_size(&self, device: &str) -> Result<u64> {
        let stdout = self.exec(&["blockdev", "--getsize64", device]).await?;
        stdout.trim().parse().map_err(|_| Error::UnexpectedOutput {
            what: format!("blockdev --getsize64 {}", device),
            output: stdout.clone(),
        })
    }

    /// Write the image's hostname to the start of `device`
    pub async fn write_device_marker(&self, device: &str) -> Result<()> {
        let of = format!("of={}", device);
        self.exec(&["dd", "if=/etc/hostname", &of]).await?;
        self.exec(&["sync"]).await.map(|_| ())
    }

    /// Read back the marker written by [`Consumer::write_device_marker`]
    pub async fn expect_device_marker(&self, device: &str) -> Result<()> {
        let input = format!("if={}", device);
        let bs = format!("bs={}", DEVICE_MARKER.len());
        let stdout = self
            .exec(&["dd", &input, "of=/dev/stdout", &bs, "count=1", "status=none"])
            .await?;
        if stdout != DEVICE_MARKER {
            return Err(Error::pending(format!(
                "expected {:?} at the start of {}, read {:?}",
                DEVICE_MARKER, device, stdout
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Output Parsing
// =============================================================================

/// Second whitespace-separated field of `df --output=size`
pub fn parse_df_size(stdout: &str) -> Result<u64> {
    stdout
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| Error::UnexpectedOutput {
            what: "df --output=size".to_string(),
            output: stdout.to_string(),
        })
}

/// Filesystem type of the `/proc/mounts` line whose mountpoint is `path`
pub fn parse_mount_fs_type(stdout: &str, path: &str) -> Result<String> {
    stdout
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.len() > 2 && fields[1] == path)
        .map(|fields| fields[2].to_string())
        .ok_or_else(|| Error::UnexpectedOutput {
            what: format!("/proc/mounts entry for {}", path),
            output: stdout.to_string(),
        })
}
