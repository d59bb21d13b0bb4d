//! LVM Adapter
//!
//! Read-only access to the host's logical volumes via `lvdisplay` and `lvs`,
//! bypassing the Kubernetes API entirely.

use super::{CommandOutput, VolumeManager};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Physical volume manager reached through the LVM command line tools
#[derive(Debug, Clone)]
pub struct LvmCli {
    /// Privilege wrapper, e.g. `sudo`; empty to run the tools directly
    sudo: String,
}

impl LvmCli {
    pub fn new(sudo: impl Into<String>) -> Self {
        Self { sudo: sudo.into() }
    }

    async fn run(&self, tool: &str, args: &[&str]) -> Result<CommandOutput> {
        let (program, mut argv): (&str, Vec<&str>) = if self.sudo.is_empty() {
            (tool, Vec::new())
        } else {
            (self.sudo.as_str(), vec![tool])
        };
        argv.extend_from_slice(args);

        let command_line = format!("{} {}", program, argv.join(" "));
        debug!("Running {}", command_line);

        let output = Command::new(program)
            .args(&argv)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                command: command_line.clone(),
                source,
            })?;

        CommandOutput::from(output).into_result(command_line)
    }
}

/// Parse `lvs -o lv_name --noheadings` output into names
pub fn parse_lv_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl VolumeManager for LvmCli {
    async fn display(&self, lv_name: &str) -> Result<String> {
        let selector = format!("lv_name={}", lv_name);
        let output = self.run("lvdisplay", &["--select", &selector]).await?;
        Ok(output.stdout)
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let output = self.run("lvs", &["-o", "lv_name", "--noheadings"]).await?;
        Ok(parse_lv_names(&output.stdout))
    }
}
