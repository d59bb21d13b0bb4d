//! kubectl Adapter
//!
//! Implements [`ControlPlane`] by running `kubectl`, feeding manifests on
//! stdin the same way an operator would from a shell.

use super::{CommandOutput, ControlPlane, OutputFormat, Query, Target};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Control plane reached through the kubectl CLI
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
}

impl Kubectl {
    /// Create an adapter using the given kubectl binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Run kubectl with `args`, optionally writing `input` to its stdin
    async fn run(&self, args: &[String], input: Option<&str>) -> Result<CommandOutput> {
        let command_line = self.command_line(args);
        debug!("Running {}", command_line);

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput::from(output))
    }

    fn namespace_args(args: &mut Vec<String>, namespace: Option<&str>) {
        if let Some(ns) = namespace {
            args.push("-n".to_string());
            args.push(ns.to_string());
        }
    }
}

/// Build the argument list for a `get`
pub(crate) fn get_args(query: &Query, output: &OutputFormat) -> Vec<String> {
    let mut args = vec!["get".to_string(), query.kind.clone()];
    match &query.target {
        Target::Name(name) => args.push(name.clone()),
        Target::Labels(selector) => args.push(format!("--selector={}", selector)),
        Target::All => {}
    }
    if let Some(ns) = &query.namespace {
        args.push("-n".to_string());
        args.push(ns.clone());
    }
    if let Some(selector) = &query.field_selector {
        args.push(format!("--field-selector={}", selector));
    }
    if query.ignore_not_found {
        args.push("--ignore-not-found".to_string());
    }
    match output {
        OutputFormat::Json => args.push("-o=json".to_string()),
        OutputFormat::Template(template) => {
            args.push("-o=template".to_string());
            args.push(format!("--template={}", template));
        }
        OutputFormat::Table => {}
    }
    args
}

/// True when kubectl reported that the object `name` does not exist.
/// A missing resource type (CRD not installed, unknown kind) does not count.
pub(crate) fn is_not_found(stderr: &str, name: &str) -> bool {
    stderr.contains("(NotFound)") && stderr.contains(&format!("\"{}\" not found", name))
}

#[async_trait]
impl ControlPlane for Kubectl {
    async fn apply(&self, namespace: Option<&str>, manifest: &str) -> Result<CommandOutput> {
        let mut args = vec!["apply".to_string()];
        Self::namespace_args(&mut args, namespace);
        args.extend(["-f".to_string(), "-".to_string()]);

        let command_line = self.command_line(&args);
        self.run(&args, Some(manifest)).await?.into_result(command_line)
    }

    async fn delete_manifest(
        &self,
        namespace: Option<&str>,
        manifest: &str,
    ) -> Result<CommandOutput> {
        let mut args = vec!["delete".to_string()];
        Self::namespace_args(&mut args, namespace);
        args.extend(["-f".to_string(), "-".to_string()]);

        let command_line = self.command_line(&args);
        self.run(&args, Some(manifest)).await?.into_result(command_line)
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        kind: &str,
        target: &Target,
    ) -> Result<CommandOutput> {
        let mut args = vec!["delete".to_string(), "--now=true".to_string()];
        Self::namespace_args(&mut args, namespace);
        match target {
            Target::Name(name) => args.push(format!("{}/{}", kind, name)),
            Target::Labels(selector) => {
                args.push(kind.to_string());
                args.push(format!("--selector={}", selector));
            }
            Target::All => {
                args.push(kind.to_string());
                args.push("--all".to_string());
            }
        }

        let command_line = self.command_line(&args);
        self.run(&args, None).await?.into_result(command_line)
    }

    async fn get(&self, query: &Query, output: &OutputFormat) -> Result<String> {
        let args = get_args(query, output);
        let result = self.run(&args, None).await?;
        if result.success() {
            return Ok(result.stdout);
        }

        let command_line = self.command_line(&args);
        if let Target::Name(name) = &query.target {
            if is_not_found(&result.stderr, name) {
                return Err(Error::pending(format!(
                    "{} does not exist yet: {}",
                    query,
                    result.stderr.trim()
                )));
            }
        }
        Err(result.to_error(command_line))
    }

    async fn exec(&self, namespace: &str, pod: &str, command: &[&str]) -> Result<CommandOutput> {
        let mut args = vec![
            "exec".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            pod.to_string(),
            "--".to_string(),
        ];
        args.extend(command.iter().map(|s| s.to_string()));
        self.run(&args, None).await
    }
}
