//! External Collaborators
//!
//! The harness never reimplements the cluster; it talks to it through two
//! narrow ports:
//! - [`ControlPlane`]: apply, delete, get and exec against the declarative API
//! - [`VolumeManager`]: read-only queries against the physical LVM layer
//!
//! Production adapters shell out to `kubectl` and the LVM tools.

pub mod kubectl;
pub mod lvm;

#[cfg(test)]
pub mod fake;

pub use kubectl::*;
pub use lvm::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;

// =============================================================================
// Command Output
// =============================================================================

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status: {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Build the error describing this output as a failure of `command`
    pub fn to_error(&self, command: impl Into<String>) -> Error {
        Error::Command {
            command: command.into(),
            status: self.status(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }

    /// Turn a non-zero exit into [`Error::Command`]
    pub fn into_result(self, command: impl Into<String>) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(self.to_error(command))
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Which objects of a kind a query selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single object by name
    Name(String),
    /// Objects matching a label selector
    Labels(String),
    /// Every object of the kind
    All,
}

/// How a query's result is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Full JSON document
    Json,
    /// Go template evaluated against the object
    Template(String),
    /// Human-readable table
    Table,
}

/// A `get` against the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: String,
    pub namespace: Option<String>,
    pub target: Target,
    pub field_selector: Option<String>,
    /// Return empty output instead of failing when the object is absent
    pub ignore_not_found: bool,
}

impl Query {
    /// Query one named object
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            target: Target::Name(name.into()),
            field_selector: None,
            ignore_not_found: false,
        }
    }

    /// Query every object of a kind
    pub fn all(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            target: Target::All,
            field_selector: None,
            ignore_not_found: false,
        }
    }

    /// Query objects by label selector
    pub fn labeled(kind: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            target: Target::Labels(selector.into()),
            field_selector: None,
            ignore_not_found: false,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_field_selector(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    pub fn ignoring_not_found(mut self) -> Self {
        self.ignore_not_found = true;
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Name(name) => write!(f, "{}/{}", self.kind, name)?,
            Target::Labels(selector) => write!(f, "{} -l {}", self.kind, selector)?,
            Target::All => write!(f, "{}", self.kind)?,
        }
        if let Some(ns) = &self.namespace {
            write!(f, " -n {}", ns)?;
        }
        if let Some(selector) = &self.field_selector {
            write!(f, " --field-selector={}", selector)?;
        }
        Ok(())
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Declarative resource store and its API
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Apply a (multi-document) YAML manifest
    async fn apply(&self, namespace: Option<&str>, manifest: &str) -> Result<CommandOutput>;

    /// Delete every object described by a YAML manifest
    async fn delete_manifest(&self, namespace: Option<&str>, manifest: &str)
        -> Result<CommandOutput>;

    /// Delete objects of `kind` selected by `target`, without waiting for grace periods
    async fn delete(&self, namespace: Option<&str>, kind: &str, target: &Target)
        -> Result<CommandOutput>;

    /// Read objects
    ///
    /// A missing named object is reported as [`Error::NotConverged`] unless
    /// the query ignores not-found; any other failure is [`Error::Command`].
    async fn get(&self, query: &Query, output: &OutputFormat) -> Result<String>;

    /// Run a command inside a running pod, capturing its output and exit code
    async fn exec(&self, namespace: &str, pod: &str, command: &[&str]) -> Result<CommandOutput>;
}

/// Physical volume manager, queried only for ground truth
#[async_trait]
pub trait VolumeManager: Send + Sync {
    /// Display logical volumes whose name is `lv_name`; empty when none exist
    async fn display(&self, lv_name: &str) -> Result<String>;

    /// Names of every logical volume on the host
    async fn list_names(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_into_result() {
        assert!(CommandOutput::ok("done").into_result("kubectl apply").is_ok());

        let err = CommandOutput::failed(1, "forbidden")
            .into_result("kubectl apply")
            .unwrap_err();
        assert_matches!(err, Error::Command { status, stderr, .. }
            if status == "exit status: 1" && stderr == "forbidden");
    }

    #[test]
    fn test_query_display() {
        let query = Query::all("events")
            .in_namespace("e2etest-abc")
            .with_field_selector("reason=VolumeResizeFailed");
        assert_eq!(
            query.to_string(),
            "events -n e2etest-abc --field-selector=reason=VolumeResizeFailed"
        );
        assert_eq!(Query::named("pv", "pvc-1").to_string(), "pv/pvc-1");
    }
}
