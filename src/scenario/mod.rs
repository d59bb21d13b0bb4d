//! Scenarios
//!
//! A scenario is a sequence of steps (apply, wait, mutate, assert, delete)
//! run in its own namespace. Any failing step ends the scenario; retries
//! happen only inside individual waits.

pub mod catalog;
pub mod context;
pub mod driver;
pub mod manifest;

pub use context::{Harness, ScenarioContext};
pub use driver::{Driver, Outcome, ScenarioReport, SuiteReport};

use crate::config::HarnessConfig;
use crate::error::Result;
use async_trait::async_trait;

/// One end-to-end check
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Stable name used on the command line and in reports
    fn name(&self) -> &'static str;

    /// Human-readable summary
    fn description(&self) -> &'static str;

    /// Lowest Kubernetes minor version (1.x) the scenario can run on
    fn min_minor_version(&self) -> Option<u32> {
        None
    }

    /// Whether the scenario reads node capacity and expects nobody else to
    /// consume it while it runs
    fn capacity_sensitive(&self) -> bool {
        false
    }

    /// Whether the scenario must run with no other scenario in flight.
    /// Scenarios that count cluster-wide resources need this even when they
    /// don't depend on free capacity.
    fn exclusive(&self) -> bool {
        self.capacity_sensitive()
    }

    fn namespace_prefix(&self, config: &HarnessConfig) -> String {
        config.namespace_prefix.clone()
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<()>;
}
