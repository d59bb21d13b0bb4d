//! Scenario Catalog
//!
//! Every end-to-end check the harness knows how to run, grouped by the part
//! of the provisioner it exercises.

pub mod capacity;
pub mod ephemeral;
pub mod provisioning;
pub mod resize;
pub mod scheduler;

pub use capacity::{ImmediateLargestCapacity, SchedulerFilterPrioritize};
pub use ephemeral::InlineEphemeral;
pub use provisioning::{BlockDevice, FilesystemMount, ImmediateReschedule};
pub use resize::{BlockResize, FilesystemResize};
pub use scheduler::{SchedulerInsufficientCapacity, SchedulerReady, SchedulerSufficientCapacity};

use super::Scenario;
use crate::error::{Error, Result};
use std::sync::Arc;

/// All scenarios in run order
pub fn all() -> Vec<Arc<dyn Scenario>> {
    vec![
        Arc::new(SchedulerReady),
        Arc::new(SchedulerSufficientCapacity),
        Arc::new(SchedulerInsufficientCapacity),
        Arc::new(FilesystemMount),
        Arc::new(BlockDevice),
        Arc::new(ImmediateReschedule),
        Arc::new(InlineEphemeral),
        Arc::new(FilesystemResize),
        Arc::new(BlockResize),
        Arc::new(ImmediateLargestCapacity),
        Arc::new(SchedulerFilterPrioritize),
    ]
}

/// Scenarios named in `names`, in catalog order; all of them if `names` is empty
pub fn select(names: &[String]) -> Result<Vec<Arc<dyn Scenario>>> {
    let catalog = all();
    if names.is_empty() {
        return Ok(catalog);
    }

    if let Some(unknown) = names
        .iter()
        .find(|name| !catalog.iter().any(|s| s.name() == name.as_str()))
    {
        return Err(Error::Configuration(format!("unknown scenario: {}", unknown)));
    }

    Ok(catalog
        .into_iter()
        .filter(|s| names.iter().any(|name| name == s.name()))
        .collect())
}
