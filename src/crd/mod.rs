//! Custom Resource Definitions observed by the harness
//!
//! - LogicalVolume: the provisioner's record of a physical volume

pub mod logical_volume;

pub use logical_volume::*;
