//! Capacity and Placement Oracle
//!
//! Independent model of where the provisioner must place volumes, built from
//! node capacity annotations and checked against observed placements.

pub mod capacity;
pub mod placement;

pub use capacity::*;
pub use placement::*;
