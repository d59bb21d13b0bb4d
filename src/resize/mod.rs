//! Resize Verifier
//!
//! Expected post-resize sizes per filesystem kind, and the online, offline
//! and over-capacity resize flows that check them.

pub mod calibration;
pub mod verifier;

pub use calibration::*;
pub use verifier::*;
