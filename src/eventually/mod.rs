//! Eventual Assertion Engine
//!
//! Bounded polling is the only way the harness waits for anything. A
//! predicate is evaluated repeatedly at a fixed interval until it succeeds,
//! fails fatally, or the deadline passes. Time comes from an injectable
//! [`Clock`] so the engine can be exercised without wall-clock delays.

pub mod clock;
pub mod poll;

pub use clock::*;
pub use poll::*;
