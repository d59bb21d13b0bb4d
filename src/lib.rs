//! TopoLVM E2E - Capacity-Aware Provisioning Verification Harness
//!
//! Drives a live cluster running a capacity-aware LVM volume provisioner
//! through claim creation, pod placement, inline ephemeral volumes, resize
//! and teardown, and checks that both the declarative state and the LVM
//! layer on the nodes converge to what an independent model predicts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Scenario Driver                                 │
//! │        namespace per scenario · skip gating · teardown on success only       │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │    Placement    │  │     Resize      │  │      Physical-Layer         │  │
//! │  │     Oracle      │  │    Verifier     │  │      Cross-Checker          │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │   Eventual Assertion  │                                │
//! │                    │   + State Observer    │                                │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                          External Collaborators                              │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │   Control Plane (kubectl)   │  │      Volume Manager (lvs/lvdisplay) │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cluster`]: ports to the control plane and the LVM host
//! - [`eventually`]: bounded polling with an injectable clock
//! - [`observer`]: typed snapshots of claims, pods, nodes, volumes and events
//! - [`oracle`]: node capacity and expected placements
//! - [`resize`]: filesystem calibration and resize flows
//! - [`physical`]: LV existence checks against the host
//! - [`scenario`]: scenario catalog and driver
//! - [`error`]: error types and retry classification

pub mod cluster;
pub mod config;
pub mod consumer;
pub mod crd;
pub mod error;
pub mod eventually;
pub mod observer;
pub mod oracle;
pub mod physical;
pub mod quantity;
pub mod resize;
pub mod scenario;

// Re-export commonly used types
pub use cluster::{CommandOutput, ControlPlane, Kubectl, LvmCli, VolumeManager};

pub use config::{HarnessConfig, KubernetesVersion, PollingConfig};

pub use crd::{LogicalVolume, LogicalVolumeSpec};

pub use error::{Error, ErrorClass, Result};

pub use eventually::{Clock, Eventually, TokioClock};

pub use observer::{ClaimRecord, NodeRecord, StateObserver, VolumeRecord, WorkloadRecord};

pub use oracle::{CapacityMap, PlacementOracle, Prediction, TieSetTracker};

pub use resize::{FsKind, ResizeTarget, ResizeVerifier};

pub use scenario::{Driver, Harness, Outcome, Scenario, ScenarioReport, SuiteReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
