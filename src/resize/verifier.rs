//! Resize Verifier
//!
//! Drives a claim through a size change and checks the size the consumer
//! observes afterwards. Three paths are supported:
//! - online: consumer keeps running while the claim grows
//! - offline: consumer is deleted, the claim grows, the consumer is recreated
//! - over capacity: the request cannot be satisfied; the size must stay put
//!   and the provisioner must report exactly one failure event

use super::calibration::{expected_size, ExpectedSize, FsKind};
use crate::cluster::ControlPlane;
use crate::config::HarnessConfig;
use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::eventually::{Clock, Eventually};
use crate::observer::{EventRecord, StateObserver};
use std::sync::Arc;
use tracing::info;

/// Event reason the resizer emits when expansion fails
pub const RESIZE_FAILED_REASON: &str = "VolumeResizeFailed";

// =============================================================================
// Resize Target
// =============================================================================

/// Where the consumer sees the volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeTarget {
    /// Formatted filesystem mounted at `mount`
    Filesystem { mount: String, fs: FsKind },
    /// Raw block device at `device`
    Block { device: String },
}

impl ResizeTarget {
    pub fn filesystem(mount: impl Into<String>, fs: FsKind) -> Self {
        ResizeTarget::Filesystem {
            mount: mount.into(),
            fs,
        }
    }

    pub fn block(device: impl Into<String>) -> Self {
        ResizeTarget::Block {
            device: device.into(),
        }
    }

    fn fs(&self) -> Option<FsKind> {
        match self {
            ResizeTarget::Filesystem { fs, .. } => Some(*fs),
            ResizeTarget::Block { .. } => None,
        }
    }

    /// Expected probe reading for a volume of `bytes`
    pub fn expected(&self, bytes: u64) -> Result<ExpectedSize> {
        expected_size(self.fs(), bytes)
    }

    /// Current reading, in the unit [`ResizeTarget::expected`] uses
    pub async fn observe(&self, consumer: &Consumer) -> Result<u64> {
        match self {
            ResizeTarget::Filesystem { mount, .. } => consumer.usable_blocks(mount).await,
            ResizeTarget::Block { device } => consumer.block_device_size(device).await,
        }
    }
}

// =============================================================================
// Claim Under Test
// =============================================================================

/// A claim and the manifests needed to change it
#[derive(Debug, Clone)]
pub struct ResizeSubject {
    pub namespace: String,
    pub claim: String,
    /// Manifest of the consumer pod, for offline resize
    pub pod_manifest: String,
}

// =============================================================================
// Verifier
// =============================================================================

/// Runs the resize paths against one claim
pub struct ResizeVerifier {
    control_plane: Arc<dyn ControlPlane>,
    observer: StateObserver,
    clock: Arc<dyn Clock>,
    config: Arc<HarnessConfig>,
}

impl ResizeVerifier {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        observer: StateObserver,
        clock: Arc<dyn Clock>,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Self {
            control_plane,
            observer,
            clock,
            config,
        }
    }

    fn eventually(&self, what: impl Into<String>) -> Eventually {
        Eventually::new(self.clock.clone(), &self.config.polling)
            .timeout(self.config.polling.resize_timeout)
            .describe(what)
    }

    /// Wait until the consumer reports the size expected for `bytes`
    pub async fn expect_size(
        &self,
        consumer: &Consumer,
        target: &ResizeTarget,
        bytes: u64,
    ) -> Result<()> {
        let expected = target.expected(bytes)?.value();
        self.eventually(format!("{} to report {}", consumer.pod(), expected))
            .run(|| async move {
                let actual = target.observe(consumer).await?;
                if actual != expected {
                    return Err(Error::pending(format!(
                        "size mismatch: actual {}, expected {}",
                        actual, expected
                    )));
                }
                Ok(())
            })
            .await
    }

    /// Grow the claim while the consumer keeps running
    pub async fn online(
        &self,
        subject: &ResizeSubject,
        claim_manifest: &str,
        consumer: &Consumer,
        target: &ResizeTarget,
        bytes: u64,
    ) -> Result<()> {
        info!("Resizing pvc {}/{} online", subject.namespace, subject.claim);
        self.control_plane
            .apply(Some(&subject.namespace), claim_manifest)
            .await?;
        self.expect_size(consumer, target, bytes).await
    }

    /// Delete the consumer, grow the claim, recreate the consumer
    pub async fn offline(
        &self,
        subject: &ResizeSubject,
        claim_manifest: &str,
        consumer: &Consumer,
        target: &ResizeTarget,
        bytes: u64,
    ) -> Result<()> {
        let ns = Some(subject.namespace.as_str());
        info!("Deleting pod {} for offline resizing", consumer.pod());
        self.control_plane
            .delete_manifest(ns, &subject.pod_manifest)
            .await?;

        info!("Resizing pvc {}/{} offline", subject.namespace, subject.claim);
        self.control_plane.apply(ns, claim_manifest).await?;
        self.control_plane.apply(ns, &subject.pod_manifest).await?;

        self.expect_size(consumer, target, bytes).await
    }

    /// Failure events already recorded for the claim
    pub async fn failure_events(&self, subject: &ResizeSubject) -> Result<Vec<EventRecord>> {
        self.observer
            .events(
                &subject.namespace,
                "PersistentVolumeClaim",
                &subject.claim,
                RESIZE_FAILED_REASON,
            )
            .await
    }

    /// Fail unless no resize failure has been reported for the claim
    pub async fn expect_no_failures(&self, subject: &ResizeSubject) -> Result<()> {
        let events = self.failure_events(subject).await?;
        if events.is_empty() {
            return Ok(());
        }
        Err(Error::assertion(format!(
            "{} {} event(s) for pvc {}/{} before any over-capacity request: {}",
            events.len(),
            RESIZE_FAILED_REASON,
            subject.namespace,
            subject.claim,
            messages(&events)
        )))
    }

    /// Request more than the volume group can hold
    ///
    /// Zero failure events must exist beforehand. Afterwards exactly one must
    /// appear within the resize bound, and the consumer's size must not move.
    pub async fn over_capacity(
        &self,
        subject: &ResizeSubject,
        claim_manifest: &str,
        consumer: &Consumer,
        target: &ResizeTarget,
    ) -> Result<()> {
        self.expect_no_failures(subject).await?;

        let before = self
            .eventually(format!("{} size before over-capacity resize", consumer.pod()))
            .run(|| target.observe(consumer))
            .await?;

        info!("Resizing pvc {}/{} over vg capacity", subject.namespace, subject.claim);
        self.control_plane
            .apply(Some(&subject.namespace), claim_manifest)
            .await?;

        let events = self
            .eventually(format!("{} event for pvc {}", RESIZE_FAILED_REASON, subject.claim))
            .run(|| async move {
                let events = self.failure_events(subject).await?;
                if events.is_empty() {
                    return Err(Error::pending("failure event not found"));
                }
                Ok(events)
            })
            .await?;
        expect_single_failure(&events)?;

        let after = self
            .eventually(format!("{} size after over-capacity resize", consumer.pod()))
            .run(|| target.observe(consumer))
            .await?;
        if after != before {
            return Err(Error::assertion(format!(
                "size changed from {} to {} although the resize failed",
                before, after
            )));
        }

        // a second failure may be reported after the first was seen
        expect_single_failure(&self.failure_events(subject).await?)
    }
}

fn messages(events: &[EventRecord]) -> String {
    events
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn expect_single_failure(events: &[EventRecord]) -> Result<()> {
    if events.len() == 1 {
        return Ok(());
    }
    Err(Error::assertion(format!(
        "expected exactly one {} event, found {}: {}",
        RESIZE_FAILED_REASON,
        events.len(),
        messages(events)
    )))
}
