//! Physical-Layer Cross-Checker
//!
//! Confirms against LVM itself, not the LogicalVolume records, that a volume
//! was really created or really removed. Declarative and physical state
//! converge independently, so a leaked LV or a record with no LV behind it
//! only shows up here.

use crate::cluster::VolumeManager;
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::eventually::{Clock, Eventually};
use crate::observer::StateObserver;
use std::sync::Arc;
use tracing::info;

/// Out-of-band existence checks against the volume manager
pub struct PhysicalChecker {
    volumes: Arc<dyn VolumeManager>,
    observer: StateObserver,
    clock: Arc<dyn Clock>,
    config: Arc<HarnessConfig>,
}

impl PhysicalChecker {
    pub fn new(
        volumes: Arc<dyn VolumeManager>,
        observer: StateObserver,
        clock: Arc<dyn Clock>,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Self {
            volumes,
            observer,
            clock,
            config,
        }
    }

    fn eventually(&self, what: impl Into<String>) -> Eventually {
        Eventually::new(self.clock.clone(), &self.config.polling).describe(what)
    }

    async fn lv_exists(&self, lv_name: &str) -> Result<bool> {
        Ok(!self.volumes.display(lv_name).await?.trim().is_empty())
    }

    /// Wait until the LV behind LogicalVolume `volume` exists; returns its name
    ///
    /// The returned name is the record's uid. Keep it: once the record is
    /// deleted it can no longer be looked up.
    pub async fn expect_registered(&self, volume: &str) -> Result<String> {
        let lv_name = self
            .eventually(format!("LV for {} registered in LVM", volume))
            .run(|| async move {
                let lv_name = self.observer.logical_volume_uid(volume).await?;
                if !self.lv_exists(&lv_name).await? {
                    return Err(Error::pending(format!("lv_name ( {} ) not found", lv_name)));
                }
                Ok(lv_name)
            })
            .await?;
        info!("LV {} backs {}", lv_name, volume);
        Ok(lv_name)
    }

    /// Wait until the LV named `lv_name` is gone
    pub async fn expect_deleted(&self, lv_name: &str) -> Result<()> {
        self.eventually(format!("LV {} deleted from LVM", lv_name))
            .run(|| async move {
                if self.lv_exists(lv_name).await? {
                    return Err(Error::pending(format!("lv_name ( {} ) still exists", lv_name)));
                }
                Ok(())
            })
            .await
    }

    /// Number of LVs currently on the host
    pub async fn count(&self) -> Result<usize> {
        Ok(self.volumes.list_names().await?.len())
    }

    /// Wait until the host holds exactly `expected` LVs
    pub async fn expect_count(&self, expected: usize) -> Result<()> {
        self.eventually(format!("{} LVs in LVM", expected))
            .run(|| async move {
                let actual = self.count().await?;
                if actual != expected {
                    return Err(Error::pending(format!(
                        "LV count is {}, expected {}",
                        actual, expected
                    )));
                }
                Ok(())
            })
            .await
    }
}
