//! Filesystem size calibration
//!
//! Maps a raw volume size to the usable size `df` reports once the volume is
//! formatted. Each filesystem is calibrated from measured reference points:
//! two points fix a line (per-byte slope plus fixed overhead), a single point
//! is scaled proportionally. Overheads differ per filesystem and are never
//! shared between kinds.

use crate::error::{Error, Result};
use crate::quantity::gib;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Filesystem Kind
// =============================================================================

const XFS_POINTS: &[(u64, u64)] = &[(gib(2), 2_086_912), (gib(3), 3_135_488)];

const EXT4_POINTS: &[(u64, u64)] = &[(gib(1), 999_320)];

/// Filesystems the provisioner formats volumes with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsKind {
    Xfs,
    Ext4,
}

impl FsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsKind::Xfs => "xfs",
            FsKind::Ext4 => "ext4",
        }
    }

    /// Measured (raw bytes, usable 1K blocks) pairs
    pub fn reference_points(&self) -> &'static [(u64, u64)] {
        match self {
            FsKind::Xfs => XFS_POINTS,
            FsKind::Ext4 => EXT4_POINTS,
        }
    }

    pub fn calibration(&self) -> Result<Calibration> {
        Calibration::from_points(*self, self.reference_points())
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FsKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xfs" => Ok(FsKind::Xfs),
            "ext4" => Ok(FsKind::Ext4),
            other => Err(Error::Configuration(format!("unsupported filesystem {:?}", other))),
        }
    }
}

// =============================================================================
// Calibration
// =============================================================================

/// Linear model `blocks = base_blocks + (bytes - base_bytes) * num / den`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub kind: FsKind,
    base_bytes: u64,
    base_blocks: u64,
    num: u64,
    den: u64,
}

impl Calibration {
    /// Fit a model to one or two reference points
    pub fn from_points(kind: FsKind, points: &[(u64, u64)]) -> Result<Self> {
        match points {
            [(bytes, blocks)] if *bytes > 0 => Ok(Self {
                kind,
                base_bytes: 0,
                base_blocks: 0,
                num: *blocks,
                den: *bytes,
            }),
            [(b1, k1), (b2, k2)] if b2 > b1 && k2 > k1 => Ok(Self {
                kind,
                base_bytes: *b1,
                base_blocks: *k1,
                num: k2 - k1,
                den: b2 - b1,
            }),
            _ => Err(Error::Configuration(format!(
                "cannot calibrate {} from {:?}",
                kind, points
            ))),
        }
    }

    /// Expected usable 1K blocks for a volume of `bytes`
    pub fn expected_blocks(&self, bytes: u64) -> u64 {
        let delta = bytes as i128 - self.base_bytes as i128;
        let scaled = delta * self.num as i128 / self.den as i128;
        (self.base_blocks as i128 + scaled).max(0) as u64
    }
}

/// Expected usable size of a volume in the unit its probe reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSize {
    /// 1K blocks reported by `df` for a formatted filesystem
    Blocks(u64),
    /// Bytes reported by `blockdev --getsize64` for a raw device
    Bytes(u64),
}

impl ExpectedSize {
    pub fn value(&self) -> u64 {
        match self {
            ExpectedSize::Blocks(v) | ExpectedSize::Bytes(v) => *v,
        }
    }
}

/// Expected size for `bytes` on `fs`, or on a raw block device when `None`
pub fn expected_size(fs: Option<FsKind>, bytes: u64) -> Result<ExpectedSize> {
    match fs {
        Some(kind) => Ok(ExpectedSize::Blocks(kind.calibration()?.expected_blocks(bytes))),
        None => Ok(ExpectedSize::Bytes(bytes)),
    }
}
