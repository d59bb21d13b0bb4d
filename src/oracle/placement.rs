//! Placement Oracle
//!
//! Predicts which node the provisioner must choose for a claim, using the
//! provisioner's published policy restated independently: filter out nodes
//! whose free capacity is below the request, then prefer the node with the
//! most free capacity. Remaining capacity is tracked across the sequential
//! placements of one scenario.

use super::capacity::CapacityMap;
use crate::error::{Error, Result};
use crate::quantity::format_bytes;
use std::collections::BTreeSet;
use tracing::debug;

// =============================================================================
// Placement Candidate
// =============================================================================

/// A node that passes the capacity filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementCandidate {
    /// Node name
    pub node: String,
    /// Free capacity in bytes before the placement
    pub free_bytes: u64,
}

// =============================================================================
// Prediction
// =============================================================================

/// Expected outcome of placing a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prediction {
    /// Must land on one of these nodes, all tied for most free capacity
    Node {
        candidates: BTreeSet<String>,
        free_bytes: u64,
    },
    /// No node has room; the consumer must never be scheduled
    Unschedulable,
}

impl Prediction {
    pub fn allows(&self, node: &str) -> bool {
        match self {
            Prediction::Node { candidates, .. } => candidates.contains(node),
            Prediction::Unschedulable => false,
        }
    }
}

// =============================================================================
// Placement Oracle
// =============================================================================

/// Stateful filter-and-rank model of the scheduler extension
#[derive(Debug, Clone)]
pub struct PlacementOracle {
    remaining: CapacityMap,
}

impl PlacementOracle {
    pub fn new(capacity: CapacityMap) -> Self {
        Self {
            remaining: capacity,
        }
    }

    /// Capacity left on each node after the placements recorded so far
    pub fn remaining(&self) -> &CapacityMap {
        &self.remaining
    }

    /// Nodes whose free capacity is at least `size`
    pub fn filter(&self, size: u64) -> Vec<PlacementCandidate> {
        self.remaining
            .iter()
            .filter(|(_, free)| *free >= size)
            .map(|(node, free)| PlacementCandidate {
                node: node.to_string(),
                free_bytes: free,
            })
            .collect()
    }

    /// Order candidates by free capacity, largest first
    pub fn rank(mut candidates: Vec<PlacementCandidate>) -> Vec<PlacementCandidate> {
        candidates.sort_by(|a, b| {
            b.free_bytes
                .cmp(&a.free_bytes)
                .then_with(|| a.node.cmp(&b.node))
        });
        candidates
    }

    /// Predict where a claim of `size` bytes must be placed
    pub fn predict(&self, size: u64) -> Prediction {
        let ranked = Self::rank(self.filter(size));
        let Some(best) = ranked.first() else {
            return Prediction::Unschedulable;
        };

        let free_bytes = best.free_bytes;
        let candidates = ranked
            .iter()
            .take_while(|c| c.free_bytes == free_bytes)
            .map(|c| c.node.clone())
            .collect();

        Prediction::Node {
            candidates,
            free_bytes,
        }
    }

    /// Check an observed placement against the prediction
    pub fn verify(&self, size: u64, observed: &str) -> Result<()> {
        let prediction = self.predict(size);
        debug!("placement of {}: predicted {:?}, observed {}", format_bytes(size), prediction, observed);

        match &prediction {
            Prediction::Unschedulable => Err(Error::assertion(format!(
                "{} was placed on {} but no node has that much free capacity: {:?}",
                format_bytes(size),
                observed,
                self.remaining
            ))),
            Prediction::Node { candidates, .. } if !candidates.contains(observed) => {
                Err(Error::assertion(format!(
                    "{} was placed on {}, expected one of {:?} (remaining {:?})",
                    format_bytes(size),
                    observed,
                    candidates,
                    self.remaining
                )))
            }
            Prediction::Node { .. } => Ok(()),
        }
    }

    /// Subtract a successful placement from the node's remaining capacity
    pub fn record_placement(&mut self, node: &str, size: u64) -> Result<()> {
        let free = self.remaining.get(node).ok_or_else(|| {
            Error::assertion(format!("placement on unknown node {}", node))
        })?;
        let left = free.checked_sub(size).ok_or_else(|| {
            Error::assertion(format!(
                "{} placed on {} which only had {} free",
                format_bytes(size),
                node,
                format_bytes(free)
            ))
        })?;
        self.remaining.set(node, left);
        Ok(())
    }

    /// Verify, then record
    pub fn place(&mut self, size: u64, observed: &str) -> Result<()> {
        self.verify(size, observed)?;
        self.record_placement(observed, size)
    }

    /// Fail unless the model says `size` fits on no node
    pub fn expect_unschedulable(&self, size: u64) -> Result<()> {
        match self.predict(size) {
            Prediction::Unschedulable => Ok(()),
            Prediction::Node { candidates, .. } => Err(Error::assertion(format!(
                "{} still fits on {:?}; an unschedulable outcome would be wrong",
                format_bytes(size),
                candidates
            ))),
        }
    }
}

// =============================================================================
// Immediate Binding
// =============================================================================

/// Checks that each same-size immediate claim removes exactly one node from
/// the set of nodes tied for maximum capacity
#[derive(Debug, Clone, Default)]
pub struct TieSetTracker {
    expected: Option<usize>,
}

impl TieSetTracker {
    /// Expect the first observed tie set to contain `initial` nodes
    pub fn expecting(initial: usize) -> Self {
        Self {
            expected: Some(initial),
        }
    }

    /// Compute the current tie set and check its size against the previous one
    pub fn observe(&mut self, capacity: &CapacityMap) -> Result<BTreeSet<String>> {
        let tied = capacity.max_capacity_nodes();
        if let Some(expected) = self.expected {
            if tied.len() != expected {
                return Err(Error::assertion(format!(
                    "expected {} node(s) tied for max capacity, found {:?}",
                    expected, tied
                )));
            }
        }
        self.expected = Some(tied.len().saturating_sub(1));
        Ok(tied)
    }
}

/// An immediate-binding volume must land on a node tied for max capacity
pub fn verify_immediate(tied: &BTreeSet<String>, observed: &str) -> Result<()> {
    if tied.contains(observed) {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "volume created on {}, not on a max-capacity node {:?}",
            observed, tied
        )))
    }
}
