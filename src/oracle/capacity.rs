//! Node Capacity
//!
//! Free capacity per worker node, read from the provisioner's
//! `capacity.topolvm.cybozu.com/<device-class>` annotation.

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::observer::NodeRecord;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Free bytes per eligible node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityMap {
    nodes: BTreeMap<String, u64>,
}

impl CapacityMap {
    /// Read capacities from observed nodes, skipping the control-plane node
    ///
    /// A worker without the annotation, or with a non-integer value, means the
    /// cluster is misconfigured; both are fatal.
    pub fn from_nodes(nodes: &[NodeRecord], config: &HarnessConfig) -> Result<Self> {
        let key = config.capacity_key();
        let mut map = Self::default();

        for node in nodes {
            if node.name == config.control_plane_node {
                continue;
            }

            let raw = node
                .annotations
                .get(&key)
                .ok_or_else(|| Error::MissingCapacity {
                    node: node.name.clone(),
                    key: key.clone(),
                })?;
            let bytes = raw.trim().parse::<u64>().map_err(|_| Error::InvalidCapacity {
                node: node.name.clone(),
                value: raw.clone(),
            })?;

            debug!("{}: {} bytes", node.name, bytes);
            map.nodes.insert(node.name.clone(), bytes);
        }

        Ok(map)
    }

    pub fn insert(&mut self, node: impl Into<String>, bytes: u64) {
        self.nodes.insert(node.into(), bytes);
    }

    pub fn get(&self, node: &str) -> Option<u64> {
        self.nodes.get(node).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.nodes.iter().map(|(n, c)| (n.as_str(), *c))
    }

    /// Largest free capacity of any node
    pub fn max(&self) -> Option<u64> {
        self.nodes.values().copied().max()
    }

    /// Nodes tied for the largest free capacity
    pub fn max_capacity_nodes(&self) -> BTreeSet<String> {
        match self.max() {
            Some(max) => self
                .nodes
                .iter()
                .filter(|(_, c)| **c == max)
                .map(|(n, _)| n.clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    pub(crate) fn set(&mut self, node: &str, bytes: u64) {
        if let Some(c) = self.nodes.get_mut(node) {
            *c = bytes;
        }
    }
}

impl FromIterator<(String, u64)> for CapacityMap {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}
