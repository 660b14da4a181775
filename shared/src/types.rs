use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

/// An address-bearing name discovered in a zone transfer.
/// Produced fresh on every poll, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Fully-qualified name, e.g. "kafka01.mgmt.example.net"
    pub name: String,

    /// IPv4 address from the A record
    pub address: String,
}

/// Pairs a name pattern with the port and labels its targets are scraped with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRule {
    /// Regular expression, searched anywhere in the service name (not anchored)
    pub pattern: String,

    /// Port appended to every matching name
    pub port: u16,

    /// Labels attached to a group created for this rule
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// One entry of a file-based service-discovery document.
///
/// Fields are declared in key order and both collections are ordered,
/// so serializing a group is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetGroup {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// "host:port" strings
    pub targets: BTreeSet<String>,
}

impl TargetGroup {
    pub fn new(targets: BTreeSet<String>, labels: BTreeMap<String, String>) -> Self {
        Self { labels, targets }
    }

    /// True if the group shares at least one target with `other`.
    pub fn overlaps(&self, other: &BTreeSet<String>) -> bool {
        // iterate the smaller side
        if self.targets.len() <= other.len() {
            self.targets.iter().any(|t| other.contains(t))
        } else {
            other.iter().any(|t| self.targets.contains(t))
        }
    }
}

/// The full content of one service-discovery file: a JSON array of groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub groups: Vec<TargetGroup>,
}

impl Document {
    pub fn new(groups: Vec<TargetGroup>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Union of the targets of every group.
    pub fn active_targets(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .flat_map(|g| g.targets.iter().cloned())
            .collect()
    }

    /// Sort groups into their canonical order.
    pub fn normalize(&mut self) {
        self.groups.sort();
    }
}
