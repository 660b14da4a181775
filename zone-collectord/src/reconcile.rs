//! Merges each rule's current targets into the persisted document.
//!
//! Groups carry no rule identity on disk, so a rule finds "its" groups by
//! target overlap: any group sharing at least one target with the rule's
//! current set is a candidate. If a rule's whole target set is replaced by a
//! disjoint one in a single cycle, the old group is not recognised. A new
//! group is created and the old one is pruned once nothing matches it.

use std::collections::BTreeSet;
use shared::types::{Document, TargetGroup};
use crate::rules::RuleTargets;

/// What a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Targets added to existing groups
    pub added: usize,
    /// Targets removed from existing groups
    pub removed: usize,
    /// Groups appended for rules without a candidate
    pub created: usize,
    /// Groups dropped because none of their targets matched any rule
    pub pruned: usize,
}

#[cfg(test)]
impl ReconcileStats {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Reconcile `doc` in place against the per-rule target sets, in rule order.
///
/// The active-target universe is recomputed from the running document before
/// each rule, so a rule sees the edits made by the rules before it.
pub fn reconcile(doc: &mut Document, rules: &[RuleTargets]) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for rule in rules.iter().filter(|r| !r.targets.is_empty()) {
        let current = &rule.targets;
        let active = doc.active_targets();
        let new: BTreeSet<&String> = current.difference(&active).collect();
        let stale: BTreeSet<&String> = active.difference(current).collect();

        let mut found_candidate = false;
        for group in doc.groups.iter_mut().filter(|g| g.overlaps(current)) {
            found_candidate = true;

            for target in &new {
                if group.targets.insert((*target).clone()) {
                    stats.added += 1;
                }
            }

            let before = group.targets.len();
            group.targets.retain(|t| !stale.contains(t));
            stats.removed += before - group.targets.len();
        }

        if !found_candidate && !new.is_empty() {
            doc.groups.push(TargetGroup::new(current.clone(), rule.labels.clone()));
            stats.created += 1;
        }
    }

    let matched: BTreeSet<String> = rules
        .iter()
        .flat_map(|r| r.targets.iter().cloned())
        .collect();
    let before = doc.groups.len();
    doc.groups.retain(|g| g.overlaps(&matched));
    stats.pruned = before - doc.groups.len();

    stats
}
