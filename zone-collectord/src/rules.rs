use std::collections::{BTreeMap, BTreeSet};
use regex::Regex;
use shared::types::{PortRule, ServiceRecord};
use crate::error::CollectorError;

/// A rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pattern: Regex,
    port: u16,
    labels: BTreeMap<String, String>,
}

impl CompiledRule {
    /// Unanchored search: the pattern may match anywhere in the name.
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    pub fn target(&self, name: &str) -> String {
        format!("{}:{}", name, self.port)
    }
}

/// The current targets of one rule, in rule order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTargets {
    pub labels: BTreeMap<String, String>,
    pub targets: BTreeSet<String>,
}

/// Ordered, validated rule set.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: &[PortRule]) -> Result<Self, CollectorError> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                if rule.port == 0 {
                    return Err(CollectorError::Config(format!("rule #{}: port must be non-zero", i + 1)));
                }
                let pattern = Regex::new(&rule.pattern).map_err(|e| {
                    CollectorError::Config(format!("rule #{}: invalid pattern {:?}: {}", i + 1, rule.pattern, e))
                })?;
                Ok(CompiledRule {
                    pattern,
                    port: rule.port,
                    labels: rule.labels.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Build every rule's target set from the zone snapshot.
    /// Rules are independent; one name can land in several sets.
    pub fn build_targets(&self, records: &[ServiceRecord]) -> Vec<RuleTargets> {
        self.rules
            .iter()
            .map(|rule| {
                let targets: BTreeSet<String> = records
                    .iter()
                    .filter(|r| rule.matches(&r.name))
                    .map(|r| rule.target(&r.name))
                    .collect();
                tracing::debug!(
                    pattern = %rule.pattern,
                    port = rule.port,
                    count = targets.len(),
                    "Built rule targets"
                );
                RuleTargets {
                    labels: rule.labels.clone(),
                    targets,
                }
            })
            .collect()
    }
}
