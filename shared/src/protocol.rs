use std::collections::BTreeMap;
use crate::types::PortRule;

/// Extension of every service-discovery file
pub const SD_FILE_EXTENSION: &str = "json";

/// Indentation used when writing service-discovery files
pub const SD_JSON_INDENT: &[u8] = b"    ";

/// DNS port used when the nameserver is given without one
pub const DNS_PORT: u16 = 53;

/// Port and job label of the built-in rule
pub const DEFAULT_RULE_PORT: u16 = 9100;
pub const DEFAULT_RULE_JOB: &str = "node";

/// File name for a domain: dots become underscores, e.g.
/// "mgmt.example.net" -> "mgmt_example_net.json"
pub fn sd_file_name(domain: &str) -> String {
    let stem = domain.trim_end_matches('.').replace('.', "_");
    format!("{}.{}", stem, SD_FILE_EXTENSION)
}

/// Rule set used when none is configured: every host, node exporter port.
pub fn default_rules() -> Vec<PortRule> {
    vec![PortRule {
        pattern: ".*".to_string(),
        port: DEFAULT_RULE_PORT,
        labels: BTreeMap::from([("job".to_string(), DEFAULT_RULE_JOB.to_string())]),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sd_file_name() {
        assert_eq!(sd_file_name("mgmt.example.net"), "mgmt_example_net.json");
        assert_eq!(sd_file_name("example.com."), "example_com.json");
    }
}
