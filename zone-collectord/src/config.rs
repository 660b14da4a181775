use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use hickory_proto::rr::Name;
use anyhow::{Context, Result};
use shared::protocol::{default_rules, DNS_PORT};
use shared::types::PortRule;
use crate::error::CollectorError;
use crate::rules::RuleSet;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Empty means the built-in rule set
    #[serde(default)]
    pub rules: Vec<PortRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Host or host:port of the authoritative nameserver
    #[serde(default)]
    pub nameserver: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub nameserver: Option<String>,
    pub domains: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub transfer_timeout_secs: Option<u64>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_interval() -> u64 {
    60
}

fn default_transfer_timeout() -> u64 {
    30
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            nameserver: String::new(),
            domains: Vec::new(),
            output_dir: default_output_dir(),
            interval_secs: default_interval(),
            transfer_timeout_secs: default_transfer_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(nameserver) = overrides.nameserver {
            self.collector.nameserver = nameserver;
        }
        if !overrides.domains.is_empty() {
            self.collector.domains = overrides.domains;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.collector.output_dir = output_dir;
        }
        if let Some(interval) = overrides.interval_secs {
            self.collector.interval_secs = interval;
        }
        if let Some(timeout) = overrides.transfer_timeout_secs {
            self.collector.transfer_timeout_secs = timeout;
        }
    }

    /// Configured rules, or the built-in set when none are given
    pub fn port_rules(&self) -> Vec<PortRule> {
        if self.rules.is_empty() {
            default_rules()
        } else {
            self.rules.clone()
        }
    }

    /// Check everything the collector needs before the first cycle.
    /// Creates the output directory if it is missing.
    pub fn validate(&self) -> Result<RuleSet, CollectorError> {
        let c = &self.collector;

        if c.nameserver.trim().is_empty() {
            return Err(CollectorError::Config("a nameserver must be specified".into()));
        }
        self.nameserver_addr()?;

        if c.domains.is_empty() {
            return Err(CollectorError::Config("at least one domain must be specified".into()));
        }
        for (i, domain) in self.domains().iter().enumerate() {
            check_domain(domain)
                .map_err(|reason| CollectorError::Config(format!("domain #{} {:?}: {}", i + 1, domain, reason)))?;
        }
        if c.interval_secs == 0 {
            return Err(CollectorError::Config("interval must be at least one second".into()));
        }
        if c.transfer_timeout_secs == 0 {
            return Err(CollectorError::Config("transfer timeout must be at least one second".into()));
        }

        let rules = RuleSet::compile(&self.port_rules())?;
        check_writable(&c.output_dir)?;
        Ok(rules)
    }

    /// Nameserver as (host, port)
    pub fn nameserver_addr(&self) -> Result<(String, u16), CollectorError> {
        split_host_port(self.collector.nameserver.trim())
    }

    /// Domains without trailing dots
    pub fn domains(&self) -> Vec<String> {
        self.collector
            .domains
            .iter()
            .map(|d| d.trim().trim_end_matches('.').to_string())
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.collector.interval_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.collector.transfer_timeout_secs)
    }
}

/// "10.0.0.10" -> ("10.0.0.10", 53), "ns1:5353" -> ("ns1", 5353),
/// "[fd00::1]:53" -> ("fd00::1", 53). A bare IPv6 address keeps port 53.
fn split_host_port(s: &str) -> Result<(String, u16), CollectorError> {
    let invalid = |reason: &str| CollectorError::Config(format!("invalid nameserver {:?}: {}", s, reason));
    let parse_port = |p: &str| match p.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid("port must be 1-65535")),
        Ok(port) => Ok(port),
    };

    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("missing ']'"))?;
        let port = match tail {
            "" => DNS_PORT,
            _ => parse_port(tail.strip_prefix(':').ok_or_else(|| invalid("expected ':' after ']'"))?)?,
        };
        (host.to_string(), port)
    } else {
        match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => (host.to_string(), parse_port(port)?),
            _ => (s.to_string(), DNS_PORT),
        }
    };

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(invalid("bad host"));
    }
    Ok((host, port))
}

fn check_domain(domain: &str) -> Result<(), String> {
    if domain.is_empty() {
        return Err("empty".into());
    }
    if domain.chars().any(char::is_whitespace) {
        return Err("contains whitespace".into());
    }
    if domain.split('.').any(str::is_empty) {
        return Err("empty label".into());
    }
    Name::from_ascii(format!("{}.", domain)).map_err(|e| e.to_string())?;
    Ok(())
}

fn check_writable(dir: &Path) -> Result<(), CollectorError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CollectorError::Config(format!("cannot create output directory {}: {}", dir.display(), e))
    })?;
    tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        CollectorError::Config(format!("cannot write to output directory {}: {}", dir.display(), e))
    })?;
    Ok(())
}
