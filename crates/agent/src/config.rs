//! Agent configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use probe::Probe;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};
use vrrpconf::Role;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/gateway-agent/config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found in search paths")]
    FileNotFound,
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthMode {
    Basic,
    Internet,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LanSettings {
    pub iface: String,
    pub cidr: String,
    pub vip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutersSettings {
    pub self_ip: String,
    pub peer_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PrioritySettings {
    #[validate(range(min = 1, max = 254))]
    pub primary: u8,
    #[validate(range(min = 1, max = 254))]
    pub secondary: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct KeepalivedSettings {
    #[validate(range(min = 1, max = 255))]
    pub vrid: u8,
    #[validate(range(min = 1, max = 255))]
    pub advert_int: u32,
    #[validate]
    pub priority: PrioritySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverSettings {
    #[serde(default)]
    pub prefer: Option<String>,
    #[serde(default)]
    pub preempt: bool,
    #[serde(default)]
    pub preempt_delay_sec: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChecksSettings {
    #[serde(default)]
    pub checks: Vec<Probe>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HealthSettings {
    pub mode: HealthMode,
    #[serde(default = "default_interval_sec")]
    pub interval_sec: u32,
    #[validate(range(min = 1))]
    #[serde(default = "default_fail_count")]
    pub fail_count: u32,
    #[validate(range(min = 1))]
    #[serde(default = "default_recover_count")]
    pub recover_count: u32,
    #[serde(default)]
    pub hold_down_sec: u32,
    #[serde(default)]
    pub k_of_n: String,
    #[serde(default)]
    pub basic: ChecksSettings,
    #[serde(default)]
    pub internet: ChecksSettings,
}

impl HealthSettings {
    pub fn active_checks(&self) -> &[Probe] {
        match self.mode {
            HealthMode::Basic => &self.basic.checks,
            HealthMode::Internet => &self.internet.checks,
        }
    }

    pub fn hold_down(&self) -> Duration {
        Duration::from_secs(self.hold_down_sec as u64)
    }
}

fn default_interval_sec() -> u32 {
    2
}

fn default_fail_count() -> u32 {
    3
}

fn default_recover_count() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AgentConfigFile {
    #[validate(range(min = 1, max = 1))]
    pub version: u32,
    pub role: Role,
    #[validate]
    pub lan: LanSettings,
    pub routers: RoutersSettings,
    #[validate]
    pub keepalived: KeepalivedSettings,
    #[serde(default)]
    pub failover: FailoverSettings,
    #[validate]
    pub health: HealthSettings,
}

impl Validate for LanSettings {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();
        if self.cidr.parse::<ipnet::Ipv4Net>().is_err() {
            errors.add("cidr", ValidationError::new("invalid_cidr"));
        }
        if self.vip.parse::<std::net::Ipv4Addr>().is_err() {
            errors.add("vip", ValidationError::new("invalid_vip"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for FailoverSettings {
    fn default() -> Self {
        Self {
            prefer: None,
            preempt: false,
            preempt_delay_sec: 0,
        }
    }
}

impl AgentConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let cfg: AgentConfigFile = serde_yaml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Search a small, fixed list of locations for a config file, falling
    /// back to the CLI-provided path if none of them exist.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        let mut candidates = vec![PathBuf::from(DEFAULT_CONFIG_PATH)];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".config/gateway-agent/config.yaml"));
        }
        candidates.push(PathBuf::from("./config.yaml"));

        candidates
            .into_iter()
            .find(|p| p.exists() && p.is_file())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
version: 1
role: primary
lan:
  iface: eth0
  cidr: 10.0.0.0/24
  vip: 10.0.0.1
routers:
  self_ip: 10.0.0.2
  peer_ip: 10.0.0.3
keepalived:
  vrid: 51
  advert_int: 1
  priority:
    primary: 100
    secondary: 150
failover:
  preempt: false
  preempt_delay_sec: 0
health:
  mode: basic
  interval_sec: 2
  fail_count: 3
  recover_count: 2
  hold_down_sec: 0
  basic:
    checks:
      - kind: tcp
        target: 10.0.0.1
        port: 80
"#
    }

    #[test]
    fn valid_config_parses_and_validates() {
        let cfg: AgentConfigFile = serde_yaml::from_str(sample_yaml()).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.role, Role::Primary);
        assert_eq!(cfg.health.active_checks().len(), 1);
    }

    #[test]
    fn invalid_cidr_fails_validation() {
        let mut cfg: AgentConfigFile = serde_yaml::from_str(sample_yaml()).unwrap();
        cfg.lan.cidr = "not-a-cidr".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn resolve_path_uses_the_explicit_cli_path_when_given() {
        let p = AgentConfigFile::resolve_path(Some("/tmp/custom.yaml"));
        assert_eq!(p, PathBuf::from("/tmp/custom.yaml"));
    }
}
