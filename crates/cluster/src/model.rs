//! Data model for the gateway's persisted cluster state.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use common::GatewayError;
use serde::{Deserialize, Serialize};
use vrrpconf::{Role, VrrpState};

/// One of the probes attached to a router, as persisted in
/// configuration and rendered into the agent's own config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeSpec {
    Ping {
        target: String,
    },
    Dns {
        resolver: String,
        domain: String,
    },
    Tcp {
        target: String,
        port: u16,
    },
    Http {
        url: String,
    },
}

/// Coarse reachability/lifecycle state of a router, as last observed by
/// the controller. Distinct from [`VrrpState`], which is the VRRP
/// daemon's own MASTER/BACKUP/FAULT signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Installing,
    Uninstalling,
    Error,
}

/// One timestamped line of an install/uninstall log, surfaced on the
/// router record while an operation is in flight or just completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// A managed router, as persisted under `ClusterConfig::routers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterRecord {
    pub name: String,
    pub host: String,
    pub role: Role,
    #[serde(default)]
    pub iface: Option<String>,
    #[serde(default)]
    pub ssh_user: Option<String>,
    #[serde(default)]
    pub ssh_password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,

    // Runtime fields: observed by `Manager::probe` and the install
    // orchestrator, never set by a config author.
    #[serde(default)]
    pub status: RouterStatus,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub agent_version: Option<String>,
    #[serde(default)]
    pub vrrp_state: Option<VrrpState>,
    #[serde(default)]
    pub healthy: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub install_log: Vec<LogLine>,
    #[serde(default)]
    pub install_step: Option<u32>,
    #[serde(default)]
    pub install_total: Option<u32>,
}

impl RouterRecord {
    /// A router record with no credentials, probes, or runtime state yet
    /// observed. Convenient as a base for `..RouterRecord::bare(...)`
    /// struct-update syntax in config-authoring call sites and tests.
    pub fn bare(name: impl Into<String>, host: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            role,
            iface: None,
            ssh_user: None,
            ssh_password: None,
            ssh_key: None,
            probes: Vec::new(),
            last_seen: None,
            status: RouterStatus::Unknown,
            platform: None,
            agent_version: None,
            vrrp_state: None,
            healthy: None,
            error: None,
            install_log: Vec::new(),
            install_step: None,
            install_total: None,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.ssh_password.is_some() || self.ssh_key.is_some()
    }
}

/// Global, persisted cluster configuration: the VIP, its CIDR, the
/// managed routers, and the VRRP parameters shared by every router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub vip: Ipv4Addr,
    pub cidr: String,
    #[serde(default = "default_vrid")]
    pub vrid: u8,
    #[serde(default = "default_advert_int")]
    pub advert_int_sec: u32,
    #[serde(default)]
    pub preempt: bool,
    #[serde(default)]
    pub preempt_delay_sec: u32,
    #[serde(default = "default_interval_sec")]
    pub interval_sec: u32,
    #[serde(default = "default_fail_count")]
    pub fail_count: u32,
    #[serde(default = "default_recover_count")]
    pub recover_count: u32,
    #[serde(default)]
    pub hold_down_sec: u32,
    #[serde(default)]
    pub quorum: String,
    #[serde(default)]
    pub routers: Vec<RouterRecord>,
}

fn default_vrid() -> u8 {
    51
}

fn default_advert_int() -> u32 {
    1
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

impl ClusterConfig {
    pub fn primary(&self) -> Option<&RouterRecord> {
        self.routers.iter().find(|r| r.role == Role::Primary)
    }

    pub fn secondary(&self) -> Option<&RouterRecord> {
        self.routers.iter().find(|r| r.role == Role::Secondary)
    }

    pub fn router(&self, name: &str) -> Option<&RouterRecord> {
        self.routers.iter().find(|r| r.name == name)
    }

    pub fn peer_of<'a>(&'a self, name: &str) -> Option<&'a RouterRecord> {
        self.routers.iter().find(|r| r.name != name)
    }

    /// Validate the invariants a `ClusterConfig` must hold before it can
    /// be saved or used to drive an install.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let cidr: ipnet::Ipv4Net = self
            .cidr
            .parse()
            .map_err(|_| GatewayError::InvalidCidr(self.cidr.clone()))?;

        if !cidr.contains(&self.vip) {
            return Err(GatewayError::VipNotInCidr {
                vip: self.vip.to_string(),
                cidr: self.cidr.clone(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for r in &self.routers {
            if !seen.insert(&r.name) {
                return Err(GatewayError::DuplicateRouterName(r.name.clone()));
            }
            let host: Ipv4Addr = r
                .host
                .parse()
                .map_err(|_| GatewayError::InvalidVip(r.host.clone()))?;
            if host == self.vip {
                return Err(GatewayError::VipConflictsHost(r.name.clone()));
            }
        }

        if self.primary().is_none() && !self.routers.is_empty() {
            return Err(GatewayError::NoPrimary);
        }
        if self.routers.len() > 1 && self.secondary().is_none() {
            return Err(GatewayError::NoSecondary);
        }

        Ok(())
    }
}

/// Settings read from the controller's own YAML config file at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_state_path")]
    pub state_path: String,
    #[serde(default)]
    pub basic_auth_user: Option<String>,
    #[serde(default)]
    pub basic_auth_password: Option<String>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub release_bases: Vec<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_state_path() -> String {
    "/etc/gatewayd/cluster.yaml".to_string()
}

fn default_cache_dir() -> String {
    "/var/cache/gatewayd".to_string()
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            state_path: default_state_path(),
            basic_auth_user: None,
            basic_auth_password: None,
            allowed_origins: Vec::new(),
            log_json: false,
            release_bases: Vec::new(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// The per-router config an agent reads, derived from `ClusterConfig`
/// plus the router's own record. Never persisted standalone; rendered
/// on demand by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role: Role,
    pub iface: String,
    pub vrid: u8,
    pub advert_int_sec: u32,
    pub preempt: bool,
    pub preempt_delay_sec: u32,
    pub self_ip: Ipv4Addr,
    pub peer_ip: Ipv4Addr,
    pub vip: Ipv4Addr,
    pub probes: Vec<ProbeSpec>,
    pub fail_count: u32,
    pub recover_count: u32,
    #[serde(with = "humantime_serde")]
    pub hold_down: std::time::Duration,
    pub quorum: String,
    pub interval_sec: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_router(name: &str, role: Role, host: &str) -> RouterRecord {
        RouterRecord::bare(name, host, role)
    }

    fn sample_config() -> ClusterConfig {
        ClusterConfig {
            vip: "10.0.0.1".parse().unwrap(),
            cidr: "10.0.0.0/24".to_string(),
            vrid: 51,
            advert_int_sec: 1,
            preempt: false,
            preempt_delay_sec: 0,
            interval_sec: 2,
            fail_count: 3,
            recover_count: 2,
            hold_down_sec: 0,
            quorum: String::new(),
            routers: vec![
                sample_router("r1", Role::Primary, "10.0.0.2"),
                sample_router("r2", Role::Secondary, "10.0.0.3"),
            ],
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn vip_outside_cidr_is_rejected() {
        let mut cfg = sample_config();
        cfg.vip = "192.168.1.1".parse().unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(GatewayError::VipNotInCidr { .. })
        ));
    }

    #[test]
    fn duplicate_router_names_are_rejected() {
        let mut cfg = sample_config();
        cfg.routers.push(sample_router("r1", Role::Secondary, "10.0.0.4"));
        assert!(matches!(
            cfg.validate(),
            Err(GatewayError::DuplicateRouterName(_))
        ));
    }

    #[test]
    fn vip_equal_to_a_router_host_is_rejected() {
        let mut cfg = sample_config();
        cfg.routers[0].host = cfg.vip.to_string();
        assert!(matches!(
            cfg.validate(),
            Err(GatewayError::VipConflictsHost(_))
        ));
    }

    #[test]
    fn single_router_with_no_secondary_is_allowed() {
        let mut cfg = sample_config();
        cfg.routers.truncate(1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn two_routers_without_a_secondary_role_is_rejected() {
        let mut cfg = sample_config();
        cfg.routers[1].role = Role::Primary;
        assert!(matches!(cfg.validate(), Err(GatewayError::NoSecondary)));
    }

    #[test]
    fn peer_of_returns_the_other_router() {
        let cfg = sample_config();
        assert_eq!(cfg.peer_of("r1").unwrap().name, "r2");
        assert_eq!(cfg.peer_of("r2").unwrap().name, "r1");
    }
}
