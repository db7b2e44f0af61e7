//! VRRP config render/lifecycle types.
//!
//! Unlike the in-process RFC 5798 protocol engine this crate replaces,
//! nothing here speaks the VRRP wire format: the daemon (`keepalived`)
//! does, and this crate only produces its config and observes its state.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// IP protocol number VRRP runs over; kept for documentation parity with
/// the daemon's own firewall-allow step, never sent on the wire here.
pub const VRRP_PROTOCOL: u8 = 112;

/// Role a router plays in the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Secondary,
}

/// Observed or reported VRRP state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VrrpState {
    Master,
    Backup,
    Fault,
    Unknown,
}

impl std::fmt::Display for VrrpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VrrpState::Master => write!(f, "MASTER"),
            VrrpState::Backup => write!(f, "BACKUP"),
            VrrpState::Fault => write!(f, "FAULT"),
            VrrpState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for VrrpState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "MASTER" => Ok(VrrpState::Master),
            "BACKUP" => Ok(VrrpState::Backup),
            "FAULT" => Ok(VrrpState::Fault),
            _ => Err(()),
        }
    }
}

/// Fixed tie-break constants from the render design.
pub const DEFAULT_PRIORITY_PRIMARY: u8 = 100;
pub const DEFAULT_PRIORITY_SECONDARY: u8 = 150;
pub const SECONDARY_TRACK_WEIGHT: i32 = -200;
pub const PRIMARY_TRACK_WEIGHT: i32 = 0;

/// Everything the renderer needs to produce one `keepalived.conf`.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub role: Role,
    pub iface: String,
    pub vrid: u8,
    pub advert_int: u32,
    pub priority_primary: u8,
    pub priority_secondary: u8,
    pub preempt: bool,
    pub preempt_delay_sec: u32,
    pub self_ip: Ipv4Addr,
    pub peer_ip: Ipv4Addr,
    pub vip: Ipv4Addr,
    pub health_mode: String,
    pub interval_sec: u32,
    /// Absolute path to the agent binary, invoked by the track script and
    /// notify handlers.
    pub agent_path: String,
    /// Absolute path to the agent's own YAML config, passed to `check -c`.
    pub agent_config_path: String,
}

impl RenderInput {
    pub fn effective_priority(&self) -> u8 {
        match self.role {
            Role::Primary => self.priority_primary,
            Role::Secondary => self.priority_secondary,
        }
    }

    pub fn track_weight(&self) -> i32 {
        match self.role {
            Role::Primary => PRIMARY_TRACK_WEIGHT,
            Role::Secondary => SECONDARY_TRACK_WEIGHT,
        }
    }
}
