//! Glue between the agent's YAML config and the `vrrpconf`/`policy` crates.

use std::net::Ipv4Addr;

use common::GatewayError;
use policy::{resolve_quorum, PolicyConfig};
use vrrpconf::{RenderInput, Role};

use crate::config::{AgentConfigFile, HealthMode};

/// Build the VRRP daemon's render input from a loaded agent config.
pub fn render_input(cfg: &AgentConfigFile, agent_path: &str, agent_config_path: &str) -> Result<RenderInput, GatewayError> {
    let self_ip: Ipv4Addr = cfg
        .routers
        .self_ip
        .parse()
        .map_err(|_| GatewayError::InvalidVip(cfg.routers.self_ip.clone()))?;
    let peer_ip: Ipv4Addr = cfg
        .routers
        .peer_ip
        .parse()
        .map_err(|_| GatewayError::InvalidVip(cfg.routers.peer_ip.clone()))?;
    let vip: Ipv4Addr = cfg
        .lan
        .vip
        .parse()
        .map_err(|_| GatewayError::InvalidVip(cfg.lan.vip.clone()))?;

    Ok(RenderInput {
        role: cfg.role,
        iface: cfg.lan.iface.clone(),
        vrid: cfg.keepalived.vrid,
        advert_int: cfg.keepalived.advert_int,
        priority_primary: cfg.keepalived.priority.primary,
        priority_secondary: cfg.keepalived.priority.secondary,
        preempt: cfg.failover.preempt,
        preempt_delay_sec: cfg.failover.preempt_delay_sec,
        self_ip,
        peer_ip,
        vip,
        health_mode: health_mode_str(cfg.health.mode).to_string(),
        interval_sec: cfg.health.interval_sec,
        agent_path: agent_path.to_string(),
        agent_config_path: agent_config_path.to_string(),
    })
}

pub fn health_mode_str(mode: HealthMode) -> &'static str {
    match mode {
        HealthMode::Basic => "basic",
        HealthMode::Internet => "internet",
    }
}

/// Build a [`PolicyConfig`] for the currently active check set.
pub fn policy_config(cfg: &AgentConfigFile) -> Result<PolicyConfig, GatewayError> {
    let probes = cfg.health.active_checks();
    let quorum = resolve_quorum(&cfg.health.k_of_n, probes.len() as u32)?;
    Ok(PolicyConfig {
        fail_count: cfg.health.fail_count,
        recover_count: cfg.health.recover_count,
        hold_down: cfg.health.hold_down(),
        quorum,
        mode: health_mode_str(cfg.health.mode).to_string(),
    })
}

pub fn role_is_primary(role: Role) -> bool {
    matches!(role, Role::Primary)
}
