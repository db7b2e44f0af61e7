//! Deterministic rendering of the VRRP daemon's configuration.

use crate::types::{Role, RenderInput};
use common::GatewayError;
use std::fmt::Write as _;

const INSTANCE_NAME: &str = "GATEWAY";
const TRACK_SCRIPT_NAME: &str = "chk_gateway";

/// Render a complete `keepalived.conf` for `input`.
///
/// Byte-identical for byte-identical inputs: there is no timestamp, no
/// random ordering, and no reliance on hash-map iteration order anywhere
/// in this function.
pub fn render(input: &RenderInput) -> Result<String, GatewayError> {
    if input.vrid == 0 {
        return Err(GatewayError::RenderFailed("vrid must be in 1..=255".to_string()));
    }
    if input.iface.trim().is_empty() {
        return Err(GatewayError::RenderFailed("iface must not be empty".to_string()));
    }

    let mut out = String::new();

    writeln!(out, "global_defs {{").unwrap();
    writeln!(out, "    enable_script_security").unwrap();
    writeln!(out, "    script_user root root").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    writeln!(out, "vrrp_script {TRACK_SCRIPT_NAME} {{").unwrap();
    writeln!(
        out,
        "    script \"{} check --mode={} -c {}\"",
        input.agent_path, input.health_mode, input.agent_config_path
    )
    .unwrap();
    writeln!(out, "    interval {}", input.interval_sec).unwrap();
    writeln!(out, "    weight {}", input.track_weight()).unwrap();
    writeln!(out, "    fall 3").unwrap();
    writeln!(out, "    rise 2").unwrap();
    writeln!(out, "    init_fail").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    writeln!(out, "vrrp_instance {INSTANCE_NAME} {{").unwrap();
    writeln!(out, "    state BACKUP").unwrap();
    writeln!(out, "    interface {}", input.iface).unwrap();
    writeln!(out, "    virtual_router_id {}", input.vrid).unwrap();
    writeln!(out, "    priority {}", input.effective_priority()).unwrap();
    writeln!(out, "    advert_int {}", input.advert_int).unwrap();
    if input.preempt {
        writeln!(out, "    preempt_delay {}", input.preempt_delay_sec).unwrap();
    } else {
        writeln!(out, "    nopreempt").unwrap();
    }
    writeln!(out, "    unicast_src_ip {}", input.self_ip).unwrap();
    writeln!(out, "    unicast_peer {{").unwrap();
    writeln!(out, "        {}", input.peer_ip).unwrap();
    writeln!(out, "    }}").unwrap();
    writeln!(out, "    virtual_ipaddress {{").unwrap();
    writeln!(out, "        {}/32 dev {}", input.vip, input.iface).unwrap();
    writeln!(out, "    }}").unwrap();
    writeln!(out, "    track_script {{").unwrap();
    writeln!(out, "        {TRACK_SCRIPT_NAME}").unwrap();
    writeln!(out, "    }}").unwrap();
    writeln!(
        out,
        "    notify_master \"{} notify master\"",
        input.agent_path
    )
    .unwrap();
    writeln!(
        out,
        "    notify_backup \"{} notify backup\"",
        input.agent_path
    )
    .unwrap();
    writeln!(out, "    notify_fault \"{} notify fault\"", input.agent_path).unwrap();
    writeln!(out, "}}").unwrap();

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample(role: Role) -> RenderInput {
        RenderInput {
            role,
            iface: "br-lan".to_string(),
            vrid: 51,
            advert_int: 1,
            priority_primary: 100,
            priority_secondary: 150,
            preempt: true,
            preempt_delay_sec: 30,
            self_ip: Ipv4Addr::new(192, 168, 1, 2),
            peer_ip: Ipv4Addr::new(192, 168, 1, 1),
            vip: Ipv4Addr::new(192, 168, 1, 254),
            health_mode: "internet".to_string(),
            interval_sec: 2,
            agent_path: "/usr/sbin/gateway-agent".to_string(),
            agent_config_path: "/etc/gateway-agent/config.yaml".to_string(),
        }
    }

    #[test]
    fn scenario_render_secondary_matches_the_literal_contract() {
        let out = render(&sample(Role::Secondary)).unwrap();
        assert!(out.contains("vrrp_script chk_gateway {"));
        assert!(out.contains("interface br-lan"));
        assert!(out.contains("virtual_router_id 51"));
        assert!(out.contains("priority 150"));
        assert!(out.contains("preempt_delay 30"));
        assert!(out.contains("unicast_src_ip 192.168.1.2"));
        assert!(out.contains("virtual_ipaddress {"));
        assert!(out.contains("192.168.1.254/32 dev br-lan"));

        let script_idx = out.find("vrrp_script").unwrap();
        let instance_idx = out.find("vrrp_instance").unwrap();
        assert!(script_idx < instance_idx, "script block must precede the instance block");
    }

    #[test]
    fn render_is_deterministic() {
        let a = render(&sample(Role::Primary)).unwrap();
        let b = render(&sample(Role::Primary)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn primary_uses_nopreempt_when_preempt_disabled() {
        let mut input = sample(Role::Primary);
        input.preempt = false;
        let out = render(&input).unwrap();
        assert!(out.contains("nopreempt"));
        assert!(!out.contains("preempt_delay"));
    }

    #[test]
    fn zero_vrid_is_rejected() {
        let mut input = sample(Role::Primary);
        input.vrid = 0;
        assert!(render(&input).is_err());
    }

    #[test]
    fn track_weight_drops_secondary_below_an_unhealthy_primary() {
        let secondary = render(&sample(Role::Secondary)).unwrap();
        assert!(secondary.contains("weight -200"));

        let primary = render(&sample(Role::Primary)).unwrap();
        assert!(primary.contains("weight 0"));
    }
}
