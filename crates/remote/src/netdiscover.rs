//! Remote interface and CIDR discovery.

use crate::transport::RemoteTransport;
use common::GatewayError;

const WELL_KNOWN: &[&str] = &["br-lan", "eth0", "ens18", "ens33", "enp0s3", "lan"];
const WAN_EXCLUDES: &[&str] = &["pppoe", "wan", "eth1"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceInfo {
    pub name: String,
    pub ipv4: String,
    pub prefix_len: u8,
}

/// Parse `ip -4 -o addr show` output, one interface/address per line:
/// `2: eth0    inet 192.168.1.2/24 brd 192.168.1.255 scope global eth0`
pub fn parse_ip_addr_output(text: &str) -> Vec<IfaceInfo> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(_idx) = fields.next() else { continue };
        let Some(name) = fields.next() else { continue };
        let rest: Vec<&str> = fields.collect();
        let inet_pos = rest.iter().position(|t| *t == "inet");
        let Some(pos) = inet_pos else { continue };
        let Some(cidr) = rest.get(pos + 1) else { continue };
        let Some((ip, prefix)) = cidr.split_once('/') else { continue };
        let Ok(prefix_len) = prefix.parse::<u8>() else { continue };
        out.push(IfaceInfo {
            name: name.trim_end_matches(':').to_string(),
            ipv4: ip.to_string(),
            prefix_len,
        });
    }
    out
}

fn is_rfc1918(ip: &str) -> bool {
    let octets: Vec<u32> = ip.split('.').filter_map(|p| p.parse().ok()).collect();
    if octets.len() != 4 {
        return false;
    }
    matches!(
        (octets[0], octets[1]),
        (10, _) | (192, 168) | (172, 16..=31)
    )
}

/// Choose the best interface per the priority list: an interface already
/// holding `target_ip`, then an RFC1918 interface, then a well-known
/// name, then the default-route interface unless it looks like a WAN
/// link.
pub fn choose_interface<'a>(
    ifaces: &'a [IfaceInfo],
    target_ip: Option<&str>,
    default_route_iface: Option<&str>,
) -> Option<&'a IfaceInfo> {
    if let Some(target) = target_ip {
        if let Some(found) = ifaces.iter().find(|i| i.ipv4 == target) {
            return Some(found);
        }
    }

    if let Some(found) = ifaces.iter().find(|i| is_rfc1918(&i.ipv4)) {
        return Some(found);
    }

    for name in WELL_KNOWN {
        if let Some(found) = ifaces.iter().find(|i| i.name == *name) {
            return Some(found);
        }
    }

    if let Some(default_name) = default_route_iface {
        let excluded = WAN_EXCLUDES
            .iter()
            .any(|ex| default_name.contains(ex));
        if !excluded {
            if let Some(found) = ifaces.iter().find(|i| i.name == default_name) {
                return Some(found);
            }
        }
    }

    None
}

/// Discover the best interface and its CIDR on a remote host.
pub async fn discover(
    t: &dyn RemoteTransport,
    target_ip: Option<&str>,
) -> Result<(String, String), GatewayError> {
    let addr_out = t.run("ip -4 -o addr show").await?;
    let ifaces = parse_ip_addr_output(&addr_out.stdout);

    let route_out = t.run("ip route show default").await?;
    let default_iface = route_out
        .stdout
        .split_whitespace()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "dev")
        .map(|w| w[1].to_string());

    let chosen = choose_interface(&ifaces, target_ip, default_iface.as_deref())
        .ok_or_else(|| GatewayError::RemoteExec("DETECT_FAILED: no usable interface".to_string()))?;

    Ok((chosen.name.clone(), format!("{}/{}", chosen.ipv4, chosen.prefix_len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_output() -> &'static str {
        "1: lo    inet 127.0.0.1/8 scope host lo\n\
         2: eth0    inet 203.0.113.5/24 brd 203.0.113.255 scope global eth0\n\
         3: br-lan    inet 192.168.1.1/24 brd 192.168.1.255 scope global br-lan\n"
    }

    #[test]
    fn parses_interface_table() {
        let ifaces = parse_ip_addr_output(sample_output());
        assert_eq!(ifaces.len(), 3);
        assert_eq!(ifaces[2].name, "br-lan");
        assert_eq!(ifaces[2].ipv4, "192.168.1.1");
        assert_eq!(ifaces[2].prefix_len, 24);
    }

    #[test]
    fn prefers_the_interface_already_holding_the_target_ip() {
        let ifaces = parse_ip_addr_output(sample_output());
        let chosen = choose_interface(&ifaces, Some("203.0.113.5"), None).unwrap();
        assert_eq!(chosen.name, "eth0");
    }

    #[test]
    fn falls_back_to_rfc1918_when_no_target_matches() {
        let ifaces = parse_ip_addr_output(sample_output());
        let chosen = choose_interface(&ifaces, None, None).unwrap();
        assert_eq!(chosen.name, "br-lan");
    }

    #[test]
    fn default_route_interface_is_excluded_when_it_looks_like_wan() {
        let ifaces = vec![IfaceInfo {
            name: "wan".to_string(),
            ipv4: "203.0.113.9".to_string(),
            prefix_len: 24,
        }];
        assert!(choose_interface(&ifaces, None, Some("wan")).is_none());
    }
}
