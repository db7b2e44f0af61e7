//! Local interface/CIDR detection for `POST /api/detect-net` when called
//! with no body: inspects the controller host itself rather than a remote
//! router, reusing the same parsing used for the remote case.

use common::GatewayError;

pub async fn discover_local() -> Result<(String, String), GatewayError> {
    let addr_out = tokio::process::Command::new("ip")
        .args(["-4", "-o", "addr", "show"])
        .output()
        .await
        .map_err(|e| GatewayError::RemoteExec(e.to_string()))?;
    let addr_text = String::from_utf8_lossy(&addr_out.stdout);
    let ifaces = remote::netdiscover::parse_ip_addr_output(&addr_text);

    let route_out = tokio::process::Command::new("ip")
        .args(["route", "show", "default"])
        .output()
        .await
        .map_err(|e| GatewayError::RemoteExec(e.to_string()))?;
    let route_text = String::from_utf8_lossy(&route_out.stdout);
    let default_iface = route_text
        .split_whitespace()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "dev")
        .map(|w| w[1].to_string());

    let chosen = remote::netdiscover::choose_interface(&ifaces, None, default_iface.as_deref())
        .ok_or_else(|| GatewayError::RemoteExec("DETECT_FAILED: no usable interface".to_string()))?;

    Ok((chosen.name.clone(), format!("{}/{}", chosen.ipv4, chosen.prefix_len)))
}
