//! DNS resolution probe against an explicit resolver.

use crate::types::ProbeOutcome;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

pub async fn run(resolver_addr: &str, domain: &str, to: Duration) -> ProbeOutcome {
    let start = Instant::now();

    let ip: IpAddr = match IpAddr::from_str(resolver_addr) {
        Ok(ip) => ip,
        Err(e) => {
            return ProbeOutcome::fail("dns", start.elapsed(), "DNS_FAILED", e.to_string());
        }
    };
    let socket = SocketAddr::new(ip, 53);

    let mut cfg = ResolverConfig::new();
    cfg.add_name_server(NameServerConfig {
        socket_addr: socket,
        protocol: Protocol::Udp,
        tls_dns_name: None,
        trust_negative_responses: true,
        bind_addr: None,
    });

    let resolver = TokioAsyncResolver::tokio(cfg, ResolverOpts::default());

    match timeout(to, resolver.lookup_ip(domain)).await {
        Ok(Ok(lookup)) => {
            let d = start.elapsed();
            if lookup.iter().next().is_some() {
                debug!(resolver = resolver_addr, domain, latency_ms = d.as_millis(), "dns probe ok");
                ProbeOutcome::ok("dns", d)
            } else {
                warn!(resolver = resolver_addr, domain, "dns probe returned no results");
                ProbeOutcome::fail("dns", d, "DNS_NO_RESULT", "no addresses returned")
            }
        }
        Ok(Err(e)) => {
            let d = start.elapsed();
            warn!(resolver = resolver_addr, domain, error = %e, "dns probe failed");
            ProbeOutcome::fail("dns", d, "DNS_FAILED", e.to_string())
        }
        Err(_) => {
            let d = start.elapsed();
            warn!(resolver = resolver_addr, domain, "dns probe timed out");
            ProbeOutcome::fail("dns", d, "DNS_FAILED", "timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_resolver_address_fails_fast() {
        let outcome = run("not-an-ip", "example.com", Duration::from_millis(200)).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.error_kind.as_deref(), Some("DNS_FAILED"));
    }
}
