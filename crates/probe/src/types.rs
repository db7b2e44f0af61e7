//! Probe specifications and results.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

/// One health probe, tagged by kind.
///
/// Dispatch on a `Probe` is always by `match`, never by a trait object:
/// there are exactly four kinds and they are unlikely to grow without a
/// matching change to the policy engine's aggregation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Probe {
    /// ICMP reachability via the OS `ping` binary.
    Ping {
        target: String,
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// A DNS A-record lookup against an explicit resolver, not the process resolver.
    Dns {
        resolver: String,
        domain: String,
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// A bare TCP connect.
    Tcp {
        target: String,
        port: u16,
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// An HTTP GET, healthy on any 2xx/3xx status.
    Http {
        url: String,
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

impl Probe {
    pub fn timeout(&self) -> Duration {
        match self {
            Probe::Ping { timeout, .. }
            | Probe::Dns { timeout, .. }
            | Probe::Tcp { timeout, .. }
            | Probe::Http { timeout, .. } => *timeout,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Probe::Ping { .. } => "ping",
            Probe::Dns { .. } => "dns",
            Probe::Tcp { .. } => "tcp",
            Probe::Http { .. } => "http",
        }
    }
}

/// Outcome of running one [`Probe`] once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub kind: String,
    pub ok: bool,
    pub latency_ms: u64,
    pub error_kind: Option<String>,
    pub message: Option<String>,
}

impl ProbeOutcome {
    pub fn ok(kind: &str, latency: Duration) -> Self {
        Self {
            kind: kind.to_string(),
            ok: true,
            latency_ms: latency.as_millis() as u64,
            error_kind: None,
            message: None,
        }
    }

    pub fn fail(kind: &str, latency: Duration, error_kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            ok: false,
            latency_ms: latency.as_millis() as u64,
            error_kind: Some(error_kind.to_string()),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_timeout_defaults_to_five_seconds() {
        let yaml = r#"{"kind":"tcp","target":"10.0.0.1","port":80}"#;
        let p: Probe = serde_json::from_str(yaml).unwrap();
        assert_eq!(p.timeout(), Duration::from_secs(5));
        assert_eq!(p.kind(), "tcp");
    }

    #[test]
    fn probe_kind_tag_round_trips() {
        let p = Probe::Http {
            url: "http://10.0.0.1/healthz".to_string(),
            timeout: Duration::from_secs(2),
        };
        let s = serde_json::to_string(&p).unwrap();
        assert!(s.contains("\"kind\":\"http\""));
        let back: Probe = serde_json::from_str(&s).unwrap();
        assert_eq!(back.kind(), "http");
    }
}
