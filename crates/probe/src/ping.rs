//! ICMP reachability probe, shelling out to the OS `ping` binary.
//!
//! There is no portable way to send a raw ICMP echo without elevated
//! capabilities in an async-friendly way across the platforms this agent
//! targets, so this probe is deliberately a thin wrapper around whichever
//! `ping` is on PATH, the same way the install orchestrator shells out to
//! the remote host rather than reimplementing each command natively.

use crate::types::ProbeOutcome;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

const CANDIDATE_BINARIES: &[&str] = &["/bin/ping", "/sbin/ping", "/usr/bin/ping", "ping"];

pub async fn run(target: &str, to: Duration) -> ProbeOutcome {
    let start = Instant::now();

    let ping_secs = to.as_secs().max(1);
    let mut last_err = None;
    for bin in CANDIDATE_BINARIES {
        let mut cmd = Command::new(bin);
        cmd.args(["-c", "1", "-W", &ping_secs.to_string(), target])
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                last_err = Some(e.to_string());
                continue;
            }
        };

        return match timeout(to, child.wait_with_output()).await {
            Ok(Ok(out)) => {
                let d = start.elapsed();
                if out.status.success() {
                    let stdout = String::from_utf8_lossy(&out.stdout);
                    let latency = parse_time_ms(&stdout).unwrap_or_else(|| d.as_millis() as u64);
                    debug!(target, latency_ms = latency, "ping probe ok");
                    ProbeOutcome {
                        kind: "ping".to_string(),
                        ok: true,
                        latency_ms: latency,
                        error_kind: None,
                        message: None,
                    }
                } else {
                    warn!(target, "ping probe failed (host unreachable)");
                    ProbeOutcome::fail("ping", d, "PING_FAILED", "destination unreachable")
                }
            }
            Ok(Err(e)) => {
                warn!(target, error = %e, "ping probe failed to run");
                ProbeOutcome::fail("ping", start.elapsed(), "PING_FAILED", e.to_string())
            }
            Err(_) => {
                warn!(target, "ping probe timed out");
                ProbeOutcome::fail("ping", start.elapsed(), "PING_FAILED", "timed out")
            }
        };
    }

    ProbeOutcome::fail(
        "ping",
        start.elapsed(),
        "PING_CMD_NOT_FOUND",
        last_err.unwrap_or_else(|| "no ping binary found on PATH".to_string()),
    )
}

/// Extract the `time=<ms>` field from `ping`'s stdout, if present.
fn parse_time_ms(stdout: &str) -> Option<u64> {
    let idx = stdout.find("time=")?;
    let rest = &stdout[idx + 5..];
    let end = rest.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    rest[..end].parse::<f64>().ok().map(|ms| ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time_field_from_typical_output() {
        let stdout = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.345 ms\n";
        assert_eq!(parse_time_ms(stdout), Some(0));
    }

    #[test]
    fn parses_time_field_with_larger_latency() {
        let stdout = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=12.9 ms\n";
        assert_eq!(parse_time_ms(stdout), Some(12));
    }

    #[test]
    fn missing_time_field_returns_none() {
        assert_eq!(parse_time_ms("Request timeout for icmp_seq 0"), None);
    }
}
