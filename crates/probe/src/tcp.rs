//! TCP connect probe.

use crate::types::ProbeOutcome;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

pub async fn run(target: &str, port: u16, to: Duration) -> ProbeOutcome {
    let addr = format!("{target}:{port}");
    let start = Instant::now();

    match timeout(to, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => {
            let d = start.elapsed();
            debug!(target = %addr, latency_ms = d.as_millis(), "tcp probe ok");
            ProbeOutcome::ok("tcp", d)
        }
        Ok(Err(e)) => {
            let d = start.elapsed();
            warn!(target = %addr, error = %e, "tcp probe failed");
            ProbeOutcome::fail("tcp", d, "TCP_FAILED", e.to_string())
        }
        Err(_) => {
            let d = start.elapsed();
            warn!(target = %addr, "tcp probe timed out");
            ProbeOutcome::fail("tcp", d, "TCP_FAILED", "timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_refused_is_reported_as_failed() {
        let outcome = run("127.0.0.1", 1, Duration::from_millis(200)).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.error_kind.as_deref(), Some("TCP_FAILED"));
    }
}
