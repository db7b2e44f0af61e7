//! HTTP GET probe.

use crate::types::ProbeOutcome;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub async fn run(url: &str, to: Duration) -> ProbeOutcome {
    let start = Instant::now();

    let client = match reqwest::Client::builder()
        .timeout(to)
        .redirect(reqwest::redirect::Policy::limited(3))
        .build()
    {
        Ok(c) => c,
        Err(e) => return ProbeOutcome::fail("http", start.elapsed(), "HTTP_FAILED", e.to_string()),
    };

    match client.get(url).send().await {
        Ok(resp) => {
            let d = start.elapsed();
            let status = resp.status();
            if status.as_u16() < 400 {
                debug!(url, status = status.as_u16(), latency_ms = d.as_millis(), "http probe ok");
                ProbeOutcome::ok("http", d)
            } else {
                warn!(url, status = status.as_u16(), "http probe unexpected status");
                ProbeOutcome::fail(
                    "http",
                    d,
                    &format!("HTTP_{}", status.as_u16()),
                    format!("unexpected status {}", status.as_u16()),
                )
            }
        }
        Err(e) => {
            let d = start.elapsed();
            warn!(url, error = %e, "http probe failed");
            ProbeOutcome::fail("http", d, "HTTP_FAILED", e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_reported_as_failed() {
        let outcome = run("http://127.0.0.1:1/healthz", Duration::from_millis(300)).await;
        assert!(!outcome.ok);
        assert!(outcome.error_kind.is_some());
    }
}
