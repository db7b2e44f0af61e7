//! Health probe primitives for the gateway agent.
//!
//! Four probe kinds, one async function each, dispatched by `match` on a
//! tagged [`types::Probe`] enum rather than through a trait object — the
//! set is closed and the policy engine needs to reason about which kind
//! produced a given outcome.
//!
//! # Example
//!
//! ```no_run
//! use probe::types::Probe;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let p = Probe::Tcp {
//!     target: "192.168.1.1".to_string(),
//!     port: 80,
//!     timeout: Duration::from_secs(2),
//! };
//! let outcome = probe::run(&p).await;
//! let _ = outcome.ok;
//! # }
//! ```

pub mod dns;
pub mod http;
pub mod ping;
pub mod tcp;
pub mod types;

pub use types::{Probe, ProbeOutcome};

/// Execute one probe to completion.
pub async fn run(p: &Probe) -> ProbeOutcome {
    match p {
        Probe::Ping { target, timeout } => ping::run(target, *timeout).await,
        Probe::Dns {
            resolver,
            domain,
            timeout,
        } => dns::run(resolver, domain, *timeout).await,
        Probe::Tcp {
            target,
            port,
            timeout,
        } => tcp::run(target, *port, *timeout).await,
        Probe::Http { url, timeout } => http::run(url, *timeout).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn dispatch_reaches_the_matching_probe_kind() {
        let p = Probe::Tcp {
            target: "127.0.0.1".to_string(),
            port: 1,
            timeout: Duration::from_millis(200),
        };
        let outcome = run(&p).await;
        assert_eq!(outcome.kind, "tcp");
    }
}
