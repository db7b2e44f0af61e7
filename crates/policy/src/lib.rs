//! Health-check policy engine: aggregates a probe set under a quorum rule
//! and debounces the result with fail/recover counters and a hold-down
//! window before it reaches the VRRP layer.
//!
//! # Example
//!
//! ```no_run
//! use policy::engine::PolicyEngine;
//! use policy::types::{PolicyConfig, Quorum};
//! use probe::Probe;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let engine = PolicyEngine::new(PolicyConfig {
//!     fail_count: 3,
//!     recover_count: 2,
//!     hold_down: Duration::from_secs(10),
//!     quorum: Quorum::All,
//! });
//!
//! let probes = vec![Probe::Tcp {
//!     target: "192.168.1.1".to_string(),
//!     port: 80,
//!     timeout: Duration::from_secs(2),
//! }];
//!
//! let status = engine.check(&probes).await;
//! let _ = status.healthy;
//! # }
//! ```

pub mod engine;
pub mod types;

pub use engine::{resolve_quorum, PolicyEngine};
pub use types::{PolicyConfig, Quorum, State, Status};
