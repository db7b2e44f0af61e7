//! Streaming failover drift verification.
//!
//! Deliberately stops the VRRP daemon on the current MASTER and confirms
//! the virtual IP survives onto the BACKUP, emitting one NDJSON-ready
//! [`DriftEvent`] per step over an mpsc channel.

pub mod events;
pub mod verifier;

pub use events::{DriftEvent, DriftStatus};
pub use verifier::{run, RouterState, AGENT_STATE_PATH};
