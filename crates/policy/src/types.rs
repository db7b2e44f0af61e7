//! Types for the health-check policy engine.

use chrono::{DateTime, Utc};
use probe::ProbeOutcome;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quorum rule applied to one round of probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quorum {
    /// Every probe in the set must pass.
    All,
    /// At least `k` of the configured probes must pass.
    K(u32),
}

impl Quorum {
    /// Parse a `"k/n"` string, or treat an empty string as [`Quorum::All`].
    ///
    /// `n` is informational here; the caller's probe list is the real `n`.
    /// A malformed string or `k > n` is rejected with [`common::GatewayError::KGtN`]
    /// style input validation, left to the caller since this type has no
    /// access to the probe count at parse time.
    pub fn parse(s: &str) -> Option<Quorum> {
        let s = s.trim();
        if s.is_empty() {
            return Some(Quorum::All);
        }
        let (k, n) = s.split_once('/')?;
        let k: u32 = k.trim().parse().ok()?;
        let n: u32 = n.trim().parse().ok()?;
        if k == 0 || k > n {
            return None;
        }
        Some(Quorum::K(k))
    }

    pub fn required(&self, total: u32) -> u32 {
        match self {
            Quorum::All => total,
            Quorum::K(k) => *k,
        }
    }
}

/// Debounce tuning for the policy engine's state machine.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub fail_count: u32,
    pub recover_count: u32,
    #[allow(dead_code)]
    pub hold_down: Duration,
    pub quorum: Quorum,
    /// The active health-check mode (`"basic"`/`"internet"`), echoed back
    /// on every [`Status`] so a caller reading `status --json` can tell
    /// which check set produced it.
    pub mode: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fail_count: 3,
            recover_count: 2,
            hold_down: Duration::from_secs(0),
            quorum: Quorum::All,
            mode: String::new(),
        }
    }
}

/// Aggregate health state, mirroring the distinction between "we don't
/// know yet" (before the first round) and a confirmed healthy/unhealthy
/// signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Unknown,
    Healthy,
    Unhealthy,
}

/// The result of one round of checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub healthy: bool,
    pub state: State,
    /// The health-check mode active for this round, copied from
    /// [`PolicyConfig::mode`].
    pub mode: String,
    pub probes: Vec<ProbeOutcome>,
    pub passed_count: u32,
    pub total_count: u32,
    pub required_count: u32,
    pub reason: String,
    /// Wall-clock time this round was evaluated.
    pub last_check: DateTime<Utc>,
    /// Wall-clock time `state` last changed, `None` until the first round.
    pub state_changed_at: Option<DateTime<Utc>>,
}
