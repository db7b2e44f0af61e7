//! The health-check policy engine: quorum aggregation, debounce, hold-down.

use crate::types::{PolicyConfig, Quorum, State, Status};
use chrono::{DateTime, Utc};
use probe::{Probe, ProbeOutcome};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct Inner {
    state: State,
    fail_counter: u32,
    recover_counter: u32,
    hold_down_deadline: Option<Instant>,
    state_changed_at: Option<DateTime<Utc>>,
}

/// Aggregates a set of probes into one healthy/unhealthy signal.
///
/// A single mutex covers the counters, the current state, and the
/// hold-down deadline together: they only ever change atomically as a
/// unit, so splitting them into separate locks would just invite a round
/// that sees a torn view of "counters moved but state didn't" or vice
/// versa. Probes themselves run with no lock held.
pub struct PolicyEngine {
    config: PolicyConfig,
    inner: Mutex<Inner>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Unknown,
                fail_counter: 0,
                recover_counter: 0,
                hold_down_deadline: None,
                state_changed_at: None,
            }),
        }
    }

    /// Current aggregate state, without running a new round.
    pub async fn state(&self) -> State {
        self.inner.lock().await.state
    }

    /// Run one round against `probes` and update the state machine.
    pub async fn check(&self, probes: &[Probe]) -> Status {
        let mut outcomes = Vec::with_capacity(probes.len());
        for p in probes {
            outcomes.push(probe::run(p).await);
        }
        self.aggregate(outcomes)
    }

    /// Fold already-executed probe outcomes into the state machine.
    ///
    /// Split out from [`Self::check`] so unit tests can feed synthetic
    /// pass/fail sequences without touching the network.
    pub async fn aggregate(&self, outcomes: Vec<ProbeOutcome>) -> Status {
        let total = outcomes.len() as u32;
        let passed = outcomes.iter().filter(|o| o.ok).count() as u32;
        let required = self.config.quorum.required(total);
        let round_passed = passed >= required;

        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let frozen = guard
            .hold_down_deadline
            .map(|deadline| now < deadline)
            .unwrap_or(false);

        if frozen {
            debug!(state = ?guard.state, "policy engine frozen under hold-down");
        } else {
            match guard.state {
                State::Unknown => {
                    guard.state = if round_passed {
                        State::Healthy
                    } else {
                        State::Unhealthy
                    };
                    guard.state_changed_at = Some(Utc::now());
                    info!(state = ?guard.state, "policy engine initial state determined");
                }
                State::Healthy => {
                    if round_passed {
                        guard.fail_counter = 0;
                    } else {
                        guard.fail_counter += 1;
                        guard.recover_counter = 0;
                        if guard.fail_counter >= self.config.fail_count {
                            guard.state = State::Unhealthy;
                            guard.fail_counter = 0;
                            guard.state_changed_at = Some(Utc::now());
                            warn!("policy engine transitioned to unhealthy");
                        }
                    }
                }
                State::Unhealthy => {
                    if round_passed {
                        guard.recover_counter += 1;
                        if guard.recover_counter >= self.config.recover_count {
                            guard.state = State::Healthy;
                            guard.recover_counter = 0;
                            guard.state_changed_at = Some(Utc::now());
                            if !self.config.hold_down.is_zero() {
                                guard.hold_down_deadline = Some(now + self.config.hold_down);
                            }
                            info!("policy engine transitioned to healthy");
                        }
                    } else {
                        guard.fail_counter = 0;
                    }
                }
            }
        }

        let state = guard.state;
        let state_changed_at = guard.state_changed_at;
        drop(guard);

        let reason = if total == 0 {
            "no probes configured".to_string()
        } else if round_passed {
            format!("{passed}/{total} probes passed (required {required})")
        } else {
            format!("{passed}/{total} probes passed, required {required}")
        };

        Status {
            healthy: state == State::Healthy,
            state,
            mode: self.config.mode.clone(),
            probes: outcomes,
            passed_count: passed,
            total_count: total,
            required_count: required,
            reason,
            last_check: Utc::now(),
            state_changed_at,
        }
    }
}

/// Resolve a `"k/n"`-style quorum string against a known probe count.
pub fn resolve_quorum(spec: &str, probe_count: u32) -> Result<Quorum, common::GatewayError> {
    match Quorum::parse(spec) {
        Some(Quorum::K(k)) if k > probe_count => Err(common::GatewayError::KGtN {
            k,
            n: probe_count,
        }),
        Some(q) => Ok(q),
        None => Err(common::GatewayError::ConfigInvalid(format!(
            "malformed quorum spec: {spec}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(ok: bool) -> ProbeOutcome {
        ProbeOutcome {
            kind: "tcp".to_string(),
            ok,
            latency_ms: 1,
            error_kind: if ok { None } else { Some("TCP_FAILED".to_string()) },
            message: None,
        }
    }

    fn round(n: usize, ok: bool) -> Vec<ProbeOutcome> {
        (0..n).map(|_| outcome(ok)).collect()
    }

    #[tokio::test]
    async fn scenario_quorum_flap_all_of_n() {
        let engine = PolicyEngine::new(PolicyConfig {
            fail_count: 3,
            recover_count: 2,
            hold_down: Duration::ZERO,
            quorum: Quorum::All,
            mode: String::new(),
        });

        for _ in 0..2 {
            let s = engine.aggregate(round(3, true)).await;
            assert_eq!(s.state, State::Healthy);
        }

        for _ in 0..2 {
            let s = engine.aggregate(round(3, false)).await;
            assert_eq!(s.state, State::Healthy, "fewer than fail_count failures must not flip state");
        }

        let s = engine.aggregate(round(3, false)).await;
        assert_eq!(s.state, State::Unhealthy, "the third consecutive failure must trip the state");

        let s = engine.aggregate(round(3, true)).await;
        assert_eq!(s.state, State::Unhealthy, "a single success must not recover early");

        let s = engine.aggregate(round(3, true)).await;
        assert_eq!(s.state, State::Healthy, "the second consecutive success must recover");
    }

    #[tokio::test]
    async fn scenario_k_of_n() {
        let engine = PolicyEngine::new(PolicyConfig {
            fail_count: 1,
            recover_count: 1,
            hold_down: Duration::ZERO,
            quorum: Quorum::K(2),
            mode: String::new(),
        });

        let mut outcomes = round(3, true);
        outcomes[2] = outcome(false);
        let s = engine.aggregate(outcomes).await;
        assert!(s.healthy, "2 of 3 passing meets a 2-of-3 quorum");

        let engine2 = PolicyEngine::new(PolicyConfig {
            fail_count: 1,
            recover_count: 1,
            hold_down: Duration::ZERO,
            quorum: Quorum::K(2),
            mode: String::new(),
        });
        let mut outcomes2 = round(3, false);
        outcomes2[0] = outcome(true);
        let s2 = engine2.aggregate(outcomes2).await;
        assert!(!s2.healthy, "only 1 of 3 passing fails a 2-of-3 quorum");
    }

    #[tokio::test]
    async fn scenario_hold_down_freezes_state() {
        let engine = PolicyEngine::new(PolicyConfig {
            fail_count: 1,
            recover_count: 1,
            hold_down: Duration::from_millis(150),
            quorum: Quorum::All,
            mode: String::new(),
        });

        // Recover into healthy, arming the hold-down.
        let s = engine.aggregate(round(1, false)).await;
        assert_eq!(s.state, State::Unhealthy);
        let s = engine.aggregate(round(1, true)).await;
        assert_eq!(s.state, State::Healthy);

        for _ in 0..5 {
            let s = engine.aggregate(round(1, false)).await;
            assert_eq!(s.state, State::Healthy, "hold-down must suppress flips");
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        let s = engine.aggregate(round(1, false)).await;
        assert_eq!(s.state, State::Unhealthy, "failures after hold-down expiry must count");
    }

    #[test]
    fn quorum_parse_handles_all_and_k_of_n() {
        assert_eq!(Quorum::parse(""), Some(Quorum::All));
        assert_eq!(Quorum::parse("2/3"), Some(Quorum::K(2)));
        assert_eq!(Quorum::parse("4/3"), None);
        assert_eq!(Quorum::parse("garbage"), None);
    }

    #[test]
    fn resolve_quorum_rejects_k_greater_than_probe_count() {
        let err = resolve_quorum("3/3", 2).unwrap_err();
        assert_eq!(err.code(), "K_GT_N");
    }
}
