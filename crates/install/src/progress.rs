//! Bounded install/uninstall progress log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_LINES: usize = 30;

/// One `(step, total, message)` progress event, also appended to the
/// router's install log. The log is capped at [`MAX_LINES`]: long-running
/// installs must not grow the router record without bound. `at` is
/// stamped when the event is pushed, not when it is later read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: u32,
    pub total: u32,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ProgressLog {
    lines: VecDeque<ProgressEvent>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: u32, total: u32, message: impl Into<String>) -> ProgressEvent {
        let event = ProgressEvent {
            step,
            total,
            message: message.into(),
            at: Utc::now(),
        };
        tracing::info!(step, total, message = %event.message, "install progress");
        self.lines.push_back(event.clone());
        while self.lines.len() > MAX_LINES {
            self.lines.pop_front();
        }
        event
    }

    pub fn lines(&self) -> Vec<ProgressEvent> {
        self.lines.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_capped_at_max_lines() {
        let mut log = ProgressLog::new();
        for i in 0..50 {
            log.push(i, 50, format!("step {i}"));
        }
        assert_eq!(log.lines().len(), MAX_LINES);
        assert_eq!(log.lines().first().unwrap().step, 20);
        assert_eq!(log.lines().last().unwrap().step, 49);
    }
}
