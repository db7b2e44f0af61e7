//! Drift verification event stream types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    Running,
    Success,
    Error,
}

/// One line of the NDJSON event stream a drift verification run emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    pub step: String,
    pub status: DriftStatus,
    pub message: String,
}

impl DriftEvent {
    pub fn running(step: &str, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            status: DriftStatus::Running,
            message: message.into(),
        }
    }

    pub fn success(step: &str, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            status: DriftStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(step: &str, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            status: DriftStatus::Error,
            message: message.into(),
        }
    }

    /// Render as one NDJSON line, newline included.
    pub fn to_ndjson_line(&self) -> String {
        format!("{}\n", serde_json::to_string(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_line_is_newline_terminated_json() {
        let e = DriftEvent::success("ping_vip", "reachable");
        let line = e.to_ndjson_line();
        assert!(line.ends_with('\n'));
        let parsed: DriftEvent = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed.step, "ping_vip");
        assert_eq!(parsed.status, DriftStatus::Success);
    }
}
