//! Reconciliation between the daemon's state file and the interface's
//! observed IP list. The interface is ground truth; the state file is a
//! faster, occasionally-stale shortcut.

use crate::types::VrrpState;

/// Derive the effective VRRP state.
///
/// `state_file` is the raw content of the notify-produced state file, if
/// it could be read. `iface_has_vip` and `daemon_running` are
/// independently observed facts about the host.
pub fn reconcile(
    state_file: Option<&str>,
    iface_has_vip: bool,
    daemon_running: bool,
) -> VrrpState {
    if let Some(content) = state_file {
        let trimmed = content.trim();
        if let Ok(state) = trimmed.parse::<VrrpState>() {
            return state;
        }
    }

    if iface_has_vip {
        VrrpState::Master
    } else if daemon_running {
        VrrpState::Backup
    } else {
        VrrpState::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_file_is_authoritative_when_present_and_well_formed() {
        assert_eq!(reconcile(Some("MASTER\n"), false, true), VrrpState::Master);
        assert_eq!(reconcile(Some("BACKUP"), true, true), VrrpState::Backup);
        assert_eq!(reconcile(Some("FAULT"), false, true), VrrpState::Fault);
    }

    #[test]
    fn falls_through_to_interface_observation_when_state_file_is_absent() {
        assert_eq!(reconcile(None, true, true), VrrpState::Master);
        assert_eq!(reconcile(None, false, true), VrrpState::Backup);
        assert_eq!(reconcile(None, false, false), VrrpState::Unknown);
    }

    #[test]
    fn falls_through_when_state_file_content_is_unknown_or_empty() {
        assert_eq!(reconcile(Some(""), true, true), VrrpState::Master);
        assert_eq!(reconcile(Some("UNKNOWN"), false, false), VrrpState::Unknown);
    }

    #[test]
    fn interface_presence_wins_over_a_stale_running_flag() {
        // VIP present but daemon reported not running: still MASTER, the
        // interface is ground truth regardless of process state.
        assert_eq!(reconcile(None, true, false), VrrpState::Master);
    }
}
