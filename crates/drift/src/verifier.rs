//! Failover drift verification: deliberately stop the VRRP daemon on the
//! current MASTER and confirm the VIP survives on the BACKUP.

use std::time::Duration;

use cluster::RouterRecord;
use common::GatewayError;
use probe::Probe;
use remote::RemoteTransport;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use vrrpconf::VrrpState;

use crate::events::DriftEvent;

const VRRP_DAEMON: &str = "keepalived";
pub use vrrpconf::STATE_FILE_PATH as AGENT_STATE_PATH;

/// One router's observed state, as fed into `init`.
pub struct RouterState {
    pub record: RouterRecord,
    pub vrrp_state: VrrpState,
}

/// Run the full drift verification flow, sending one [`DriftEvent`] per
/// step to `events`. Returns `Ok(())` if the overall run concluded
/// (regardless of whether drift itself succeeded) and `Err` only if the
/// verifier could not complete its own bookkeeping (e.g. the channel
/// closed) — callers read `DriftStatus::Error` events for domain failures.
pub async fn run(
    states: &[RouterState],
    vip: &str,
    master_transport: &dyn RemoteTransport,
    backup_transport: &dyn RemoteTransport,
    events: &Sender<DriftEvent>,
) {
    macro_rules! emit {
        ($e:expr) => {
            if events.send($e).await.is_err() {
                return;
            }
        };
    }

    // Step 1: init.
    emit!(DriftEvent::running("init", "checking router roles"));
    let masters: Vec<&RouterState> = states
        .iter()
        .filter(|s| s.vrrp_state == VrrpState::Master)
        .collect();
    let backups: Vec<&RouterState> = states
        .iter()
        .filter(|s| s.vrrp_state == VrrpState::Backup)
        .collect();

    if masters.len() != 1 || backups.len() != 1 {
        emit!(DriftEvent::error(
            "init",
            format!(
                "expected exactly one MASTER and one BACKUP, found {} MASTER(s) and {} BACKUP(s)",
                masters.len(),
                backups.len()
            )
        ));
        return;
    }
    let master = masters[0];
    let backup = backups[0];
    emit!(DriftEvent::success(
        "init",
        format!("master={} backup={}", master.record.name, backup.record.name)
    ));

    // Step 2: ping_vip.
    emit!(DriftEvent::running("ping_vip", format!("pinging {vip}")));
    if !ping_once(vip).await {
        emit!(DriftEvent::error("ping_vip", format!("{vip} is not reachable before drift")));
        return;
    }
    emit!(DriftEvent::success("ping_vip", format!("{vip} is reachable")));

    // Step 3: trigger_drift.
    emit!(DriftEvent::running(
        "trigger_drift",
        format!("stopping {VRRP_DAEMON} on {}", master.record.name)
    ));
    if let Err(e) = master_transport.run(&format!("service {VRRP_DAEMON} stop || systemctl stop {VRRP_DAEMON}")).await {
        emit!(DriftEvent::error("trigger_drift", e.to_string()));
        return;
    }
    emit!(DriftEvent::success(
        "trigger_drift",
        format!("stopped {VRRP_DAEMON} on {}", master.record.name)
    ));

    // Step 4: verify_drift.
    emit!(DriftEvent::running("verify_drift", format!("polling {vip} for up to 10s")));
    let mut recovered = false;
    for _ in 0..10 {
        if ping_once(vip).await {
            recovered = true;
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }

    if recovered {
        emit!(DriftEvent::success("verify_drift", format!("{vip} remained reachable through failover")));
    } else {
        emit!(DriftEvent::error("verify_drift", format!("{vip} became unreachable")));

        // Step 5: diagnose.
        emit!(DriftEvent::running("diagnose", "inspecting backup"));
        let diagnosis = diagnose_backup(backup_transport, &backup.record, vip).await;
        emit!(DriftEvent::error("diagnose", diagnosis));
    }

    // Step 6: restore.
    emit!(DriftEvent::running(
        "restore",
        format!("restarting {VRRP_DAEMON} on {}", master.record.name)
    ));
    let restore_result = master_transport
        .run(&format!("service {VRRP_DAEMON} start || systemctl start {VRRP_DAEMON}"))
        .await;
    match restore_result {
        Ok(out) if out.success() => {
            emit!(DriftEvent::success("restore", format!("{VRRP_DAEMON} restarted on {}", master.record.name)))
        }
        Ok(out) => emit!(DriftEvent::error("restore", out.stderr)),
        Err(e) => emit!(DriftEvent::error("restore", e.to_string())),
    }

    // Step 7: finish.
    if recovered {
        emit!(DriftEvent::success("finish", "drift verification passed: failover preserved the VIP"));
    } else {
        emit!(DriftEvent::error("finish", "drift verification failed: the VIP did not survive failover"));
    }
}

async fn ping_once(vip: &str) -> bool {
    let probe = Probe::Ping {
        target: vip.to_string(),
        timeout: Duration::from_secs(2),
    };
    probe::run(&probe).await.ok
}

async fn diagnose_backup(transport: &dyn RemoteTransport, backup: &RouterRecord, vip: &str) -> String {
    let Some(iface) = &backup.iface else {
        return "backup has no configured interface to inspect".to_string();
    };

    let has_vip = remote_iface_has_vip(transport, iface, vip).await;
    let state = remote_read_state_file(transport, AGENT_STATE_PATH)
        .await
        .unwrap_or_default();

    if has_vip {
        format!(
            "backup {} took over the VIP on {iface} (state file reports '{}') but it was unreachable from the controller",
            backup.name,
            state.trim()
        )
    } else {
        format!(
            "backup {} did not take over the VIP on {iface} (state file reports '{}')",
            backup.name,
            state.trim()
        )
    }
}

async fn remote_iface_has_vip(transport: &dyn RemoteTransport, iface: &str, vip: &str) -> bool {
    match transport.run(&format!("ip -4 addr show dev {iface}")).await {
        Ok(out) if out.success() => {
            out.stdout.contains(&format!("{vip}/32")) || out.stdout.contains(&format!(" {vip} "))
        }
        _ => false,
    }
}

async fn remote_read_state_file(transport: &dyn RemoteTransport, path: &str) -> Result<String, GatewayError> {
    let out = transport.run(&format!("cat {path} 2>/dev/null")).await?;
    Ok(out.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remote::CommandOutput;
    use std::sync::Mutex;
    use vrrpconf::Role;

    struct FakeTransport {
        responses: Mutex<Vec<(String, CommandOutput)>>,
    }

    #[async_trait]
    impl RemoteTransport for FakeTransport {
        async fn run(&self, cmd: &str) -> Result<CommandOutput, GatewayError> {
            let mut guard = self.responses.lock().unwrap();
            if let Some(pos) = guard.iter().position(|(c, _)| cmd.contains(c.as_str())) {
                return Ok(guard.remove(pos).1);
            }
            Ok(CommandOutput::default())
        }
        async fn run_timeout(&self, cmd: &str, _secs: u64) -> Result<CommandOutput, GatewayError> {
            self.run(cmd).await
        }
        async fn write_file(&self, _path: &str, _data: &[u8], _mode: u32) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn remove_file(&self, _path: &str) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn mkdir_all(&self, _path: &str, _mode: u32) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn exists(&self, _path: &str) -> Result<bool, GatewayError> {
            Ok(false)
        }
    }

    fn router(name: &str, role: Role) -> RouterRecord {
        RouterRecord {
            iface: Some("eth0".to_string()),
            ..RouterRecord::bare(name, "10.0.0.2", role)
        }
    }

    #[tokio::test]
    async fn init_step_errors_when_there_is_no_single_master() {
        let states = vec![
            RouterState {
                record: router("r1", Role::Primary),
                vrrp_state: VrrpState::Backup,
            },
            RouterState {
                record: router("r2", Role::Secondary),
                vrrp_state: VrrpState::Backup,
            },
        ];

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let master = FakeTransport {
            responses: Mutex::new(Vec::new()),
        };
        let backup = FakeTransport {
            responses: Mutex::new(Vec::new()),
        };

        run(&states, "10.0.0.1", &master, &backup, &tx).await;
        drop(tx);

        let mut saw_error = false;
        while let Some(event) = rx.recv().await {
            if event.step == "init" && matches!(event.status, crate::events::DriftStatus::Error) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
