//! Atomic apply/reload of the VRRP daemon config and local state read-back.

use common::GatewayError;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

/// The two service-manager families this agent ever runs on.
///
/// Detected once at process startup by probing for a well-known
/// filesystem marker, then held as an immutable handle — there is no
/// third family and no runtime re-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// OpenWrt-style `/etc/init.d` scripts driven by `procd`.
    ProcdFamily,
    /// `systemctl`-managed unit files.
    SystemdFamily,
}

impl Platform {
    /// Detect the local platform by checking for procd's marker first.
    pub async fn detect() -> Platform {
        if tokio::fs::metadata("/etc/rc.common").await.is_ok() {
            Platform::ProcdFamily
        } else {
            Platform::SystemdFamily
        }
    }

    pub fn find_config_path(&self, daemon: &str) -> String {
        match self {
            Platform::ProcdFamily => format!("/etc/{daemon}/{daemon}.conf"),
            Platform::SystemdFamily => format!("/etc/{daemon}/{daemon}.conf"),
        }
    }

    async fn run(cmd: &str, args: &[&str]) -> Result<bool, GatewayError> {
        let status = Command::new(cmd)
            .args(args)
            .status()
            .await
            .map_err(|e| GatewayError::ReloadFailed(e.to_string()))?;
        Ok(status.success())
    }

    pub async fn reload(&self, daemon: &str) -> Result<(), GatewayError> {
        let sequence: Vec<(String, Vec<String>)> = match self {
            Platform::ProcdFamily => vec![
                (format!("/etc/init.d/{daemon}"), vec!["reload".to_string()]),
                (format!("/etc/init.d/{daemon}"), vec!["restart".to_string()]),
            ],
            Platform::SystemdFamily => vec![
                ("systemctl".to_string(), vec!["reload".to_string(), daemon.to_string()]),
                ("systemctl".to_string(), vec!["restart".to_string(), daemon.to_string()]),
            ],
        };

        for (cmd, args) in sequence {
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            match Self::run(&cmd, &arg_refs).await {
                Ok(true) => {
                    info!(daemon, cmd, "reload/restart succeeded");
                    return Ok(());
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!(daemon, cmd, error = %e, "reload attempt errored");
                    continue;
                }
            }
        }

        Err(GatewayError::ReloadFailed(format!(
            "all reload/restart strategies failed for {daemon}"
        )))
    }

    pub async fn start(&self, daemon: &str) -> Result<(), GatewayError> {
        let ok = match self {
            Platform::ProcdFamily => Self::run(&format!("/etc/init.d/{daemon}"), &["start"]).await?,
            Platform::SystemdFamily => Self::run("systemctl", &["start", daemon]).await?,
        };
        if ok {
            Ok(())
        } else {
            Err(GatewayError::KeepalivedFailedToStart)
        }
    }

    pub async fn stop(&self, daemon: &str) -> Result<(), GatewayError> {
        // Tolerate "not loaded" / "not running": stop is always best-effort.
        let _ = match self {
            Platform::ProcdFamily => Self::run(&format!("/etc/init.d/{daemon}"), &["stop"]).await,
            Platform::SystemdFamily => Self::run("systemctl", &["stop", daemon]).await,
        };
        Ok(())
    }

    pub async fn enable(&self, daemon: &str) -> Result<(), GatewayError> {
        let ok = match self {
            Platform::ProcdFamily => Self::run(&format!("/etc/init.d/{daemon}"), &["enable"]).await?,
            Platform::SystemdFamily => Self::run("systemctl", &["enable", daemon]).await?,
        };
        if ok {
            Ok(())
        } else {
            Err(GatewayError::ReloadFailed(format!("failed to enable {daemon} at boot")))
        }
    }
}

/// Write `content` to `path` atomically: write to a sibling temp file,
/// then rename over the target so a reader never observes a partial
/// write.
pub async fn atomic_write(path: &Path, content: &str) -> Result<(), GatewayError> {
    let tmp_path = path.with_extension("tmp");
    let mut f = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| GatewayError::RenderFailed(e.to_string()))?;
    f.write_all(content.as_bytes())
        .await
        .map_err(|e| GatewayError::RenderFailed(e.to_string()))?;
    f.flush().await.map_err(|e| GatewayError::RenderFailed(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| GatewayError::RenderFailed(e.to_string()))?;
    Ok(())
}

/// Apply a rendered config and reload the daemon, within a fixed deadline.
pub async fn apply(
    platform: &Platform,
    daemon: &str,
    config_path: &Path,
    rendered: &str,
) -> Result<(), GatewayError> {
    atomic_write(config_path, rendered).await?;
    timeout(Duration::from_secs(10), platform.reload(daemon))
        .await
        .map_err(|_| GatewayError::ReloadFailed("reload timed out".to_string()))??;
    Ok(())
}

/// Well-known path the notify handlers write MASTER/BACKUP/FAULT to.
pub const STATE_FILE_PATH: &str = "/var/run/gateway-agent/vrrp_state";

/// Read the notify-produced state file, if any.
pub async fn read_state_file(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

/// Check whether `vip` is currently assigned to `iface` on this host, by
/// parsing `ip -4 addr show dev <iface>`.
pub async fn iface_has_vip(iface: &str, vip: &str) -> bool {
    let output = Command::new("ip")
        .args(["-4", "addr", "show", "dev", iface])
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            text.contains(&format!("{vip}/32")) || text.contains(&format!(" {vip} "))
        }
        _ => false,
    }
}

/// Check whether `daemon` has a running process by exact binary name.
pub async fn daemon_running(daemon: &str) -> bool {
    Command::new("pgrep")
        .args(["-x", daemon])
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("vrrpconf-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("keepalived.conf");

        atomic_write(&path, "vrrp_instance GATEWAY {}\n").await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "vrrp_instance GATEWAY {}\n");

        // No leftover temp file after a successful write.
        assert!(!dir.join("keepalived.tmp").exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[test]
    fn find_config_path_is_stable_per_daemon() {
        assert_eq!(
            Platform::SystemdFamily.find_config_path("keepalived"),
            "/etc/keepalived/keepalived.conf"
        );
    }
}
