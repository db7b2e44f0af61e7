//! Remote platform classification, architecture normalization.

use crate::transport::RemoteTransport;
use common::GatewayError;

/// The two service-manager families a remote host can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePlatform {
    ProcdFamily,
    SystemdFamily,
    Unknown,
}

impl RemotePlatform {
    pub async fn detect(t: &dyn RemoteTransport) -> Result<RemotePlatform, GatewayError> {
        if t.exists("/etc/openwrt_release").await? {
            return Ok(RemotePlatform::ProcdFamily);
        }
        let uname = t.run("uname -s").await?;
        if uname.stdout.trim() == "Linux" {
            return Ok(RemotePlatform::SystemdFamily);
        }
        Ok(RemotePlatform::Unknown)
    }

    pub fn find_config_path(&self, daemon: &str) -> String {
        format!("/etc/{daemon}/{daemon}.conf")
    }

    pub async fn reload(&self, t: &dyn RemoteTransport, daemon: &str) -> Result<(), GatewayError> {
        let attempts: &[&str] = match self {
            RemotePlatform::ProcdFamily => &["reload", "restart"],
            _ => &["reload", "restart"],
        };
        for action in attempts {
            let cmd = match self {
                RemotePlatform::ProcdFamily => format!("/etc/init.d/{daemon} {action}"),
                _ => format!("systemctl {action} {daemon}"),
            };
            if t.run(&cmd).await?.success() {
                return Ok(());
            }
        }
        Err(GatewayError::ReloadFailed(format!(
            "all reload strategies failed for {daemon}"
        )))
    }

    pub async fn start(&self, t: &dyn RemoteTransport, service: &str) -> Result<(), GatewayError> {
        let cmd = match self {
            RemotePlatform::ProcdFamily => format!("/etc/init.d/{service} start"),
            _ => format!("systemctl start {service}"),
        };
        if t.run(&cmd).await?.success() {
            Ok(())
        } else {
            Err(GatewayError::RemoteExec(format!("failed to start {service}")))
        }
    }

    pub async fn stop(&self, t: &dyn RemoteTransport, service: &str) -> Result<(), GatewayError> {
        let cmd = match self {
            RemotePlatform::ProcdFamily => format!("/etc/init.d/{service} stop"),
            _ => format!("systemctl stop {service}"),
        };
        // Best-effort: "not loaded" is not a failure.
        let _ = t.run(&cmd).await;
        Ok(())
    }

    pub async fn enable(&self, t: &dyn RemoteTransport, service: &str) -> Result<(), GatewayError> {
        let cmd = match self {
            RemotePlatform::ProcdFamily => format!("/etc/init.d/{service} enable"),
            _ => format!("systemctl enable {service}"),
        };
        if t.run(&cmd).await?.success() {
            Ok(())
        } else {
            Err(GatewayError::RemoteExec(format!("failed to enable {service} at boot")))
        }
    }
}

/// Normalize a `uname -m` output to the canonical architecture set.
pub fn normalize_arch(raw: &str) -> String {
    match raw.trim() {
        "x86_64" | "amd64" => "amd64",
        "aarch64" | "arm64" => "arm64",
        "armv5l" | "armv6l" | "armv7l" | "armv8l" => "arm",
        "i386" | "i686" => "386",
        "mips" => "mips",
        "mipsel" => "mipsle",
        "mips64" => "mips64",
        "mips64el" => "mips64le",
        "riscv64" => "riscv64",
        "loongarch64" => "loong64",
        "ppc64" => "ppc64",
        "ppc64le" => "ppc64le",
        "s390x" => "s390x",
        other => return other.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_uname_outputs() {
        assert_eq!(normalize_arch("x86_64\n"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("armv7l"), "arm");
        assert_eq!(normalize_arch("mipsel"), "mipsle");
        assert_eq!(normalize_arch("loongarch64"), "loong64");
    }

    #[test]
    fn unknown_architectures_pass_through_verbatim() {
        assert_eq!(normalize_arch("sparc64"), "sparc64");
    }
}
