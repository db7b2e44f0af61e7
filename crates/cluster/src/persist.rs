//! Loading and saving `ClusterConfig` to a YAML state file, sealing and
//! unsealing router credentials in transit.

use std::path::Path;

use common::GatewayError;
use tracing::{debug, info};

use crate::model::ClusterConfig;
use crate::secret::Sealer;

/// Load `ClusterConfig` from `path`, unsealing any `enc:`-prefixed
/// credential fields. Returns the default-shaped empty config (no
/// routers) if the file does not exist yet.
pub async fn load(path: &Path, sealer: &Sealer) -> Result<ClusterConfig, common::Error> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no cluster state file yet");
            return Err(common::Error::config(format!(
                "cluster state file not found: {}",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let mut cfg: ClusterConfig = serde_yaml::from_str(&text)?;
    for r in &mut cfg.routers {
        if let Some(pw) = &r.ssh_password {
            r.ssh_password = Some(unseal_or_err(sealer, pw)?);
        }
        if let Some(key) = &r.ssh_key {
            r.ssh_key = Some(unseal_or_err(sealer, key)?);
        }
    }
    info!(path = %path.display(), routers = cfg.routers.len(), "loaded cluster state");
    Ok(cfg)
}

fn unseal_or_err(sealer: &Sealer, value: &str) -> Result<String, common::Error> {
    sealer
        .unseal(value)
        .map_err(|e| common::Error::Gateway(e))
}

/// Save `ClusterConfig` to `path` atomically, sealing credential fields
/// before they hit disk.
pub async fn save(path: &Path, cfg: &ClusterConfig, sealer: &Sealer) -> Result<(), common::Error> {
    let mut sealed = cfg.clone();
    for r in &mut sealed.routers {
        if let Some(pw) = &r.ssh_password {
            r.ssh_password = Some(sealer.seal(pw).map_err(common::Error::Gateway)?);
        }
        if let Some(key) = &r.ssh_key {
            r.ssh_key = Some(sealer.seal(key).map_err(common::Error::Gateway)?);
        }
    }

    let text = serde_yaml::to_string(&sealed)?;
    let tmp = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await?;
    info!(path = %path.display(), routers = cfg.routers.len(), "saved cluster state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RouterRecord;
    use vrrpconf::Role;

    fn router(name: &str, role: Role, host: &str, password: Option<&str>) -> RouterRecord {
        RouterRecord {
            ssh_user: Some("root".to_string()),
            ssh_password: password.map(|s| s.to_string()),
            ..RouterRecord::bare(name, host, role)
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_and_reseals_password() {
        let dir = tempfile_dir();
        let path = dir.join("cluster.yaml");
        let sealer = Sealer::with_default_key();

        let cfg = ClusterConfig {
            vip: "10.0.0.1".parse().unwrap(),
            cidr: "10.0.0.0/24".to_string(),
            vrid: 51,
            advert_int_sec: 1,
            preempt: false,
            preempt_delay_sec: 0,
            interval_sec: 2,
            fail_count: 3,
            recover_count: 2,
            hold_down_sec: 0,
            quorum: String::new(),
            routers: vec![
                router("r1", Role::Primary, "10.0.0.2", Some("s3cret")),
                router("r2", Role::Secondary, "10.0.0.3", None),
            ],
        };

        save(&path, &cfg, &sealer).await.unwrap();

        let on_disk = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(on_disk.contains("enc:"));
        assert!(!on_disk.contains("s3cret"));

        let loaded = load(&path, &sealer).await.unwrap();
        assert_eq!(loaded.routers[0].ssh_password.as_deref(), Some("s3cret"));
        assert_eq!(loaded.vip, cfg.vip);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn loading_a_missing_file_is_a_config_error() {
        let sealer = Sealer::with_default_key();
        let err = load(Path::new("/nonexistent/path/cluster.yaml"), &sealer)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("gatewayd-cluster-test-{}", std::process::id()));
        std::fs::create_dir_all(&p).unwrap();
        p
    }
}
