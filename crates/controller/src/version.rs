//! `/api/version`: compares the running controller against the latest
//! published release, and `/api/upgrade`'s background self-update.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub current_version: String,
    pub latest_version: String,
    pub has_update: bool,
    pub release_url: Option<String>,
    pub release_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestRelease {
    version: String,
    url: String,
    #[serde(default)]
    notes: String,
}

/// Check the first configured release base for a `latest.json` manifest.
/// Any failure (no bases configured, network error, bad JSON) degrades to
/// "no update available" rather than failing the request.
pub async fn check(release_bases: &[String]) -> VersionInfo {
    let Some(base) = release_bases.first() else {
        return no_update();
    };

    let url = format!("{}/latest.json", base.trim_end_matches('/'));
    let latest = fetch_latest(&url).await;

    match latest {
        Some(release) => VersionInfo {
            has_update: release.version != CURRENT_VERSION,
            current_version: CURRENT_VERSION.to_string(),
            latest_version: release.version,
            release_url: Some(release.url),
            release_notes: if release.notes.is_empty() { None } else { Some(release.notes) },
        },
        None => no_update(),
    }
}

async fn fetch_latest(url: &str) -> Option<LatestRelease> {
    let response = reqwest::get(url).await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.json::<LatestRelease>().await.ok()
}

fn no_update() -> VersionInfo {
    VersionInfo {
        current_version: CURRENT_VERSION.to_string(),
        latest_version: CURRENT_VERSION.to_string(),
        has_update: false,
        release_url: None,
        release_notes: None,
    }
}

/// Download the published controller binary and replace the running
/// executable on disk. The new binary takes effect on the next restart;
/// this process does not re-exec itself mid-request.
pub async fn upgrade(release_bases: Vec<String>) {
    let info = check(&release_bases).await;
    if !info.has_update {
        info!("upgrade requested but no newer version is published");
        return;
    }

    let Some(url) = info.release_url else {
        warn!("upgrade requested but the latest release has no download url");
        return;
    };

    let current_exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "could not determine the running binary's path");
            return;
        }
    };

    match reqwest::get(&url).await.and_then(|r| r.error_for_status()) {
        Ok(response) => match response.bytes().await {
            Ok(bytes) => {
                let tmp = current_exe.with_extension("upgrade-tmp");
                if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
                    warn!(error = %e, "failed to write downloaded controller binary");
                    return;
                }
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755)).await;
                }
                if let Err(e) = tokio::fs::rename(&tmp, &current_exe).await {
                    warn!(error = %e, "failed to install upgraded controller binary");
                    return;
                }
                info!(version = %info.latest_version, "controller binary upgraded; restart to apply");
            }
            Err(e) => warn!(error = %e, "failed to read upgrade download body"),
        },
        Err(e) => warn!(error = %e, url, "failed to download upgrade"),
    }
}
