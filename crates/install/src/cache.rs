//! Local binary cache with single-flight downloads.
//!
//! Concurrent installs that need the same `name-os-arch-version` key must
//! not race each other's download: the first caller downloads, the rest
//! wait on the same lock and then find the cache entry already present.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::GatewayError;
use dashmap::DashMap;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(180);

pub struct BinaryCache {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BinaryCache {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            locks: DashMap::new(),
        }
    }

    pub fn cached_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ensure `key` is present in the cache, downloading from the first
    /// candidate URL that returns HTTP 200 with a non-empty body.
    /// Candidates are tried in order; the first success wins.
    pub async fn ensure(&self, key: &str, candidate_urls: &[String]) -> Result<PathBuf, GatewayError> {
        let cached = self.cached_path(key);
        if tokio::fs::metadata(&cached).await.is_ok() {
            return Ok(cached);
        }

        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        if tokio::fs::metadata(&cached).await.is_ok() {
            return Ok(cached);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?;

        for url in candidate_urls {
            match self.try_download(url).await {
                Ok(tmp) => {
                    tokio::fs::rename(&tmp, &cached)
                        .await
                        .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?;
                    set_executable(&cached).await?;
                    return Ok(cached);
                }
                Err(e) => {
                    warn!(url, error = %e, "download candidate failed");
                    continue;
                }
            }
        }

        Err(GatewayError::DownloadFailed(format!(
            "all {} candidate URLs failed for {key}",
            candidate_urls.len()
        )))
    }

    async fn try_download(&self, url: &str) -> Result<PathBuf, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?;

        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::DownloadFailed(format!(
                "{url}: HTTP {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?;

        if bytes.is_empty() {
            return Err(GatewayError::DownloadFailed(format!("{url}: empty body")));
        }

        let suffix: u64 = rand::thread_rng().gen();
        let tmp = self.dir.join(format!(".tmp-{suffix:x}"));
        let mut f = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?;
        f.write_all(&bytes)
            .await
            .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?;
        Ok(tmp)
    }
}

#[cfg(unix)]
async fn set_executable(path: &std::path::Path) -> Result<(), GatewayError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path)
        .await
        .map_err(|e| GatewayError::DownloadFailed(e.to_string()))?
        .permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(path, perms)
        .await
        .map_err(|e| GatewayError::DownloadFailed(e.to_string()))
}

#[cfg(not(unix))]
async fn set_executable(_path: &std::path::Path) -> Result<(), GatewayError> {
    Ok(())
}

/// Build the ordered candidate URL list: versioned base first, then
/// "latest", each expanded through the configured proxy (if any), the
/// built-in proxy list, then the direct URL.
pub fn candidate_urls(
    bases: &[String],
    version: &str,
    filename: &str,
    user_proxy: Option<&str>,
    builtin_proxies: &[String],
) -> Vec<String> {
    let mut out = Vec::new();
    let tagged: Vec<String> = bases
        .iter()
        .map(|b| format!("{}/v{version}/{filename}", b.trim_end_matches('/')))
        .collect();
    let latest: Vec<String> = bases
        .iter()
        .map(|b| format!("{}/latest/{filename}", b.trim_end_matches('/')))
        .collect();

    for direct in tagged.iter().chain(latest.iter()) {
        if let Some(proxy) = user_proxy {
            out.push(format!("{}{}", proxy.trim_end_matches('/'), direct));
        }
        for proxy in builtin_proxies {
            out.push(format!("{}{}", proxy.trim_end_matches('/'), direct));
        }
        out.push(direct.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_urls_orders_versioned_before_latest_and_proxies_before_direct() {
        let urls = candidate_urls(
            &["https://example.test/releases".to_string()],
            "1.2.3",
            "agent-amd64",
            Some("https://proxy.example/"),
            &["https://mirror.example/".to_string()],
        );
        assert_eq!(
            urls,
            vec![
                "https://proxy.example/https://example.test/releases/v1.2.3/agent-amd64",
                "https://mirror.example/https://example.test/releases/v1.2.3/agent-amd64",
                "https://example.test/releases/v1.2.3/agent-amd64",
                "https://proxy.example/https://example.test/releases/latest/agent-amd64",
                "https://mirror.example/https://example.test/releases/latest/agent-amd64",
                "https://example.test/releases/latest/agent-amd64",
            ]
        );
    }

    #[tokio::test]
    async fn ensure_returns_cached_path_without_redownloading_when_present() {
        let dir = std::env::temp_dir().join(format!("gatewayd-cache-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let cache = BinaryCache::new(dir.clone());
        let key = "agent-amd64-1.0.0";
        tokio::fs::write(cache.cached_path(key), b"binary").await.unwrap();

        let path = cache.ensure(key, &[]).await.unwrap();
        assert_eq!(path, cache.cached_path(key));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
