//! Controller configuration loading.

use std::path::PathBuf;

use cluster::ControllerSettings;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/gatewayd/controller.yaml";

/// Load [`ControllerSettings`] from `cli_path`, or the first of a small
/// fixed search list, falling back to defaults if none exist.
pub fn load(cli_path: Option<&str>) -> ControllerSettings {
    let path = resolve_path(cli_path);
    match std::fs::read_to_string(&path) {
        Ok(text) => match serde_yaml::from_str(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse controller config, using defaults");
                ControllerSettings::default()
            }
        },
        Err(_) => {
            tracing::info!(path = %path.display(), "no controller config found, using defaults");
            ControllerSettings::default()
        }
    }
}

fn resolve_path(cli_path: Option<&str>) -> PathBuf {
    if let Some(p) = cli_path {
        return PathBuf::from(p);
    }
    let mut candidates = vec![PathBuf::from(DEFAULT_CONFIG_PATH)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".config/gatewayd/controller.yaml"));
    }
    candidates.push(PathBuf::from("./controller.yaml"));

    candidates
        .into_iter()
        .find(|p: &PathBuf| p.exists() && p.is_file())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_uses_the_explicit_cli_path_when_given() {
        assert_eq!(resolve_path(Some("/tmp/c.yaml")), PathBuf::from("/tmp/c.yaml"));
    }
}
