//! Concurrent cluster state manager: the controller's single source of
//! truth for routers, probes, and VRRP parameters.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use common::{Error, GatewayError};
use policy::{State, Status};
use remote::{ConnectSpec, Credential, RemotePlatform, RemoteTransport, SshTransport};
use tokio::sync::RwLock;
use tracing::{info, warn};
use vrrpconf::VrrpState;

use crate::model::{AgentConfig, ClusterConfig, LogLine, RouterRecord, RouterStatus};
use crate::persist;
use crate::secret::Sealer;

/// Path of the agent binary on a managed router. Kept local to this
/// crate rather than shared with `install`, which depends on `cluster`
/// and cannot be depended on back.
const AGENT_BIN_PATH: &str = "/usr/sbin/gateway-agent";

/// Dial an authenticated SSH session to `record` using its stored
/// credentials, preferring a key over a password when both are set.
async fn connect(record: &RouterRecord) -> Result<SshTransport, GatewayError> {
    let credential = if let Some(key) = &record.ssh_key {
        Credential::Key {
            key_bytes: key.as_bytes().to_vec(),
            passphrase: None,
        }
    } else if let Some(password) = &record.ssh_password {
        Credential::Password(password.clone())
    } else {
        return Err(GatewayError::SshAuth {
            host: record.host.clone(),
        });
    };

    let spec = ConnectSpec {
        host: record.host.clone(),
        user: record.ssh_user.clone().unwrap_or_else(|| "root".to_string()),
        credential,
        ..ConnectSpec::default()
    };

    SshTransport::connect(&spec).await
}

/// What one remote probe round observes about a router, before it is
/// folded into the router's persisted record.
struct RemoteObservation {
    platform: RemotePlatform,
    agent_version: Option<String>,
    vrrp_state: Option<VrrpState>,
    status: Status,
}

/// Mirrors the JSON object `gateway-agent status --json` prints.
#[derive(serde::Deserialize)]
struct AgentStatusReport {
    vrrp_state: String,
    #[allow(dead_code)]
    daemon_running: bool,
    #[allow(dead_code)]
    healthy: Option<bool>,
    health: Option<Status>,
}

fn fallback_status(reason: impl Into<String>) -> Status {
    Status {
        healthy: false,
        state: State::Unknown,
        mode: String::new(),
        probes: Vec::new(),
        passed_count: 0,
        total_count: 0,
        required_count: 0,
        reason: reason.into(),
        last_check: Utc::now(),
        state_changed_at: None,
    }
}

/// The controller's cluster state manager.
///
/// `state` is guarded by a single `RwLock`: snapshots are cloned out
/// before any `.await` so a slow probe round never holds the write lock.
pub struct Manager {
    state_path: PathBuf,
    sealer: Sealer,
    state: RwLock<ClusterConfig>,
}

impl Manager {
    pub fn new(state_path: PathBuf) -> Self {
        Self {
            state_path,
            sealer: Sealer::with_default_key(),
            state: RwLock::new(ClusterConfig {
                vip: Ipv4Addr::UNSPECIFIED,
                cidr: "0.0.0.0/0".to_string(),
                vrid: 51,
                advert_int_sec: 1,
                preempt: false,
                preempt_delay_sec: 0,
                interval_sec: 2,
                fail_count: 3,
                recover_count: 2,
                hold_down_sec: 0,
                quorum: String::new(),
                routers: Vec::new(),
            }),
        }
    }

    pub async fn load(&self) -> Result<(), Error> {
        let cfg = persist::load(&self.state_path, &self.sealer).await?;
        *self.state.write().await = cfg;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), Error> {
        let snapshot = self.state.read().await.clone();
        persist::save(&self.state_path, &snapshot, &self.sealer).await
    }

    pub async fn config(&self) -> ClusterConfig {
        self.state.read().await.clone()
    }

    /// Replace the entire VRRP parameter set and router list in one shot,
    /// e.g. from a `PUT /api/config` request. Callers are expected to have
    /// already run [`ClusterConfig::validate`].
    pub async fn replace_config(&self, cfg: ClusterConfig) {
        *self.state.write().await = cfg;
    }

    pub async fn validate(&self) -> Result<(), GatewayError> {
        self.state.read().await.validate()
    }

    pub async fn routers(&self) -> Vec<RouterRecord> {
        self.state.read().await.routers.clone()
    }

    pub async fn router(&self, name: &str) -> Option<RouterRecord> {
        self.state.read().await.router(name).cloned()
    }

    pub async fn add_router(&self, record: RouterRecord) -> Result<(), GatewayError> {
        let mut guard = self.state.write().await;
        if guard.routers.iter().any(|r| r.name == record.name) {
            return Err(GatewayError::DuplicateRouterName(record.name));
        }
        guard.routers.push(record);
        let snapshot = guard.clone();
        drop(guard);
        snapshot.validate()?;
        info!(count = snapshot.routers.len(), "router added");
        Ok(())
    }

    pub async fn remove_router(&self, name: &str) -> Result<(), GatewayError> {
        let mut guard = self.state.write().await;
        let before = guard.routers.len();
        guard.routers.retain(|r| r.name != name);
        if guard.routers.len() == before {
            return Err(GatewayError::IfaceNotFound(name.to_string()));
        }
        drop(guard);
        info!(router = name, "router removed");
        Ok(())
    }

    /// Open a session to `name`, ask its agent for `status --json`, and
    /// fold the observed platform/version/VRRP state/health onto the
    /// router's persisted record.
    pub async fn probe(&self, name: &str) -> Result<Status, GatewayError> {
        let record = self
            .router(name)
            .await
            .ok_or_else(|| GatewayError::IfaceNotFound(name.to_string()))?;

        let observation = match self.observe(&record).await {
            Ok(obs) => obs,
            Err(e) => {
                warn!(router = name, error = %e, "probe failed");
                self.apply_observation_error(name, e.to_string()).await;
                return Ok(fallback_status(e.to_string()));
            }
        };

        let status = observation.status.clone();
        self.apply_observation(name, observation).await;
        Ok(status)
    }

    async fn observe(&self, record: &RouterRecord) -> Result<RemoteObservation, GatewayError> {
        let transport = connect(record).await?;
        let platform = RemotePlatform::detect(&transport).await?;

        let version_out = transport
            .run_timeout(&format!("{AGENT_BIN_PATH} version"), 10)
            .await?;
        let agent_version = version_out
            .success()
            .then(|| version_out.stdout.trim().to_string())
            .filter(|s| !s.is_empty());

        let status_out = transport
            .run_timeout(&format!("{AGENT_BIN_PATH} status --json"), 10)
            .await?;
        if !status_out.success() {
            return Err(GatewayError::RemoteExec(format!(
                "status --json failed on {}: {}",
                record.host,
                status_out.stderr.trim()
            )));
        }

        let reported: AgentStatusReport = serde_json::from_str(status_out.stdout.trim())
            .map_err(|e| GatewayError::RemoteExec(format!("could not parse agent status: {e}")))?;
        let vrrp_state = reported.vrrp_state.parse::<VrrpState>().ok();
        let status = reported
            .health
            .unwrap_or_else(|| fallback_status("agent reported no health data"));

        Ok(RemoteObservation {
            platform,
            agent_version,
            vrrp_state,
            status,
        })
    }

    async fn apply_observation(&self, name: &str, obs: RemoteObservation) {
        let mut guard = self.state.write().await;
        if let Some(r) = guard.routers.iter_mut().find(|r| r.name == name) {
            r.platform = Some(format!("{:?}", obs.platform));
            r.agent_version = obs.agent_version;
            r.vrrp_state = obs.vrrp_state;
            r.healthy = Some(obs.status.healthy);
            r.error = None;
            r.last_seen = Some(Utc::now());
            if !matches!(r.status, RouterStatus::Installing | RouterStatus::Uninstalling) {
                r.status = RouterStatus::Online;
            }
        }
    }

    async fn apply_observation_error(&self, name: &str, error: String) {
        let mut guard = self.state.write().await;
        if let Some(r) = guard.routers.iter_mut().find(|r| r.name == name) {
            r.healthy = None;
            r.vrrp_state = None;
            r.error = Some(error);
            if !matches!(r.status, RouterStatus::Installing | RouterStatus::Uninstalling) {
                r.status = RouterStatus::Offline;
            }
        }
    }

    /// Run a probe round for every configured router.
    pub async fn probe_all(&self) -> Vec<(String, Result<Status, GatewayError>)> {
        let names: Vec<String> = self.state.read().await.routers.iter().map(|r| r.name.clone()).collect();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let result = self.probe(&name).await;
            out.push((name, result));
        }
        out
    }

    /// Mark `name` as mid-install, resetting its progress log.
    pub async fn begin_install(&self, name: &str) {
        let mut guard = self.state.write().await;
        if let Some(r) = guard.routers.iter_mut().find(|r| r.name == name) {
            r.status = RouterStatus::Installing;
            r.error = None;
            r.install_log.clear();
            r.install_step = Some(0);
            r.install_total = None;
        }
    }

    /// Append one install/uninstall progress line, bounded to the last
    /// 30 entries, and update the step counters.
    pub async fn record_install_progress(&self, name: &str, step: u32, total: u32, message: impl Into<String>) {
        let mut guard = self.state.write().await;
        if let Some(r) = guard.routers.iter_mut().find(|r| r.name == name) {
            r.install_log.push(LogLine {
                at: Utc::now(),
                message: message.into(),
            });
            if r.install_log.len() > 30 {
                let drop_n = r.install_log.len() - 30;
                r.install_log.drain(0..drop_n);
            }
            r.install_step = Some(step);
            r.install_total = Some(total);
        }
    }

    pub async fn finish_install(&self, name: &str, result: &Result<(), GatewayError>) {
        let mut guard = self.state.write().await;
        if let Some(r) = guard.routers.iter_mut().find(|r| r.name == name) {
            match result {
                Ok(()) => {
                    r.status = RouterStatus::Online;
                    r.error = None;
                }
                Err(e) => {
                    r.status = RouterStatus::Error;
                    r.error = Some(e.to_string());
                }
            }
        }
    }

    /// Mark `name` as mid-uninstall, resetting its progress log.
    pub async fn begin_uninstall(&self, name: &str) {
        let mut guard = self.state.write().await;
        if let Some(r) = guard.routers.iter_mut().find(|r| r.name == name) {
            r.status = RouterStatus::Uninstalling;
            r.error = None;
            r.install_log.clear();
            r.install_step = Some(0);
            r.install_total = None;
        }
    }

    pub async fn finish_uninstall(&self, name: &str, result: &Result<(), GatewayError>) {
        let mut guard = self.state.write().await;
        if let Some(r) = guard.routers.iter_mut().find(|r| r.name == name) {
            match result {
                Ok(()) => {
                    r.status = RouterStatus::Unknown;
                    r.error = None;
                    r.vrrp_state = None;
                    r.healthy = None;
                    r.platform = None;
                    r.agent_version = None;
                }
                Err(e) => {
                    r.status = RouterStatus::Error;
                    r.error = Some(e.to_string());
                }
            }
        }
    }

    /// Derive the agent config for `name` from the shared VRRP
    /// parameters plus that router's own record and its peer's address.
    pub async fn generate_agent_config(&self, name: &str) -> Result<AgentConfig, GatewayError> {
        let cfg = self.state.read().await.clone();
        let record = cfg
            .router(name)
            .ok_or_else(|| GatewayError::IfaceNotFound(name.to_string()))?;
        let peer = cfg.peer_of(name).ok_or(GatewayError::NoPeer)?;

        let self_ip: Ipv4Addr = record
            .host
            .parse()
            .map_err(|_| GatewayError::InvalidVip(record.host.clone()))?;
        let peer_ip: Ipv4Addr = peer
            .host
            .parse()
            .map_err(|_| GatewayError::InvalidVip(peer.host.clone()))?;
        let iface = record.iface.clone().ok_or(GatewayError::NoIface)?;

        Ok(AgentConfig {
            role: record.role,
            iface,
            vrid: cfg.vrid,
            advert_int_sec: cfg.advert_int_sec,
            preempt: cfg.preempt,
            preempt_delay_sec: cfg.preempt_delay_sec,
            self_ip,
            peer_ip,
            vip: cfg.vip,
            probes: record.probes.clone(),
            fail_count: cfg.fail_count,
            recover_count: cfg.recover_count,
            hold_down: Duration::from_secs(cfg.hold_down_sec as u64),
            quorum: cfg.quorum.clone(),
            interval_sec: cfg.interval_sec,
        })
    }

    /// Suggest the first address in `cidr` that is neither the VIP nor
    /// any configured router host. Used by the "add router" UI flow to
    /// pre-fill a likely-free address; the caller must still validate.
    pub async fn suggest_vip(&self, cidr: &str) -> Result<Ipv4Addr, GatewayError> {
        let net: ipnet::Ipv4Net = cidr
            .parse()
            .map_err(|_| GatewayError::InvalidCidr(cidr.to_string()))?;
        let cfg = self.state.read().await;
        let taken: std::collections::HashSet<Ipv4Addr> = cfg
            .routers
            .iter()
            .filter_map(|r| r.host.parse().ok())
            .chain(std::iter::once(cfg.vip))
            .collect();

        net.hosts()
            .find(|ip| !taken.contains(ip))
            .ok_or_else(|| GatewayError::InvalidCidr(format!("{cidr} has no free address")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProbeSpec;
    use vrrpconf::Role;

    fn router(name: &str, role: Role, host: &str, iface: &str) -> RouterRecord {
        RouterRecord {
            iface: Some(iface.to_string()),
            probes: vec![ProbeSpec::Tcp {
                target: "10.0.0.1".to_string(),
                port: 80,
            }],
            ..RouterRecord::bare(name, host, role)
        }
    }

    fn manager() -> Manager {
        let mut p = std::env::temp_dir();
        p.push(format!("gatewayd-manager-test-{}-{}.yaml", std::process::id(), rand_suffix()));
        Manager::new(p)
    }

    fn rand_suffix() -> u32 {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    #[tokio::test]
    async fn add_then_remove_router_round_trips() {
        let mgr = manager();
        mgr.add_router(router("r1", Role::Primary, "10.0.0.2", "eth0"))
            .await
            .unwrap();
        assert_eq!(mgr.routers().await.len(), 1);
        mgr.remove_router("r1").await.unwrap();
        assert!(mgr.routers().await.is_empty());
    }

    #[tokio::test]
    async fn adding_a_duplicate_name_is_rejected() {
        let mgr = manager();
        mgr.add_router(router("r1", Role::Primary, "10.0.0.2", "eth0"))
            .await
            .unwrap();
        let err = mgr
            .add_router(router("r1", Role::Secondary, "10.0.0.3", "eth0"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateRouterName(_)));
    }

    #[tokio::test]
    async fn generate_agent_config_resolves_peer_address() {
        let mgr = manager();
        mgr.add_router(router("r1", Role::Primary, "10.0.0.2", "eth0"))
            .await
            .unwrap();
        mgr.add_router(router("r2", Role::Secondary, "10.0.0.3", "eth0"))
            .await
            .unwrap();

        let cfg = mgr.generate_agent_config("r1").await.unwrap();
        assert_eq!(cfg.self_ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(cfg.peer_ip, Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(cfg.role, Role::Primary);
    }

    #[tokio::test]
    async fn generate_agent_config_fails_with_a_single_router() {
        let mgr = manager();
        mgr.add_router(router("r1", Role::Primary, "10.0.0.2", "eth0"))
            .await
            .unwrap();
        let err = mgr.generate_agent_config("r1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NoPeer));
    }

    #[tokio::test]
    async fn suggest_vip_skips_taken_addresses() {
        let mgr = manager();
        {
            let mut guard = mgr.state.write().await;
            guard.vip = Ipv4Addr::new(10, 0, 0, 1);
        }
        mgr.add_router(router("r1", Role::Primary, "10.0.0.2", "eth0"))
            .await
            .unwrap();
        let suggestion = mgr.suggest_vip("10.0.0.0/29").await.unwrap();
        assert_ne!(suggestion, Ipv4Addr::new(10, 0, 0, 1));
        assert_ne!(suggestion, Ipv4Addr::new(10, 0, 0, 2));
    }
}
