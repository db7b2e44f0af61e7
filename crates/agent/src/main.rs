//! `gateway-agent`: the per-router binary that renders and applies the
//! VRRP daemon's config, runs health checks on its behalf, and records
//! the daemon's notify-reported state.

mod cli;
mod config;
mod support;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, CliHealthMode, Command, NotifyState};
use config::{AgentConfigFile, HealthMode};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};
use vrrpconf::{lifecycle, reconcile, render, STATE_FILE_PATH};

const AGENT_BIN_PATH: &str = "/usr/sbin/gateway-agent";
const VRRP_DAEMON: &str = "keepalived";

#[tokio::main]
async fn main() {
    common::logging::init();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, code = e.code(), "command failed");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32, common::GatewayError> {
    match cli.command {
        Command::Version => {
            println!("gateway-agent {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::DetectIface => cmd_detect_iface().await,
        Command::Render => {
            let cfg = load_config(&cli.config)?;
            let input = support::render_input(&cfg, AGENT_BIN_PATH, &config_path_string(&cli.config))?;
            print!("{}", render::render(&input)?);
            Ok(0)
        }
        Command::Apply => cmd_apply(&cli).await,
        Command::Check { mode } => cmd_check(&cli, mode).await,
        Command::Status { json } => cmd_status(&cli, json).await,
        Command::Notify { state } => cmd_notify(state).await,
        Command::Doctor { fix, json } => cmd_doctor(&cli, fix, json).await,
        Command::Run => cmd_run(&cli).await,
    }
}

fn config_path_string(cli_path: &Option<String>) -> String {
    AgentConfigFile::resolve_path(cli_path.as_deref())
        .to_string_lossy()
        .into_owned()
}

fn load_config(cli_path: &Option<String>) -> Result<AgentConfigFile, common::GatewayError> {
    let path = AgentConfigFile::resolve_path(cli_path.as_deref());
    AgentConfigFile::load(&path).map_err(|e| common::GatewayError::ConfigInvalid(e.to_string()))
}

async fn cmd_apply(cli: &Cli) -> Result<i32, common::GatewayError> {
    let cfg = load_config(&cli.config)?;
    let config_path = config_path_string(&cli.config);
    let input = support::render_input(&cfg, AGENT_BIN_PATH, &config_path)?;
    let rendered = render::render(&input)?;

    let platform = lifecycle::Platform::detect().await;
    let daemon_config_path = PathBuf::from(platform.find_config_path(VRRP_DAEMON));
    lifecycle::apply(&platform, VRRP_DAEMON, &daemon_config_path, &rendered).await?;
    info!(path = %daemon_config_path.display(), "applied VRRP daemon config");
    Ok(0)
}

async fn cmd_check(cli: &Cli, mode: Option<CliHealthMode>) -> Result<i32, common::GatewayError> {
    let mut cfg = load_config(&cli.config)?;
    if let Some(mode) = mode {
        cfg.health.mode = match mode {
            CliHealthMode::Basic => HealthMode::Basic,
            CliHealthMode::Internet => HealthMode::Internet,
        };
    }

    let policy_config = support::policy_config(&cfg)?;
    let engine = policy::PolicyEngine::new(policy_config);
    let probes = cfg.health.active_checks().to_vec();

    let status = timeout(Duration::from_secs(30), engine.check(&probes))
        .await
        .map_err(|_| common::GatewayError::RemoteExec("health check round timed out".to_string()))?;

    println!("{}", status.reason);
    Ok(if status.healthy { 0 } else { 1 })
}

async fn cmd_status(cli: &Cli, json: bool) -> Result<i32, common::GatewayError> {
    let state_path = PathBuf::from(STATE_FILE_PATH);
    let state_file = lifecycle::read_state_file(&state_path).await;
    let daemon_running = lifecycle::daemon_running(VRRP_DAEMON).await;

    // Without a config we cannot know which interface to inspect; fall
    // back to the state file and the daemon's liveness alone.
    let state = reconcile::reconcile(state_file.as_deref(), false, daemon_running);

    // A missing/invalid config means we can't run a health round; report
    // the VRRP state alone rather than fail the whole command.
    let health = match load_config(&cli.config) {
        Ok(cfg) => {
            let policy_config = support::policy_config(&cfg)?;
            let engine = policy::PolicyEngine::new(policy_config);
            let probes = cfg.health.active_checks().to_vec();
            timeout(Duration::from_secs(10), engine.check(&probes)).await.ok()
        }
        Err(_) => None,
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "vrrp_state": state.to_string(),
                "daemon_running": daemon_running,
                "healthy": health.as_ref().map(|h| h.healthy),
                "health": health,
            })
        );
    } else {
        println!("state: {state}");
        println!("daemon_running: {daemon_running}");
        match &health {
            Some(h) => println!("healthy: {}", h.healthy),
            None => println!("healthy: unknown (no config)"),
        }
    }
    Ok(0)
}

async fn cmd_notify(state: NotifyState) -> Result<i32, common::GatewayError> {
    let path = PathBuf::from(STATE_FILE_PATH);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| common::GatewayError::RenderFailed(e.to_string()))?;
    }
    lifecycle::atomic_write(&path, &format!("{state}\n")).await?;
    info!(%state, "recorded VRRP notify state");
    Ok(0)
}

async fn cmd_detect_iface() -> Result<i32, common::GatewayError> {
    let addr_out = tokio::process::Command::new("ip")
        .args(["-4", "-o", "addr", "show"])
        .output()
        .await
        .map_err(|e| common::GatewayError::RemoteExec(e.to_string()))?;
    let addr_text = String::from_utf8_lossy(&addr_out.stdout);
    let ifaces = remote::netdiscover::parse_ip_addr_output(&addr_text);

    let route_out = tokio::process::Command::new("ip")
        .args(["route", "show", "default"])
        .output()
        .await
        .map_err(|e| common::GatewayError::RemoteExec(e.to_string()))?;
    let route_text = String::from_utf8_lossy(&route_out.stdout);
    let default_iface = route_text
        .split_whitespace()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "dev")
        .map(|w| w[1].to_string());

    match remote::netdiscover::choose_interface(&ifaces, None, default_iface.as_deref()) {
        Some(iface) => {
            println!("{} {}/{}", iface.name, iface.ipv4, iface.prefix_len);
            Ok(0)
        }
        None => {
            println!("no usable interface found");
            Ok(1)
        }
    }
}

async fn cmd_doctor(cli: &Cli, fix: bool, json: bool) -> Result<i32, common::GatewayError> {
    let mut checks: Vec<(&str, bool, String)> = Vec::new();

    let config_path = AgentConfigFile::resolve_path(cli.config.as_deref());
    let cfg = AgentConfigFile::load(&config_path);
    checks.push((
        "config_loads",
        cfg.is_ok(),
        match &cfg {
            Ok(_) => format!("loaded {}", config_path.display()),
            Err(e) => e.to_string(),
        },
    ));

    if let Ok(cfg) = &cfg {
        let iface_ok = tokio::process::Command::new("ip")
            .args(["link", "show", &cfg.lan.iface])
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        checks.push((
            "interface_exists",
            iface_ok,
            format!("interface {}", cfg.lan.iface),
        ));
    }

    let daemon_installed = which(VRRP_DAEMON).await;
    if !daemon_installed && fix {
        warn!("keepalived not found; --fix does not install packages, only reports");
    }
    checks.push((
        "vrrp_daemon_installed",
        daemon_installed,
        VRRP_DAEMON.to_string(),
    ));

    let state_dir_ok = PathBuf::from(STATE_FILE_PATH)
        .parent()
        .map(|p| p.exists())
        .unwrap_or(false);
    if !state_dir_ok && fix {
        if let Some(parent) = PathBuf::from(STATE_FILE_PATH).parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
    }
    checks.push((
        "state_dir_exists",
        state_dir_ok || fix,
        STATE_FILE_PATH.to_string(),
    ));

    let all_ok = checks.iter().all(|(_, ok, _)| *ok);

    if json {
        let rows: Vec<_> = checks
            .iter()
            .map(|(name, ok, detail)| serde_json::json!({ "check": name, "ok": ok, "detail": detail }))
            .collect();
        println!("{}", serde_json::json!({ "ok": all_ok, "checks": rows }));
    } else {
        for (name, ok, detail) in &checks {
            println!("[{}] {name}: {detail}", if *ok { "ok" } else { "FAIL" });
        }
    }

    Ok(if all_ok { 0 } else { 1 })
}

async fn which(bin: &str) -> bool {
    tokio::process::Command::new("which")
        .arg(bin)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run the agent's supervisory loop: periodically run a health round and
/// log it. Failover itself is driven by the VRRP daemon's own
/// `vrrp_script`/notify hooks invoking `check`/`notify`; this loop exists
/// so the agent's own log stream reflects health independently of
/// whether the daemon currently considers the host MASTER or BACKUP.
async fn cmd_run(cli: &Cli) -> Result<i32, common::GatewayError> {
    let cfg = load_config(&cli.config)?;
    let policy_config = support::policy_config(&cfg)?;
    let engine = policy::PolicyEngine::new(policy_config);
    let probes = cfg.health.active_checks().to_vec();
    let interval = Duration::from_secs(cfg.health.interval_sec.max(1) as u64);

    info!(role = ?cfg.role, primary = support::role_is_primary(cfg.role), "gateway-agent starting supervisory loop");

    loop {
        let status = engine.check(&probes).await;
        if status.healthy {
            info!(reason = %status.reason, "health round passed");
        } else {
            warn!(reason = %status.reason, "health round failed");
        }
        sleep(interval).await;
    }
}
