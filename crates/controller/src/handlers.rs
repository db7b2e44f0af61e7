//! HTTP route handlers for the gatewayd controller API.

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use cluster::{ClusterConfig, RouterRecord};
use drift::{DriftEvent, RouterState};
use futures::StreamExt;
use remote::RemoteTransport;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use vrrpconf::VrrpState;

use crate::error::ApiError;
use crate::remote_iface;
use crate::state::AppState;
use crate::transport;
use crate::version;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/routers", get(list_routers).post(create_router))
        .route(
            "/api/routers/{name}",
            get(get_router).put(update_router).delete(delete_router),
        )
        .route("/api/routers/{name}/probe", post(probe_router))
        .route("/api/routers/{name}/install", post(install_router))
        .route("/api/routers/{name}/uninstall", post(uninstall_router))
        .route("/api/routers/{name}/doctor", get(doctor_router))
        .route("/api/routers/install-all", post(install_all))
        .route("/api/detect-net", post(detect_net))
        .route("/api/verify-drift", post(verify_drift))
        .route("/api/version", get(get_version))
        .route("/api/upgrade", post(upgrade))
        .with_state(state)
}

fn sanitize(mut r: RouterRecord) -> RouterRecord {
    r.ssh_password = None;
    r.ssh_key = None;
    r
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    vip: String,
    cidr: String,
    current_master: Option<String>,
    routers: Vec<RouterRecord>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let cfg = state.manager.config().await;
    let current_master = cfg
        .routers
        .iter()
        .find(|r| r.vrrp_state == Some(VrrpState::Master))
        .or_else(|| cfg.primary())
        .map(|r| r.name.clone());

    Ok(Json(StatusResponse {
        vip: cfg.vip.to_string(),
        cidr: cfg.cidr.clone(),
        current_master,
        routers: cfg.routers.into_iter().map(sanitize).collect(),
    }))
}

async fn get_config(State(state): State<AppState>) -> Json<ClusterConfig> {
    Json(state.manager.config().await)
}

#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    vip: Option<String>,
    cidr: Option<String>,
    vrid: Option<u8>,
    advert_int_sec: Option<u32>,
    preempt: Option<bool>,
    preempt_delay_sec: Option<u32>,
    interval_sec: Option<u32>,
    fail_count: Option<u32>,
    recover_count: Option<u32>,
    hold_down_sec: Option<u32>,
    quorum: Option<String>,
}

async fn put_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ClusterConfig>, ApiError> {
    let mut cfg = state.manager.config().await;
    if let Some(vip) = update.vip {
        cfg.vip = vip
            .parse()
            .map_err(|_| common::GatewayError::InvalidVip(vip))?;
    }
    if let Some(cidr) = update.cidr {
        cfg.cidr = cidr;
    }
    if let Some(v) = update.vrid {
        cfg.vrid = v;
    }
    if let Some(v) = update.advert_int_sec {
        cfg.advert_int_sec = v;
    }
    if let Some(v) = update.preempt {
        cfg.preempt = v;
    }
    if let Some(v) = update.preempt_delay_sec {
        cfg.preempt_delay_sec = v;
    }
    if let Some(v) = update.interval_sec {
        cfg.interval_sec = v;
    }
    if let Some(v) = update.fail_count {
        cfg.fail_count = v;
    }
    if let Some(v) = update.recover_count {
        cfg.recover_count = v;
    }
    if let Some(v) = update.hold_down_sec {
        cfg.hold_down_sec = v;
    }
    if let Some(v) = update.quorum {
        cfg.quorum = v;
    }
    cfg.validate()?;

    state.manager.replace_config(cfg.clone()).await;
    state.manager.save().await?;
    Ok(Json(cfg))
}

async fn list_routers(State(state): State<AppState>) -> Json<Vec<RouterRecord>> {
    Json(state.manager.routers().await.into_iter().map(sanitize).collect())
}

async fn create_router(
    State(state): State<AppState>,
    Json(record): Json<RouterRecord>,
) -> Result<(StatusCode, Json<RouterRecord>), ApiError> {
    state.manager.add_router(record.clone()).await?;
    state.manager.save().await?;
    Ok((StatusCode::CREATED, Json(sanitize(record))))
}

async fn get_router(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RouterRecord>, ApiError> {
    state
        .manager
        .router(&name)
        .await
        .map(|r| Json(sanitize(r)))
        .ok_or_else(|| common::GatewayError::IfaceNotFound(name).into())
}

async fn update_router(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(record): Json<RouterRecord>,
) -> Result<Json<RouterRecord>, ApiError> {
    state.manager.remove_router(&name).await.ok();
    let mut record = record;
    record.name = name;
    state.manager.add_router(record.clone()).await?;
    state.manager.save().await?;
    Ok(Json(sanitize(record)))
}

async fn delete_router(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.manager.remove_router(&name).await?;
    state.manager.save().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn probe_router(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<policy::Status>, ApiError> {
    Ok(Json(state.manager.probe(&name).await?))
}

async fn install_router(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let record = state
        .manager
        .router(&name)
        .await
        .ok_or_else(|| common::GatewayError::IfaceNotFound(name.clone()))?;

    tokio::spawn(run_install(state.clone(), record));
    Ok(StatusCode::ACCEPTED)
}

async fn run_install(state: AppState, record: RouterRecord) {
    state.manager.begin_install(&record.name).await;
    let transport = match transport::connect(&record).await {
        Ok(t) => t,
        Err(e) => {
            warn!(router = record.name, error = %e, "install: failed to connect");
            let result = Err(e);
            state.manager.finish_install(&record.name, &result).await;
            return;
        }
    };
    let result = state
        .installer
        .install(&state.manager, &transport, &record.name, version::CURRENT_VERSION)
        .await
        .map(|_| ());
    match &result {
        Ok(()) => info!(router = record.name, "install completed"),
        Err(e) => warn!(router = record.name, error = %e, "install failed"),
    }
    state.manager.finish_install(&record.name, &result).await;
}

async fn uninstall_router(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let record = state
        .manager
        .router(&name)
        .await
        .ok_or_else(|| common::GatewayError::IfaceNotFound(name.clone()))?;

    let vip = state.manager.config().await.vip;
    tokio::spawn(async move {
        state.manager.begin_uninstall(&record.name).await;
        let transport = match transport::connect(&record).await {
            Ok(t) => t,
            Err(e) => {
                warn!(router = record.name, error = %e, "uninstall: failed to connect");
                let result = Err(e);
                state.manager.finish_uninstall(&record.name, &result).await;
                return;
            }
        };
        let result = state.installer.uninstall(&transport, &record, vip).await;
        if let Err(ref e) = result {
            warn!(router = record.name, error = %e, "uninstall failed");
        }
        state.manager.finish_uninstall(&record.name, &result).await;
    });
    Ok(StatusCode::ACCEPTED)
}

async fn install_all(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let routers = state.manager.routers().await;
    for record in routers {
        if record.has_credential() {
            tokio::spawn(run_install(state.clone(), record));
        }
    }
    Ok(StatusCode::ACCEPTED)
}

fn ndjson_response(rx: tokio::sync::mpsc::Receiver<DriftEvent>) -> Response {
    let stream = ReceiverStream::new(rx)
        .map(|e| Ok::<_, Infallible>(Bytes::from(e.to_ndjson_line())));
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn doctor_router(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let record = state
        .manager
        .router(&name)
        .await
        .ok_or_else(|| common::GatewayError::IfaceNotFound(name.clone()))?;

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        run_doctor(record, tx).await;
    });
    Ok(ndjson_response(rx))
}

async fn run_doctor(record: RouterRecord, tx: tokio::sync::mpsc::Sender<DriftEvent>) {
    macro_rules! emit {
        ($e:expr) => {
            if tx.send($e).await.is_err() {
                return;
            }
        };
    }

    emit!(DriftEvent::running("connect", format!("connecting to {}", record.host)));
    let transport = match transport::connect(&record).await {
        Ok(t) => t,
        Err(e) => {
            emit!(DriftEvent::error("connect", e.to_string()));
            return;
        }
    };
    emit!(DriftEvent::success("connect", "connected"));

    emit!(DriftEvent::running("platform", "detecting remote platform"));
    match remote::RemotePlatform::detect(&transport).await {
        Ok(p) => emit!(DriftEvent::success("platform", format!("{p:?}"))),
        Err(e) => emit!(DriftEvent::error("platform", e.to_string())),
    }

    emit!(DriftEvent::running("vrrp_daemon", "checking keepalived"));
    match transport.run("pgrep -x keepalived").await {
        Ok(out) if out.success() => emit!(DriftEvent::success("vrrp_daemon", "running")),
        Ok(_) => emit!(DriftEvent::error("vrrp_daemon", "not running")),
        Err(e) => emit!(DriftEvent::error("vrrp_daemon", e.to_string())),
    }

    emit!(DriftEvent::running("agent", "checking gateway-agent"));
    match transport.run("test -x /usr/sbin/gateway-agent").await {
        Ok(out) if out.success() => emit!(DriftEvent::success("agent", "installed")),
        Ok(_) => emit!(DriftEvent::error("agent", "not installed")),
        Err(e) => emit!(DriftEvent::error("agent", e.to_string())),
    }

    if let Some(iface) = &record.iface {
        emit!(DriftEvent::running("interface", format!("checking {iface}")));
        match transport.run(&format!("ip link show dev {iface}")).await {
            Ok(out) if out.success() => emit!(DriftEvent::success("interface", iface.clone())),
            Ok(_) => emit!(DriftEvent::error("interface", format!("{iface} not found"))),
            Err(e) => emit!(DriftEvent::error("interface", e.to_string())),
        }
    }

    emit!(DriftEvent::success("finish", "diagnostics complete"));
}

#[derive(Debug, Deserialize)]
struct DetectNetRequest {
    host: String,
    #[serde(default)]
    ssh_user: Option<String>,
    #[serde(default)]
    ssh_password: Option<String>,
    #[serde(default)]
    ssh_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct DetectNetResponse {
    iface: String,
    cidr: String,
}

async fn detect_net(
    State(_state): State<AppState>,
    body: Option<Json<DetectNetRequest>>,
) -> Result<Json<DetectNetResponse>, ApiError> {
    match body {
        Some(Json(req)) => {
            let record = RouterRecord {
                ssh_user: req.ssh_user,
                ssh_password: req.ssh_password,
                ssh_key: req.ssh_key,
                ..RouterRecord::bare("detect-net", req.host, vrrpconf::Role::Primary)
            };
            let transport = transport::connect(&record).await?;
            let (iface, cidr) = remote::netdiscover::discover(&transport, None).await?;
            Ok(Json(DetectNetResponse { iface, cidr }))
        }
        None => {
            let (iface, cidr) = remote_iface::discover_local().await?;
            Ok(Json(DetectNetResponse { iface, cidr }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyDriftRequest {
    vip: String,
    master: String,
    backup: String,
}

async fn verify_drift(
    State(state): State<AppState>,
    Json(req): Json<VerifyDriftRequest>,
) -> Result<Response, ApiError> {
    let master_record = state
        .manager
        .router(&req.master)
        .await
        .ok_or_else(|| common::GatewayError::IfaceNotFound(req.master.clone()))?;
    let backup_record = state
        .manager
        .router(&req.backup)
        .await
        .ok_or_else(|| common::GatewayError::IfaceNotFound(req.backup.clone()))?;

    let master_transport = Arc::new(transport::connect(&master_record).await?);
    let backup_transport = Arc::new(transport::connect(&backup_record).await?);

    let master_state = remote_vrrp_state(master_transport.as_ref()).await;
    let backup_state = remote_vrrp_state(backup_transport.as_ref()).await;

    let states = vec![
        RouterState {
            record: master_record,
            vrrp_state: master_state,
        },
        RouterState {
            record: backup_record,
            vrrp_state: backup_state,
        },
    ];

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        drift::run(&states, &req.vip, master_transport.as_ref(), backup_transport.as_ref(), &tx).await;
    });

    Ok(ndjson_response(rx))
}

async fn remote_vrrp_state(transport: &dyn RemoteTransport) -> VrrpState {
    match transport.run(&format!("cat {} 2>/dev/null", drift::AGENT_STATE_PATH)).await {
        Ok(out) => VrrpState::from_str(out.stdout.trim()).unwrap_or(VrrpState::Unknown),
        Err(_) => VrrpState::Unknown,
    }
}

async fn get_version(State(state): State<AppState>) -> Json<version::VersionInfo> {
    Json(version::check(&state.release_bases()).await)
}

async fn upgrade(State(state): State<AppState>) -> StatusCode {
    let bases = state.release_bases();
    tokio::spawn(async move {
        version::upgrade(bases).await;
    });
    StatusCode::ACCEPTED
}
