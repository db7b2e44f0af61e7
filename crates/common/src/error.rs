//! Common error types shared across gatewayd components.
//!
//! [`GatewayError`] is the closed taxonomy described by the system's error
//! handling design: every variant maps to a stable string code via
//! [`GatewayError::code`], so callers at a process boundary (HTTP handlers,
//! CLI exit paths) never need to match on this crate's types directly.

use std::fmt;

/// A specialized Result type for gatewayd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for gatewayd operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }

    /// Stable string code for this error, for HTTP/CLI surfaces.
    pub fn code(&self) -> String {
        match self {
            Error::Io(_) => "IO_ERROR".to_string(),
            Error::Json(_) => "JSON_ERROR".to_string(),
            Error::Yaml(_) => "YAML_ERROR".to_string(),
            Error::Gateway(g) => g.code(),
            Error::Config(_) => "CONFIG_INVALID".to_string(),
            Error::Other(_) => "OTHER".to_string(),
        }
    }
}

/// The closed error-kind taxonomy for the gateway control plane.
///
/// Every variant corresponds to one code in the system's external error
/// contract. Add a variant here only when the contract gains a new kind.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    // --- input validation ---
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("invalid virtual IP: {0}")]
    InvalidVip(String),
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),
    #[error("virtual IP {vip} is not within {cidr}")]
    VipNotInCidr { vip: String, cidr: String },
    #[error("duplicate router name: {0}")]
    DuplicateRouterName(String),
    #[error("virtual IP conflicts with router host: {0}")]
    VipConflictsHost(String),
    #[error("no primary router configured")]
    NoPrimary,
    #[error("no secondary router configured")]
    NoSecondary,
    #[error("k ({k}) exceeds n ({n}) in quorum")]
    KGtN { k: u32, n: u32 },

    // --- connectivity ---
    #[error("failed to dial {host}: {source}")]
    SshDial { host: String, source: String },
    #[error("authentication failed for {host}")]
    SshAuth { host: String },
    #[error("remote command failed: {0}")]
    RemoteExec(String),
    #[error("uploaded file size mismatch: expected {expected}, got {actual}")]
    UploadSizeMismatch { expected: u64, actual: u64 },

    // --- probes ---
    #[error("ping command not found")]
    PingCmdNotFound,
    #[error("ping failed: {0}")]
    PingFailed(String),
    #[error("DNS lookup failed: {0}")]
    DnsFailed(String),
    #[error("DNS lookup returned no results")]
    DnsNoResult,
    #[error("TCP connect failed: {0}")]
    TcpFailed(String),
    #[error("HTTP request failed: {0}")]
    HttpFailed(String),
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    // --- install / uninstall ---
    #[error("at least two routers are required to derive a peer")]
    NoPeer,
    #[error("router has no configured interface")]
    NoIface,
    #[error("interface {0} not found on remote host")]
    IfaceNotFound(String),
    #[error("could not determine an IPv4 address for interface {0}")]
    NoInterfaceIp(String),
    #[error("failed to download agent binary: {0}")]
    DownloadFailed(String),
    #[error("VRRP daemon failed to start")]
    KeepalivedFailedToStart,
    #[error("router {0} already has an install in progress")]
    AlreadyInstalling(String),

    // --- VRRP config ---
    #[error("failed to render VRRP config: {0}")]
    RenderFailed(String),
    #[error("failed to reload VRRP daemon: {0}")]
    ReloadFailed(String),
    #[error("VRRP config invalid: {0}")]
    ConfigInvalid(String),

    // --- auth ---
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden cross-origin request")]
    ForbiddenCrossOrigin,
}

impl GatewayError {
    /// Stable string code used by the HTTP API, CLI, and logs.
    pub fn code(&self) -> String {
        match self {
            GatewayError::InvalidRole(_) => "INVALID_ROLE".to_string(),
            GatewayError::InvalidVip(_) => "INVALID_VIP".to_string(),
            GatewayError::InvalidCidr(_) => "INVALID_CIDR".to_string(),
            GatewayError::VipNotInCidr { .. } => "VIP_NOT_IN_CIDR".to_string(),
            GatewayError::DuplicateRouterName(_) => "DUPLICATE_ROUTER_NAME".to_string(),
            GatewayError::VipConflictsHost(_) => "VIP_CONFLICTS_HOST".to_string(),
            GatewayError::NoPrimary => "NO_PRIMARY".to_string(),
            GatewayError::NoSecondary => "NO_SECONDARY".to_string(),
            GatewayError::KGtN { .. } => "K_GT_N".to_string(),
            GatewayError::SshDial { .. } => "SSH_DIAL".to_string(),
            GatewayError::SshAuth { .. } => "SSH_AUTH".to_string(),
            GatewayError::RemoteExec(_) => "REMOTE_EXEC".to_string(),
            GatewayError::UploadSizeMismatch { .. } => "UPLOAD_SIZE_MISMATCH".to_string(),
            GatewayError::PingCmdNotFound => "PING_CMD_NOT_FOUND".to_string(),
            GatewayError::PingFailed(_) => "PING_FAILED".to_string(),
            GatewayError::DnsFailed(_) => "DNS_FAILED".to_string(),
            GatewayError::DnsNoResult => "DNS_NO_RESULT".to_string(),
            GatewayError::TcpFailed(_) => "TCP_FAILED".to_string(),
            GatewayError::HttpFailed(_) => "HTTP_FAILED".to_string(),
            GatewayError::HttpStatus(code) => format!("HTTP_{code}"),
            GatewayError::NoPeer => "NO_PEER".to_string(),
            GatewayError::NoIface => "NO_IFACE".to_string(),
            GatewayError::IfaceNotFound(_) => "IFACE_NOT_FOUND".to_string(),
            GatewayError::NoInterfaceIp(_) => "NO_INTERFACE_IP".to_string(),
            GatewayError::DownloadFailed(_) => "DOWNLOAD_FAILED".to_string(),
            GatewayError::KeepalivedFailedToStart => "KEEPALIVED_FAILED_TO_START".to_string(),
            GatewayError::AlreadyInstalling(_) => "ALREADY_INSTALLING".to_string(),
            GatewayError::RenderFailed(_) => "RENDER_FAILED".to_string(),
            GatewayError::ReloadFailed(_) => "RELOAD_FAILED".to_string(),
            GatewayError::ConfigInvalid(_) => "CONFIG_INVALID".to_string(),
            GatewayError::Unauthorized => "UNAUTHORIZED".to_string(),
            GatewayError::ForbiddenCrossOrigin => "FORBIDDEN_CROSS_ORIGIN".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_for_named_variants() {
        assert_eq!(GatewayError::NoPeer.code(), "NO_PEER");
        assert_eq!(GatewayError::Unauthorized.code(), "UNAUTHORIZED");
    }

    #[test]
    fn http_status_code_embeds_the_status() {
        assert_eq!(GatewayError::HttpStatus(503).code(), "HTTP_503");
    }

    #[test]
    fn error_delegates_code_to_gateway_variant() {
        let e: Error = GatewayError::NoIface.into();
        assert_eq!(e.code(), "NO_IFACE");
    }
}
