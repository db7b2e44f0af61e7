//! Mapping [`common::GatewayError`]/[`common::Error`] onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::GatewayError;
use serde_json::json;

pub struct ApiError(pub StatusCode, pub String, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError(status, code, message) = self;
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        let status = status_for(&e);
        let code = e.code();
        ApiError(status, code, e.to_string())
    }
}

impl From<common::Error> for ApiError {
    fn from(e: common::Error) -> Self {
        match e {
            common::Error::Gateway(g) => g.into(),
            other => ApiError(StatusCode::INTERNAL_SERVER_ERROR, other.code(), other.to_string()),
        }
    }
}

fn status_for(e: &GatewayError) -> StatusCode {
    match e {
        GatewayError::InvalidRole(_)
        | GatewayError::InvalidVip(_)
        | GatewayError::InvalidCidr(_)
        | GatewayError::VipNotInCidr { .. }
        | GatewayError::DuplicateRouterName(_)
        | GatewayError::VipConflictsHost(_)
        | GatewayError::NoPrimary
        | GatewayError::NoSecondary
        | GatewayError::KGtN { .. }
        | GatewayError::NoPeer
        | GatewayError::NoIface
        | GatewayError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,

        GatewayError::IfaceNotFound(_) => StatusCode::NOT_FOUND,

        GatewayError::AlreadyInstalling(_) => StatusCode::CONFLICT,

        GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
        GatewayError::ForbiddenCrossOrigin => StatusCode::FORBIDDEN,

        GatewayError::SshDial { .. }
        | GatewayError::SshAuth { .. }
        | GatewayError::RemoteExec(_)
        | GatewayError::UploadSizeMismatch { .. }
        | GatewayError::PingCmdNotFound
        | GatewayError::PingFailed(_)
        | GatewayError::DnsFailed(_)
        | GatewayError::DnsNoResult
        | GatewayError::TcpFailed(_)
        | GatewayError::HttpFailed(_)
        | GatewayError::HttpStatus(_)
        | GatewayError::NoInterfaceIp(_)
        | GatewayError::DownloadFailed(_)
        | GatewayError::KeepalivedFailedToStart
        | GatewayError::RenderFailed(_)
        | GatewayError::ReloadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
