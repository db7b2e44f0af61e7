//! Cross-origin guard and optional HTTP Basic auth, applied to every
//! `/api` request ahead of routing.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::Engine;
use common::GatewayError;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn guard(State(state): State<AppState>, req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    check_basic_auth(&state, &req)?;
    check_cross_origin(&state, &req)?;
    Ok(next.run(req).await)
}

fn check_basic_auth(state: &AppState, req: &Request<Body>) -> Result<(), ApiError> {
    let (Some(user), Some(password)) = (
        state.settings.basic_auth_user.as_deref(),
        state.settings.basic_auth_password.as_deref(),
    ) else {
        return Ok(());
    };
    if password.is_empty() {
        return Ok(());
    }

    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let Some(encoded) = header.strip_prefix("Basic ") else {
        return Err(unauthorized());
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return Err(unauthorized());
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return Err(unauthorized());
    };
    let Some((got_user, got_password)) = text.split_once(':') else {
        return Err(unauthorized());
    };

    if got_user == user && got_password == password {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

fn unauthorized() -> ApiError {
    GatewayError::Unauthorized.into()
}

/// Reject non-GET requests whose `Origin`/`Referer` does not match the
/// request's own `Host`, unless the origin is explicitly allow-listed.
fn check_cross_origin(state: &AppState, req: &Request<Body>) -> Result<(), ApiError> {
    if req.method() == axum::http::Method::GET || req.method() == axum::http::Method::HEAD {
        return Ok(());
    }

    let host = req
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let origin = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.headers().get("referer").and_then(|v| v.to_str().ok()));

    let Some(origin) = origin else {
        // No Origin/Referer at all: treat as a same-origin tool call
        // (curl, the agent's own install hook) rather than a browser
        // cross-site request.
        return Ok(());
    };

    let origin_host = origin
        .split("://")
        .nth(1)
        .unwrap_or(origin)
        .split('/')
        .next()
        .unwrap_or(origin);

    if origin_host == host || state.settings.allowed_origins.iter().any(|o| o == origin) {
        Ok(())
    } else {
        Err(GatewayError::ForbiddenCrossOrigin.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_for_unauthorized_is_401() {
        let ApiError(status, code, _) = unauthorized();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "UNAUTHORIZED");
    }
}
