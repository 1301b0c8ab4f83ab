//! Admin-sensitive route guard (§6: "Admin-sensitive routes require a
//! bearer-token or Basic credential; optional IP allowlist is AND-composed").
//!
//! Grounded on the original server's `_require_admin`: an `x-admin-token`
//! header checked first, then an optional Basic credential, then an IP
//! allowlist; if no credential is configured at all, the route is open.

use crate::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Rejects requests to admin-sensitive routes that fail the configured
/// token/Basic check and IP allowlist (§6, §7 `Forbidden`).
///
/// `GET` requests are exempt unless `security.protect_get` is set, mirroring
/// the original's read-only pages being left open by default.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    let security = &state.config.security;
    if req.method() == axum::http::Method::GET && !security.protect_get {
        return next.run(req).await;
    }

    if !security.ip_allowlist.is_empty() && !security.ip_allowlist.iter().any(|ip| ip == &addr.ip().to_string()) {
        return forbidden("client ip not allowlisted");
    }

    if let Some(token) = &security.admin_token {
        if headers.get("x-admin-token").and_then(|v| v.to_str().ok()) == Some(token.as_str()) {
            return next.run(req).await;
        }
    }

    if let Some(credential) = &security.basic_auth {
        if let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            if let Some(encoded) = value.strip_prefix("Basic ") {
                if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) {
                    if let Ok(raw) = String::from_utf8(decoded) {
                        if let Some((user, pass)) = raw.split_once(':') {
                            if user == credential.username && pass == credential.password {
                                return next.run(req).await;
                            }
                        }
                    }
                }
            }
        }
    }

    let credential_configured = security.admin_token.is_some() || security.basic_auth.is_some();
    if !credential_configured {
        return next.run(req).await;
    }

    forbidden("missing or invalid admin credential")
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, axum::Json(json!({"ok": false, "error": {"code": "FORBIDDEN", "message": message}}))).into_response()
}
