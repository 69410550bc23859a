use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, state::AppState};

/// Rejects requests whose Host header is not in `TRUSTED_HOSTS`. A `*` entry
/// disables the check.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !is_trusted_host(&state.config.trusted_hosts, host) {
        tracing::warn!(host = %host, "Rejected request for untrusted host");
        return AppError::BadRequest("Invalid host header.".to_string()).into_response();
    }
    next.run(request).await
}

fn is_trusted_host(trusted_hosts: &[String], host_header: &str) -> bool {
    if trusted_hosts.is_empty() || trusted_hosts.iter().any(|host| host == "*") {
        return true;
    }
    let host = strip_port(host_header.trim()).to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    trusted_hosts.iter().any(|trusted| {
        let trusted = trusted.trim().to_ascii_lowercase();
        match trusted.strip_prefix("*.") {
            Some(suffix) => host.ends_with(&format!(".{suffix}")),
            None => host == trusted,
        }
    })
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_once(']').map_or(host, |(address, _)| &address[1..]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}
