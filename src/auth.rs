use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    repository::table_service::find_row,
    state::AppState,
};

#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Resolves the caller and checks that they may administer properties.
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> AppResult<AdminUser> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_str(headers, "x-user-id") {
            tracing::debug!(user_id = %user_id, "Using dev auth override");
            return Ok(AdminUser {
                user_id,
                email: None,
            });
        }
    }

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token.".to_string()))?;
    let user = match state.config.auth_jwt_secret.as_deref() {
        Some(secret) => verify_local_token(&token, secret)?,
        None => fetch_remote_user(state, &token).await?,
    };

    if let Some(email) = user.email.as_deref() {
        if state.config.is_admin_email(email) {
            return Ok(user);
        }
    }
    if is_admin_row(state, &user.user_id).await? {
        return Ok(user);
    }
    Err(AppError::Forbidden(
        "This account cannot manage properties.".to_string(),
    ))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_str(headers, "authorization")?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim().to_string()).filter(|token| !token.is_empty())
}

fn verify_local_token(token: &str, secret: &str) -> AppResult<AdminUser> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|error| {
        tracing::debug!(error = %error, "Rejected bearer token");
        AppError::Unauthorized("Invalid or expired token.".to_string())
    })?;
    Ok(AdminUser {
        user_id: data.claims.sub,
        email: data.claims.email,
    })
}

async fn fetch_remote_user(state: &AppState, token: &str) -> AppResult<AdminUser> {
    let base = state.config.auth_url.as_deref().ok_or_else(|| {
        AppError::Dependency(
            "Authentication is not configured. Set AUTH_JWT_SECRET or AUTH_URL.".to_string(),
        )
    })?;
    let endpoint = url::Url::parse(base)
        .and_then(|base| base.join("auth/v1/user"))
        .map_err(|_| AppError::Internal("AUTH_URL is not a valid URL.".to_string()))?;

    let mut request = state.http_client.get(endpoint).bearer_auth(token);
    if let Some(service_key) = state.config.auth_service_key.as_deref() {
        request = request.header("apikey", service_key);
    }
    let response = request.send().await.map_err(|error| {
        tracing::error!(error = %error, "Identity service request failed");
        AppError::Dependency("Identity service is unavailable.".to_string())
    })?;
    if !response.status().is_success() {
        return Err(AppError::Unauthorized(
            "Invalid or expired token.".to_string(),
        ));
    }
    let body = response.json::<Value>().await.map_err(|error| {
        tracing::error!(error = %error, "Identity service returned malformed JSON");
        AppError::Dependency("Identity service is unavailable.".to_string())
    })?;
    user_from_identity(&body)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token.".to_string()))
}

fn user_from_identity(body: &Value) -> Option<AdminUser> {
    let user_id = body
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())?;
    let email = body
        .get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(ToOwned::to_owned);
    Some(AdminUser {
        user_id: user_id.to_string(),
        email,
    })
}

async fn is_admin_row(state: &AppState, user_id: &str) -> AppResult<bool> {
    let Some(pool) = state.db_pool.as_ref() else {
        return Ok(false);
    };
    if uuid::Uuid::try_parse(user_id).is_err() {
        return Ok(false);
    }
    Ok(find_row(pool, "admin_users", "user_id", user_id)
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::{bearer_token, user_from_identity, verify_local_token};
    use axum::http::{HeaderMap, HeaderValue};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    #[test]
    fn extracts_bearer_tokens() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn verifies_hs256_tokens() {
        let claims = json!({
            "sub": "550e8400-e29b-41d4-a716-446655440000",
            "email": "owner@example.com",
            "aud": "authenticated",
            "exp": 4_102_444_800_u64
        });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .expect("token encodes");

        let user = verify_local_token(&token, "secret").expect("valid token");
        assert_eq!(user.email.as_deref(), Some("owner@example.com"));
        assert!(verify_local_token(&token, "other").is_err());
    }

    #[test]
    fn reads_identity_service_users() {
        let user = user_from_identity(&json!({ "id": "u1", "email": " a@b.c " }))
            .expect("user present");
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.email.as_deref(), Some("a@b.c"));
        assert!(user_from_identity(&json!({ "email": "a@b.c" })).is_none());
    }
}
