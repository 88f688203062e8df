use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::auth::jwt::{self, AdminSession};
use crate::error::AppError;
use crate::state::SharedState;

/// The logged-in admin, taken from a Bearer header or the `access_token` cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub admin_id: Uuid,
    pub email: String,
}

impl From<AdminSession> for AuthUser {
    fn from(session: AdminSession) -> Self {
        Self {
            admin_id: session.admin_id,
            email: session.email,
        }
    }
}

fn verify(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    jwt::verify(token, secret)
        .map(AuthUser::from)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth_header) = parts.headers.get("authorization") {
            let auth_str = auth_header
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return verify(token, &state.config.jwt_secret);
            }
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get("access_token") {
            return verify(cookie.value(), &state.config.jwt_secret);
        }

        Err(AppError::Unauthorized(
            "Missing authentication token".to_string(),
        ))
    }
}
