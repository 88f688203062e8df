use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::auth::jwt;
use crate::auth::password;
use crate::db;
use crate::error::AppError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn access_cookie(access_token: &str) -> CookieJar {
    let access = Cookie::build(("access_token", access_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(jwt::SESSION_MINUTES))
        .build();

    CookieJar::new().add(access)
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    if let Err(retry_after) = state.login_limiter.check(&req.email) {
        return Err(AppError::RateLimited(format!(
            "Too many login attempts. Try again in {} minutes.",
            retry_after.div_ceil(60).max(1)
        )));
    }

    let user = match db::admin_users::find_by_email(&state.pool, &req.email).await? {
        Some(user) => user,
        None => {
            state.login_limiter.record_failure(&req.email);
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }
    };

    let valid = password::verify(&req.password, &user.password_hash)?;

    if !valid {
        state.login_limiter.record_failure(&req.email);
        tracing::warn!("Failed login for {}", req.email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    state.login_limiter.clear(&req.email);

    let access_token = jwt::issue(&user, &state.config.jwt_secret).map_err(AppError::Internal)?;

    tracing::info!("Admin {} logged in", user.email);

    Ok((access_cookie(&access_token), Json(AuthResponse { access_token })))
}

pub async fn logout() -> (CookieJar, Json<MessageResponse>) {
    let access = Cookie::build(("access_token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();

    (
        CookieJar::new().add(access),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}
