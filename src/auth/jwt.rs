use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AdminUser;

/// How long an admin session stays valid after login.
pub const SESSION_MINUTES: i64 = 15;

const ISSUER: &str = "leadflow";

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: Uuid,
    email: String,
    iss: String,
    iat: i64,
    exp: i64,
}

/// A verified admin session, as carried by the access token.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub admin_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Sign a session token for an admin who just logged in.
pub fn issue(admin: &AdminUser, secret: &str) -> Result<String, String> {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: admin.id,
        email: admin.email.clone(),
        iss: ISSUER.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(SESSION_MINUTES)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("Failed to sign session token: {e}"))
}

/// Check signature, issuer and expiry. Any failure means "not logged in".
pub fn verify(token: &str, secret: &str) -> Option<AdminSession> {
    let mut validation = Validation::default();
    validation.set_issuer(&[ISSUER]);

    let claims = jsonwebtoken::decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .ok()?
    .claims;

    Some(AdminSession {
        admin_id: claims.sub,
        email: claims.email,
        expires_at: DateTime::from_timestamp(claims.exp, 0)?,
    })
}
