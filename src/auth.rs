use actix_web::{HttpRequest, http::header, web};
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

use crate::config::{AppConfig, AuthConfig};
use crate::error::{AppError, AppResult};
use crate::models::user::{Role, USER_COLUMNS, User};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

pub fn generate_jwt(user: &User, auth: &AuthConfig) -> AppResult<String> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        iat: now,
        exp: now + auth.token_ttl.as_secs() as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_jwt(token: &str, auth: &AuthConfig) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Unauthorized("Token expired.".into()),
        _ => {
            log::debug!("JWT verification failed: {e}");
            AppError::Unauthorized("Invalid token.".into())
        }
    })
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the caller from the bearer token and reloads them from the
/// database, so deactivated accounts lose access immediately.
pub async fn verify_user(req: &HttpRequest) -> AppResult<User> {
    let config = req
        .app_data::<web::Data<AppConfig>>()
        .ok_or_else(|| AppError::Internal("application config not registered".into()))?;

    let token = bearer_token(req).ok_or_else(|| {
        log::debug!("no bearer token on request to {}", req.path());
        AppError::Unauthorized("Access denied. No token provided.".into())
    })?;

    let claims = decode_jwt(token, &config.auth)?;

    let pool = req
        .app_data::<web::Data<MySqlPool>>()
        .ok_or_else(|| AppError::Internal("database pool not registered".into()))?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(claims.sub)
    .fetch_optional(pool.get_ref())
    .await?;

    match user {
        Some(user) if user.is_active => Ok(user),
        Some(user) => {
            log::warn!("rejected token for disabled account {}", user.id);
            Err(AppError::Unauthorized(
                "Invalid token or user account disabled.".into(),
            ))
        }
        None => Err(AppError::Unauthorized(
            "Invalid token or user account disabled.".into(),
        )),
    }
}

pub async fn require_admin(req: &HttpRequest) -> AppResult<User> {
    let user = verify_user(req).await?;
    if !user.is_admin() {
        log::warn!("user {} tried to reach admin route {}", user.id, req.path());
        return Err(AppError::Forbidden(
            "Access denied. Admin privileges required.".into(),
        ));
    }
    Ok(user)
}

pub fn ensure_owner_or_admin(user: &User, owner_id: i64) -> AppResult<()> {
    if user.is_admin() || user.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Access denied. You can only access your own resources.".into(),
        ))
    }
}

pub async fn hash_password(password: String) -> AppResult<String> {
    let hashed = web::block(move || bcrypt::hash(password, bcrypt::DEFAULT_COST)).await??;
    Ok(hashed)
}

pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let valid = web::block(move || bcrypt::verify(password, &hash)).await??;
    Ok(valid)
}
