//auth_controller.rs
use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use serde_json::json;
use sqlx::MySqlPool;
use validator::Validate;

use crate::auth;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult, is_unique_violation};
use crate::models::user::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest, USER_COLUMNS,
    User, normalize_email,
};

async fn find_user(pool: &MySqlPool, id: i64) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

#[post("/api/auth/register")]
pub async fn register(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    data: web::Json<RegisterRequest>,
) -> AppResult<HttpResponse> {
    let data = data.into_inner().normalized();
    data.validate()?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&data.email)
        .fetch_optional(pool.get_ref())
        .await?;
    if existing.is_some() {
        return Err(AppError::bad_request("User with this email already exists"));
    }

    let hashed = auth::hash_password(data.password).await?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, password, phone, address, role, is_active) \
         VALUES (?, ?, ?, ?, ?, 'user', TRUE)",
    )
    .bind(&data.name)
    .bind(&data.email)
    .bind(&hashed)
    .bind(&data.phone)
    .bind(&data.address)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::bad_request("User with this email already exists")
        } else {
            AppError::from(e)
        }
    })?;

    let user = find_user(pool.get_ref(), result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| AppError::Internal("registered user vanished".into()))?;
    let token = auth::generate_jwt(&user, &config.auth)?;

    log::info!("user {} registered", user.id);
    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "user": user,
        "token": token,
    })))
}

#[post("/api/auth/login")]
pub async fn login(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    data: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    let mut data = data.into_inner();
    data.email = normalize_email(&data.email);
    data.validate()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
    ))
    .bind(&data.email)
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(user) = user else {
        log::debug!("login for unknown email {}", data.email);
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    };

    if !user.is_active {
        log::warn!("login attempt on disabled account {}", user.id);
        return Err(AppError::Unauthorized(
            "Account is disabled. Please contact support.".into(),
        ));
    }

    if !auth::verify_password(data.password, user.password.clone()).await? {
        log::warn!("wrong password for user {}", user.id);
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    sqlx::query("UPDATE users SET last_login = UTC_TIMESTAMP() WHERE id = ?")
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    let user = find_user(pool.get_ref(), user.id).await?.unwrap_or(user);
    let token = auth::generate_jwt(&user, &config.auth)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "user": user,
        "token": token,
    })))
}

#[get("/api/auth/profile")]
pub async fn get_profile(req: HttpRequest) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

#[put("/api/auth/profile")]
pub async fn update_profile(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    data: web::Json<UpdateProfileRequest>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    let data = data.into_inner().normalized();
    data.validate()?;

    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), phone = COALESCE(?, phone), \
         address = COALESCE(?, address) WHERE id = ?",
    )
    .bind(&data.name)
    .bind(&data.phone)
    .bind(&data.address)
    .bind(user.id)
    .execute(pool.get_ref())
    .await?;

    let user = find_user(pool.get_ref(), user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Profile updated successfully",
        "user": user,
    })))
}

#[put("/api/auth/change-password")]
pub async fn change_password(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    data: web::Json<ChangePasswordRequest>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    let data = data.into_inner();
    data.validate()?;

    if !auth::verify_password(data.current_password, user.password.clone()).await? {
        return Err(AppError::bad_request("Current password is incorrect"));
    }

    let hashed = auth::hash_password(data.new_password).await?;
    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(&hashed)
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    log::info!("user {} changed their password", user.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed successfully" })))
}

#[delete("/api/auth/delete")]
pub async fn delete_account(req: HttpRequest, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = ?")
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    log::info!("user {} deactivated their account", user.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Account deleted successfully" })))
}

#[get("/api/auth/users")]
pub async fn list_users(req: HttpRequest, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "users": users })))
}

#[delete("/api/auth/users/{id}")]
pub async fn delete_user(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let id = path.into_inner();

    let target = find_user(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if target.id == admin.id {
        return Err(AppError::bad_request("Cannot delete your own account"));
    }

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = ?")
        .bind(target.id)
        .execute(pool.get_ref())
        .await?;

    log::info!("admin {} deactivated user {}", admin.id, target.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted successfully" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(get_profile)
        .service(update_profile)
        .service(change_password)
        .service(delete_account)
        .service(list_users)
        .service(delete_user);
}
