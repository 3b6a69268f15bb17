use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, Pool};
use std::str::FromStr;

use crate::auth;
use crate::config::{AdminSeed, DatabaseConfig};
use crate::error::AppResult;
use crate::models::user::normalize_email;

/// Pins the session time zone so `CURRENT_TIMESTAMP` defaults and `NOW()`
/// are written in UTC whatever the server's `time_zone` is.
pub fn utc_session(options: MySqlConnectOptions) -> MySqlConnectOptions {
    options.timezone(Some(String::from("+00:00")))
}

pub async fn establish_connection(database: &DatabaseConfig) -> Result<Pool<MySql>, sqlx::Error> {
    let options = utc_session(MySqlConnectOptions::from_str(&database.url)?);
    let pool = MySqlPoolOptions::new()
        .max_connections(database.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| {
            log::error!("Failed to create database pool: {:?}", e);
            e
        })?;

    Ok(pool)
}

pub async fn run_migrations(pool: &Pool<MySql>) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    log::info!("database migrations applied");
    Ok(())
}

/// Creates the bootstrap admin, or promotes and reactivates the account if the
/// email is already registered. The password is reset to the configured one.
pub async fn ensure_admin(pool: &Pool<MySql>, seed: &AdminSeed) -> AppResult<()> {
    let email = normalize_email(&seed.email);
    let hashed = auth::hash_password(seed.password.clone()).await?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, password, role, is_active) VALUES (?, ?, ?, 'admin', TRUE) \
         ON DUPLICATE KEY UPDATE password = VALUES(password), role = 'admin', is_active = TRUE",
    )
    .bind(&seed.name)
    .bind(&email)
    .bind(&hashed)
    .execute(pool)
    .await?;

    // MySQL reports 1 for an insert and 2 for an update of an existing row.
    match result.rows_affected() {
        1 => log::info!("admin account {email} created"),
        _ => log::info!("admin account {email} refreshed"),
    }
    Ok(())
}
