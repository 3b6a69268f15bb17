use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, put, web};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use validator::Validate;

use crate::auth;
use crate::error::{AppError, AppResult, is_unique_violation};
use crate::models::content::{CONTENT_COLUMNS, Content, ContentRequest, Page, section_taken};

const DUPLICATE_SECTION: &str = "Content already exists for this page and section";

async fn find_content(pool: &MySqlPool, id: i64) -> AppResult<Option<Content>> {
    let content = sqlx::query_as::<_, Content>(&format!(
        "SELECT {CONTENT_COLUMNS} FROM contents WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(content)
}

/// Id of the row currently holding (page, section), locked until commit.
async fn section_owner(conn: &mut MySqlConnection, page: Page, section: &str) -> AppResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM contents WHERE page = ? AND section = ? FOR UPDATE")
        .bind(page)
        .bind(section)
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

fn map_duplicate(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::bad_request(DUPLICATE_SECTION)
    } else {
        AppError::from(e)
    }
}

#[get("/api/content")]
pub async fn list_content(req: HttpRequest, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;

    let contents = sqlx::query_as::<_, Content>(&format!(
        "SELECT {CONTENT_COLUMNS} FROM contents ORDER BY page ASC, sort_order ASC, id ASC"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "contents": contents })))
}

#[get("/api/content/page/{page}")]
pub async fn page_content(pool: web::Data<MySqlPool>, path: web::Path<Page>) -> AppResult<HttpResponse> {
    let contents = sqlx::query_as::<_, Content>(&format!(
        "SELECT {CONTENT_COLUMNS} FROM contents WHERE page = ? AND is_published = TRUE \
         ORDER BY sort_order ASC, id ASC"
    ))
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "contents": contents })))
}

#[post("/api/content")]
pub async fn create_content(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    data: web::Json<ContentRequest>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let data = data.into_inner().normalized()?;
    data.validate()?;

    let mut tx = pool.begin().await?;
    if section_taken(section_owner(&mut *tx, data.page, &data.section).await?, None) {
        return Err(AppError::bad_request(DUPLICATE_SECTION));
    }

    let result = sqlx::query(
        "INSERT INTO contents (page, section, title, content, type, is_published, sort_order) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(data.page)
    .bind(&data.section)
    .bind(&data.title)
    .bind(&data.content)
    .bind(data.content_type)
    .bind(data.is_published.unwrap_or(true))
    .bind(data.order.unwrap_or(0))
    .execute(&mut *tx)
    .await
    .map_err(map_duplicate)?;
    tx.commit().await?;

    let content = find_content(pool.get_ref(), result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| AppError::Internal("created content vanished".into()))?;

    log::info!("admin {} created content {} ({:?}/{})", admin.id, content.id, content.page, content.section);
    Ok(HttpResponse::Created().json(json!({
        "message": "Content created successfully",
        "content": content,
    })))
}

#[put("/api/content/{id:\\d+}")]
pub async fn update_content(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    data: web::Json<ContentRequest>,
) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;
    let id = path.into_inner();
    let data = data.into_inner().normalized()?;
    data.validate()?;

    if find_content(pool.get_ref(), id).await?.is_none() {
        return Err(AppError::not_found("Content not found"));
    }

    let mut tx = pool.begin().await?;
    if section_taken(section_owner(&mut *tx, data.page, &data.section).await?, Some(id)) {
        return Err(AppError::bad_request(DUPLICATE_SECTION));
    }

    sqlx::query(
        "UPDATE contents SET page = ?, section = ?, title = ?, content = ?, type = ?, \
         is_published = COALESCE(?, is_published), sort_order = COALESCE(?, sort_order) \
         WHERE id = ?",
    )
    .bind(data.page)
    .bind(&data.section)
    .bind(&data.title)
    .bind(&data.content)
    .bind(data.content_type)
    .bind(data.is_published)
    .bind(data.order)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(map_duplicate)?;
    tx.commit().await?;

    let content = find_content(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Content not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Content updated successfully",
        "content": content,
    })))
}

#[delete("/api/content/{id:\\d+}")]
pub async fn delete_content(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;

    let result = sqlx::query("DELETE FROM contents WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Content not found"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Content deleted successfully" })))
}

#[patch("/api/content/{id:\\d+}/toggle")]
pub async fn toggle_content(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;
    let id = path.into_inner();

    let result = sqlx::query("UPDATE contents SET is_published = NOT is_published WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Content not found"));
    }

    let content = find_content(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Content not found"))?;

    let message = if content.is_published {
        "Content published successfully"
    } else {
        "Content unpublished successfully"
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message, "content": content })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_content)
        .service(page_content)
        .service(create_content)
        .service(update_content)
        .service(delete_content)
        .service(toggle_content);
}
