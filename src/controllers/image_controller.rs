use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, put, web};
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use validator::Validate;

use crate::auth;
use crate::config::AppConfig;
use crate::controllers::room_controller::find_room;
use crate::error::{AppError, AppResult};
use crate::models::image::{
    IMAGE_SELECT, ImageCategory, ImageFilter, ImageResponse, ImageRow, ImageUpdateRequest,
    PageQuery, Pagination,
};
use crate::utils::{self, StoredFile, UploadForm};

/// Text fields that accompany an upload.
#[derive(Debug)]
struct UploadMeta {
    category: ImageCategory,
    room_id: Option<i64>,
    alt_text: Option<String>,
    is_featured: bool,
}

impl UploadMeta {
    fn from_form(form: &UploadForm) -> AppResult<Self> {
        let category = match form.field("category") {
            Some(c) => c.parse().map_err(AppError::BadRequest)?,
            None => ImageCategory::default(),
        };
        let room_id = form
            .field("roomId")
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| AppError::bad_request("Room ID must be a valid integer"))
            })
            .transpose()?;
        let alt_text = form.field("altText").map(str::to_string);
        if alt_text.as_ref().is_some_and(|a| a.chars().count() > 255) {
            return Err(AppError::bad_request(
                "Alt text must be less than 255 characters",
            ));
        }

        Ok(Self {
            category,
            room_id,
            alt_text,
            is_featured: form.field("isFeatured") == Some("true"),
        })
    }
}

async fn find_image(pool: &MySqlPool, id: i64, base_url: &str) -> AppResult<Option<ImageResponse>> {
    let row = sqlx::query_as::<_, ImageRow>(&format!("{IMAGE_SELECT} WHERE i.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| ImageResponse::from_row(r, base_url)))
}

async fn ensure_room_exists(pool: &MySqlPool, room_id: Option<i64>) -> AppResult<()> {
    if let Some(room_id) = room_id {
        if find_room(pool, room_id).await?.is_none() {
            return Err(AppError::bad_request("Room not found"));
        }
    }
    Ok(())
}

async fn insert_image(
    pool: &MySqlPool,
    file: &StoredFile,
    meta: &UploadMeta,
    has_thumbnail: bool,
    base_url: &str,
) -> AppResult<i64> {
    let result = sqlx::query(
        "INSERT INTO images (filename, original_name, path, url, has_thumbnail, size, mime_type, \
         category, is_featured, alt_text, room_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&file.filename)
    .bind(&file.original_name)
    .bind(file.public_path())
    .bind(file.url(base_url))
    .bind(has_thumbnail)
    .bind(file.size)
    .bind(&file.mime_type)
    .bind(meta.category)
    .bind(meta.is_featured)
    .bind(&meta.alt_text)
    .bind(meta.room_id)
    .execute(pool)
    .await?;
    Ok(result.last_insert_id() as i64)
}

/// Validates the accompanying fields, writes thumbnails and records every file.
async fn store_uploads(
    pool: &MySqlPool,
    config: &AppConfig,
    form: &UploadForm,
) -> AppResult<Vec<ImageResponse>> {
    let meta = UploadMeta::from_form(form)?;
    ensure_room_exists(pool, meta.room_id).await?;

    let mut ids = Vec::with_capacity(form.files.len());
    for file in &form.files {
        let has_thumbnail = utils::generate_thumbnail(&config.upload, &file.filename).await;
        ids.push(insert_image(pool, file, &meta, has_thumbnail, &config.base_url).await?);
    }

    let mut images = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(image) = find_image(pool, id, &config.base_url).await? {
            images.push(image);
        }
    }
    Ok(images)
}

async fn handle_upload(
    pool: &MySqlPool,
    config: &AppConfig,
    payload: Multipart,
    field: &str,
    max_files: usize,
) -> AppResult<Vec<ImageResponse>> {
    let form = utils::read_upload_form(payload, field, max_files, &config.upload).await?;
    if form.files.is_empty() {
        return Err(AppError::bad_request(if max_files == 1 {
            "No image file provided"
        } else {
            "No image files provided"
        }));
    }

    match store_uploads(pool, config, &form).await {
        Ok(images) => Ok(images),
        Err(e) => {
            utils::discard(&config.upload, &form.files).await;
            Err(e)
        }
    }
}

#[get("/api/images")]
pub async fn list_images(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    query: web::Query<ImageFilter>,
) -> AppResult<HttpResponse> {
    let paging = Pagination::new(query.page, query.limit, 20);

    let mut count: QueryBuilder<MySql> = QueryBuilder::new("SELECT COUNT(*) FROM images i WHERE 1 = 1");
    let mut select: QueryBuilder<MySql> = QueryBuilder::new(IMAGE_SELECT);
    select.push(" WHERE 1 = 1");

    for qb in [&mut count, &mut select] {
        if let Some(category) = query.category {
            qb.push(" AND i.category = ").push_bind(category);
        }
        if let Some(room_id) = query.room_id {
            qb.push(" AND i.room_id = ").push_bind(room_id);
        }
        if query.featured == Some(true) {
            qb.push(" AND i.is_featured = TRUE");
        }
    }

    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool.get_ref())
        .await?;

    select
        .push(" ORDER BY i.is_featured DESC, i.created_at DESC, i.id DESC LIMIT ")
        .push_bind(paging.limit)
        .push(" OFFSET ")
        .push_bind(paging.offset());
    let rows = select.build_query_as::<ImageRow>().fetch_all(pool.get_ref()).await?;

    let images: Vec<ImageResponse> = rows
        .into_iter()
        .map(|r| ImageResponse::from_row(r, &config.base_url))
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "images": images,
        "total": total,
        "pages": paging.pages(total),
        "currentPage": paging.page,
    })))
}

#[get("/api/images/gallery/list")]
pub async fn gallery_images(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    query: web::Query<PageQuery>,
) -> AppResult<HttpResponse> {
    let paging = Pagination::new(query.page, query.limit, 12);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE category = 'gallery'")
        .fetch_one(pool.get_ref())
        .await?;

    let rows = sqlx::query_as::<_, ImageRow>(&format!(
        "{IMAGE_SELECT} WHERE i.category = 'gallery' \
         ORDER BY i.is_featured DESC, i.created_at DESC, i.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(paging.limit)
    .bind(paging.offset())
    .fetch_all(pool.get_ref())
    .await?;

    let images: Vec<ImageResponse> = rows
        .into_iter()
        .map(|r| ImageResponse::from_row(r, &config.base_url))
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "images": images,
        "total": total,
        "pages": paging.pages(total),
        "currentPage": paging.page,
    })))
}

#[get("/api/images/room/{room_id:\\d+}")]
pub async fn room_images(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    path: web::Path<i64>,
    query: web::Query<PageQuery>,
) -> AppResult<HttpResponse> {
    let paging = Pagination::new(None, query.limit, 10);

    let rows = sqlx::query_as::<_, ImageRow>(&format!(
        "{IMAGE_SELECT} WHERE i.room_id = ? ORDER BY i.is_featured DESC, i.created_at DESC, i.id DESC LIMIT ?"
    ))
    .bind(path.into_inner())
    .bind(paging.limit)
    .fetch_all(pool.get_ref())
    .await?;

    let images: Vec<ImageResponse> = rows
        .into_iter()
        .map(|r| ImageResponse::from_row(r, &config.base_url))
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "images": images })))
}

#[get("/api/images/{id:\\d+}")]
pub async fn get_image(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let image = find_image(pool.get_ref(), path.into_inner(), &config.base_url)
        .await?
        .ok_or_else(|| AppError::not_found("Image not found"))?;

    Ok(HttpResponse::Ok().json(json!({ "image": image })))
}

#[post("/api/images/upload")]
pub async fn upload_image(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;

    let mut images = handle_upload(pool.get_ref(), &config, payload, "image", 1).await?;
    let image = images
        .pop()
        .ok_or_else(|| AppError::Internal("uploaded image vanished".into()))?;

    log::info!("admin {} uploaded image {} ({})", admin.id, image.id, image.filename);
    Ok(HttpResponse::Created().json(json!({
        "message": "Image uploaded successfully",
        "image": image,
    })))
}

#[post("/api/images/upload-multiple")]
pub async fn upload_images(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;

    let images = handle_upload(
        pool.get_ref(),
        &config,
        payload,
        "images",
        config.upload.max_files,
    )
    .await?;

    log::info!("admin {} uploaded {} images", admin.id, images.len());
    Ok(HttpResponse::Created().json(json!({
        "message": format!("{} images uploaded successfully", images.len()),
        "images": images,
    })))
}

#[put("/api/images/{id:\\d+}")]
pub async fn update_image(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    path: web::Path<i64>,
    data: web::Json<ImageUpdateRequest>,
) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;
    let id = path.into_inner();
    let data = data.into_inner();
    data.validate()?;

    if find_image(pool.get_ref(), id, &config.base_url).await?.is_none() {
        return Err(AppError::not_found("Image not found"));
    }
    ensure_room_exists(pool.get_ref(), data.room_id).await?;

    let alt_text = data
        .alt_text
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    sqlx::query(
        "UPDATE images SET category = COALESCE(?, category), room_id = ?, \
         alt_text = COALESCE(?, alt_text), \
         is_featured = COALESCE(?, is_featured) WHERE id = ?",
    )
    .bind(data.category)
    .bind(data.room_id)
    .bind(alt_text)
    .bind(data.is_featured)
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    let image = find_image(pool.get_ref(), id, &config.base_url)
        .await?
        .ok_or_else(|| AppError::not_found("Image not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Image updated successfully",
        "image": image,
    })))
}

#[delete("/api/images/{id:\\d+}")]
pub async fn delete_image(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let id = path.into_inner();

    let image = find_image(pool.get_ref(), id, &config.base_url)
        .await?
        .ok_or_else(|| AppError::not_found("Image not found"))?;

    sqlx::query("DELETE FROM images WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    let file_deleted = utils::remove_upload(&config.upload, &image.filename).await;

    log::info!("admin {} deleted image {} ({})", admin.id, id, image.filename);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Image deleted successfully",
        "fileDeleted": file_deleted,
    })))
}

#[patch("/api/images/{id:\\d+}/featured")]
pub async fn toggle_featured(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;
    let id = path.into_inner();

    let result = sqlx::query("UPDATE images SET is_featured = NOT is_featured WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Image not found"));
    }

    let image = find_image(pool.get_ref(), id, &config.base_url)
        .await?
        .ok_or_else(|| AppError::not_found("Image not found"))?;

    let message = if image.is_featured {
        "Image marked as featured"
    } else {
        "Image unmarked as featured"
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message, "image": image })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_images)
        .service(gallery_images)
        .service(room_images)
        .service(get_image)
        .service(upload_image)
        .service(upload_images)
        .service(update_image)
        .service(delete_image)
        .service(toggle_featured);
}
