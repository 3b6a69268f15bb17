use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, put, web};
use serde_json::json;
use sqlx::{MySql, MySqlExecutor, MySqlPool, QueryBuilder, types::Json};
use std::collections::HashMap;
use validator::Validate;

use crate::auth;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::image::{IMAGE_SELECT, ImageResponse, ImageRow};
use crate::models::review::ReviewWithUser;
use crate::models::room::{ROOM_COLUMNS, Room, RoomFilter, RoomRequest, RoomResponse, RoomType};

pub async fn find_room<'e>(executor: impl MySqlExecutor<'e>, id: i64) -> AppResult<Option<Room>> {
    let room = sqlx::query_as::<_, Room>(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(room)
}

async fn approved_ratings(pool: &MySqlPool, room_ids: &[i64]) -> AppResult<HashMap<i64, Vec<i32>>> {
    let mut by_room: HashMap<i64, Vec<i32>> = HashMap::new();
    if room_ids.is_empty() {
        return Ok(by_room);
    }

    let mut qb: QueryBuilder<MySql> =
        QueryBuilder::new("SELECT room_id, rating FROM reviews WHERE status = 'approved' AND room_id IN (");
    let mut ids = qb.separated(", ");
    for id in room_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");

    let rows = qb.build_query_as::<(i64, i32)>().fetch_all(pool).await?;
    for (room_id, rating) in rows {
        by_room.entry(room_id).or_default().push(rating);
    }
    Ok(by_room)
}

async fn room_images(
    pool: &MySqlPool,
    room_ids: &[i64],
    featured_only: bool,
    base_url: &str,
) -> AppResult<HashMap<i64, Vec<ImageResponse>>> {
    let mut by_room: HashMap<i64, Vec<ImageResponse>> = HashMap::new();
    if room_ids.is_empty() {
        return Ok(by_room);
    }

    let mut qb: QueryBuilder<MySql> = QueryBuilder::new(IMAGE_SELECT);
    qb.push(" WHERE i.room_id IN (");
    let mut ids = qb.separated(", ");
    for id in room_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");
    if featured_only {
        qb.push(" AND i.is_featured = TRUE");
    }
    qb.push(" ORDER BY i.is_featured DESC, i.created_at DESC");

    let rows = qb.build_query_as::<ImageRow>().fetch_all(pool).await?;
    for row in rows {
        if let Some(room_id) = row.room_id {
            by_room
                .entry(room_id)
                .or_default()
                .push(ImageResponse::from_row(row, base_url));
        }
    }
    Ok(by_room)
}

#[get("/api/rooms")]
pub async fn list_rooms(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    query: web::Query<RoomFilter>,
) -> AppResult<HttpResponse> {
    let mut qb: QueryBuilder<MySql> =
        QueryBuilder::new(format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE 1 = 1"));

    if let Some(room_type) = query.room_type {
        qb.push(" AND type = ").push_bind(room_type);
    }
    if let Some(min) = query.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
    if query.available == Some(true) {
        qb.push(" AND is_available = TRUE");
    }
    qb.push(" ORDER BY featured DESC, created_at DESC, id DESC");

    let rooms = qb.build_query_as::<Room>().fetch_all(pool.get_ref()).await?;
    let ids: Vec<i64> = rooms.iter().map(|r| r.id).collect();

    let mut ratings = approved_ratings(pool.get_ref(), &ids).await?;
    let mut images = room_images(pool.get_ref(), &ids, true, &config.base_url).await?;

    let rooms: Vec<RoomResponse> = rooms
        .into_iter()
        .map(|room| {
            let room_ratings = ratings.remove(&room.id).unwrap_or_default();
            let room_images = images.remove(&room.id).unwrap_or_default();
            RoomResponse::new(room, &room_ratings, room_images)
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "rooms": rooms })))
}

#[get("/api/rooms/types/list")]
pub async fn list_room_types(pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let types: Vec<RoomType> = sqlx::query_scalar("SELECT DISTINCT type FROM rooms ORDER BY type")
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "types": types })))
}

#[get("/api/rooms/{id:\\d+}")]
pub async fn get_room(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let room = find_room(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;

    let images = room_images(pool.get_ref(), &[id], false, &config.base_url)
        .await?
        .remove(&id)
        .unwrap_or_default();

    let reviews = sqlx::query_as::<_, ReviewWithUser>(
        "SELECT rv.id, rv.user_id, u.name AS user_name, rv.room_id, rv.rating, rv.comment, rv.created_at \
         FROM reviews rv JOIN users u ON u.id = rv.user_id \
         WHERE rv.room_id = ? AND rv.status = 'approved' \
         ORDER BY rv.created_at DESC",
    )
    .bind(id)
    .fetch_all(pool.get_ref())
    .await?;

    let ratings: Vec<i32> = reviews.iter().map(|r| r.rating).collect();
    let mut room = RoomResponse::new(room, &ratings, images);
    room.reviews = Some(reviews);

    Ok(HttpResponse::Ok().json(json!({ "room": room })))
}

#[post("/api/rooms")]
pub async fn create_room(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    data: web::Json<RoomRequest>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let data = data.into_inner().normalized();
    data.validate()?;

    let result = sqlx::query(
        "INSERT INTO rooms (name, description, type, price, capacity, size, amenities, \
         is_available, booking_com_id, featured, discount) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&data.name)
    .bind(&data.description)
    .bind(data.room_type)
    .bind(data.price)
    .bind(data.capacity)
    .bind(data.size)
    .bind(Json(data.amenities.clone().unwrap_or_default()))
    .bind(data.is_available.unwrap_or(true))
    .bind(&data.booking_com_id)
    .bind(data.featured.unwrap_or(false))
    .bind(data.discount.unwrap_or_default())
    .execute(pool.get_ref())
    .await?;

    let room = find_room(pool.get_ref(), result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| AppError::Internal("created room vanished".into()))?;

    log::info!("admin {} created room {} ({})", admin.id, room.id, room.name);
    Ok(HttpResponse::Created().json(json!({
        "message": "Room created successfully",
        "room": room,
    })))
}

#[put("/api/rooms/{id:\\d+}")]
pub async fn update_room(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    data: web::Json<RoomRequest>,
) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;
    let id = path.into_inner();
    let data = data.into_inner().normalized();
    data.validate()?;

    if find_room(pool.get_ref(), id).await?.is_none() {
        return Err(AppError::not_found("Room not found"));
    }

    sqlx::query(
        "UPDATE rooms SET name = ?, description = ?, type = ?, price = ?, capacity = ?, size = ?, \
         amenities = COALESCE(?, amenities), is_available = COALESCE(?, is_available), \
         booking_com_id = ?, featured = COALESCE(?, featured), discount = COALESCE(?, discount) \
         WHERE id = ?",
    )
    .bind(&data.name)
    .bind(&data.description)
    .bind(data.room_type)
    .bind(data.price)
    .bind(data.capacity)
    .bind(data.size)
    .bind(data.amenities.clone().map(Json))
    .bind(data.is_available)
    .bind(&data.booking_com_id)
    .bind(data.featured)
    .bind(data.discount)
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    let room = find_room(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Room updated successfully",
        "room": room,
    })))
}

#[delete("/api/rooms/{id:\\d+}")]
pub async fn delete_room(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Room not found"));
    }

    log::info!("admin {} deleted room {}", admin.id, id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Room deleted successfully" })))
}

#[patch("/api/rooms/{id:\\d+}/availability")]
pub async fn toggle_availability(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;
    let id = path.into_inner();

    let result = sqlx::query("UPDATE rooms SET is_available = NOT is_available WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Room not found"));
    }

    let room = find_room(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;

    let message = if room.is_available {
        "Room made available"
    } else {
        "Room made unavailable"
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message, "room": room })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_rooms)
        .service(list_room_types)
        .service(get_room)
        .service(create_room)
        .service(update_room)
        .service(delete_room)
        .service(toggle_availability);
}
