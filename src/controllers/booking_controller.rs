use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use validator::Validate;

use crate::auth;
use crate::controllers::room_controller::find_room;
use crate::error::{AppError, AppResult};
use crate::models::booking::{
    Availability, AvailabilityQuery, BOOKING_COLUMNS, BOOKING_DETAILS_SELECT, Booking,
    BookingRequest, BookingStatus, BookingStatusUpdate, BookingWithDetails, Stay,
};

async fn find_booking(pool: &MySqlPool, id: i64) -> AppResult<Option<Booking>> {
    let booking = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(booking)
}

async fn find_booking_details(pool: &MySqlPool, id: i64) -> AppResult<Option<BookingWithDetails>> {
    let booking = sqlx::query_as::<_, BookingWithDetails>(&format!(
        "{BOOKING_DETAILS_SELECT} WHERE b.id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(booking)
}

/// Stays on `room_id` that still hold their dates.
async fn active_stays(conn: &mut MySqlConnection, room_id: i64) -> AppResult<Vec<Stay>> {
    let stays = sqlx::query_as::<_, Stay>(
        "SELECT check_in_date, check_out_date FROM bookings \
         WHERE room_id = ? AND status IN ('pending', 'approved')",
    )
    .bind(room_id)
    .fetch_all(conn)
    .await?;
    Ok(stays)
}

fn conflicts(existing: &[Stay], requested: &Stay) -> bool {
    existing.iter().any(|s| s.overlaps(requested))
}

#[get("/api/bookings")]
pub async fn list_bookings(req: HttpRequest, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;

    let bookings = sqlx::query_as::<_, BookingWithDetails>(&format!(
        "{BOOKING_DETAILS_SELECT} ORDER BY b.created_at DESC, b.id DESC"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "bookings": bookings })))
}

#[get("/api/bookings/my-bookings")]
pub async fn my_bookings(req: HttpRequest, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;

    let bookings = sqlx::query_as::<_, BookingWithDetails>(&format!(
        "{BOOKING_DETAILS_SELECT} WHERE b.user_id = ? ORDER BY b.created_at DESC, b.id DESC"
    ))
    .bind(user.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "bookings": bookings })))
}

#[get("/api/bookings/availability/{room_id:\\d+}")]
pub async fn check_availability(
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    query: web::Query<AvailabilityQuery>,
) -> AppResult<HttpResponse> {
    let room_id = path.into_inner();
    let stay = Stay::new(query.check_in_date, query.check_out_date)?;

    let mut conn = pool.acquire().await?;
    let room = find_room(&mut *conn, room_id)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;
    let existing = active_stays(&mut *conn, room_id).await?;

    let availability = Availability {
        room_id,
        available: room.is_available && !conflicts(&existing, &stay),
        nights: stay.nights(),
        total_amount: stay.total_for(room.price),
    };
    Ok(HttpResponse::Ok().json(json!({ "availability": availability })))
}

#[get("/api/bookings/{id:\\d+}")]
pub async fn get_booking(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;

    let booking = find_booking_details(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;
    auth::ensure_owner_or_admin(&user, booking.user_id)?;

    Ok(HttpResponse::Ok().json(json!({ "booking": booking })))
}

#[post("/api/bookings")]
pub async fn create_booking(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    data: web::Json<BookingRequest>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    let data = data.into_inner();
    data.validate()?;
    let stay = data.stay()?;

    let mut tx = pool.begin().await?;

    // Locking the room row serialises concurrent requests for the same room.
    let room = sqlx::query_as::<_, (bool, rust_decimal::Decimal, i32)>(
        "SELECT is_available, price, capacity FROM rooms WHERE id = ? FOR UPDATE",
    )
    .bind(data.room_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((is_available, price, capacity)) = room else {
        return Err(AppError::not_found("Room not found"));
    };
    if !is_available {
        return Err(AppError::bad_request("Room is not available"));
    }
    if data.number_of_guests > capacity {
        return Err(AppError::bad_request(format!(
            "Room capacity is {capacity} guests"
        )));
    }

    let existing = active_stays(&mut *tx, data.room_id).await?;
    if conflicts(&existing, &stay) {
        log::debug!(
            "booking for room {} from {} to {} conflicts",
            data.room_id,
            stay.check_in,
            stay.check_out
        );
        return Err(AppError::bad_request(
            "Room is not available for the selected dates",
        ));
    }

    let total_amount = stay.total_for(price);
    let result = sqlx::query(
        "INSERT INTO bookings (user_id, room_id, check_in_date, check_out_date, number_of_guests, \
         total_amount, status, special_requests) VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(user.id)
    .bind(data.room_id)
    .bind(stay.check_in)
    .bind(stay.check_out)
    .bind(data.number_of_guests)
    .bind(total_amount)
    .bind(&data.special_requests)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let booking_id = result.last_insert_id() as i64;
    log::info!(
        "booking {} created by user {} for room {} ({} nights, total {})",
        booking_id,
        user.id,
        data.room_id,
        stay.nights(),
        total_amount
    );

    let booking = find_booking_details(pool.get_ref(), booking_id)
        .await?
        .ok_or_else(|| AppError::Internal("created booking vanished".into()))?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Booking request submitted successfully. Awaiting admin approval.",
        "booking": booking,
    })))
}

#[put("/api/bookings/{id:\\d+}")]
pub async fn update_booking_status(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    data: web::Json<BookingStatusUpdate>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let id = path.into_inner();
    let data = data.into_inner();

    let booking = find_booking(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;

    if !booking.status.can_transition_to(data.status) {
        return Err(AppError::bad_request(format!(
            "Cannot change a {} booking to {}",
            booking.status.as_str(),
            data.status.as_str()
        )));
    }

    // The status guard makes a concurrent transition lose instead of overwrite.
    let result = sqlx::query(
        "UPDATE bookings SET status = ?, admin_notes = COALESCE(?, admin_notes) \
         WHERE id = ? AND status = ?",
    )
    .bind(data.status)
    .bind(&data.admin_notes)
    .bind(id)
    .bind(booking.status)
    .execute(pool.get_ref())
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Booking status changed, please reload"));
    }

    log::info!(
        "booking {} {} by admin {}",
        id,
        data.status.as_str(),
        admin.id
    );

    let booking = find_booking_details(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Booking {} successfully", data.status.as_str()),
        "booking": booking,
    })))
}

#[put("/api/bookings/{id:\\d+}/cancel")]
pub async fn cancel_booking(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    let id = path.into_inner();

    let booking = find_booking(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;

    if booking.user_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to cancel this booking".into(),
        ));
    }
    if booking.status != BookingStatus::Pending {
        return Err(AppError::bad_request("Only pending bookings can be cancelled"));
    }

    let result = sqlx::query(
        "UPDATE bookings SET status = 'cancelled' WHERE id = ? AND status = 'pending'",
    )
    .bind(id)
    .execute(pool.get_ref())
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Only pending bookings can be cancelled"));
    }

    log::info!("booking {} cancelled by user {}", id, user.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Booking cancelled successfully" })))
}

#[delete("/api/bookings/{id:\\d+}")]
pub async fn delete_booking(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Booking not found"));
    }

    log::info!("booking {} deleted by admin {}", id, admin.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Booking deleted successfully" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_bookings)
        .service(my_bookings)
        .service(check_availability)
        .service(get_booking)
        .service(create_booking)
        .service(update_booking_status)
        .service(cancel_booking)
        .service(delete_booking);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::fixtures::{insert_room, insert_user};
    use crate::models::user::Role;
    use actix_web::http::{StatusCode, header};
    use actix_web::test;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::str::FromStr;

    fn stay(check_in: (i32, u32, u32), check_out: (i32, u32, u32)) -> Stay {
        Stay::new(
            NaiveDate::from_ymd_opt(check_in.0, check_in.1, check_in.2).unwrap(),
            NaiveDate::from_ymd_opt(check_out.0, check_out.1, check_out.2).unwrap(),
        )
        .unwrap()
    }

    #[core::prelude::v1::test]
    fn second_request_on_booked_dates_is_rejected() {
        let booked = vec![stay((2024, 6, 1), (2024, 6, 3))];
        assert!(conflicts(&booked, &stay((2024, 6, 2), (2024, 6, 4))));
        assert!(!conflicts(&booked, &stay((2024, 6, 10), (2024, 6, 12))));
        assert!(!conflicts(&[], &stay((2024, 6, 2), (2024, 6, 4))));
    }

    fn amount(value: &Value) -> Decimal {
        match value {
            Value::String(s) => Decimal::from_str(s).unwrap(),
            other => Decimal::from_str(&other.to_string()).unwrap(),
        }
    }

    async fn insert_booking(pool: &MySqlPool, user_id: i64, room_id: i64, status: BookingStatus) -> i64 {
        sqlx::query(
            "INSERT INTO bookings (user_id, room_id, check_in_date, check_out_date, number_of_guests, \
             total_amount, status) VALUES (?, ?, '2024-07-01', '2024-07-03', 1, 200, ?)",
        )
        .bind(user_id)
        .bind(room_id)
        .bind(status)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id() as i64
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn booking_is_priced_per_night_and_blocks_overlaps(pool: MySqlPool) {
        let (_, token) = insert_user(&pool, "guest@example.com", Role::User).await;
        let room_id = insert_room(&pool, 100).await;
        let app = test_app!(pool.clone());

        let request = |check_in: &str, check_out: &str| {
            test::TestRequest::post()
                .uri("/api/bookings")
                .insert_header((header::AUTHORIZATION, token.as_str()))
                .set_json(json!({
                    "roomId": room_id,
                    "checkInDate": check_in,
                    "checkOutDate": check_out,
                    "numberOfGuests": 2
                }))
                .to_request()
        };

        let resp = test::call_service(&app, request("2024-06-01", "2024-06-03")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(amount(&body["booking"]["totalAmount"]), Decimal::from(200));
        assert_eq!(body["booking"]["status"], "pending");

        let resp = test::call_service(&app, request("2024-06-02", "2024-06-04")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Room is not available for the selected dates");

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn only_the_owner_cancels_and_only_while_pending(pool: MySqlPool) {
        let (owner, owner_token) = insert_user(&pool, "owner@example.com", Role::User).await;
        let (_, other_token) = insert_user(&pool, "other@example.com", Role::User).await;
        let room_id = insert_room(&pool, 100).await;
        let pending = insert_booking(&pool, owner.id, room_id, BookingStatus::Pending).await;
        let approved = insert_booking(&pool, owner.id, room_id, BookingStatus::Approved).await;
        let app = test_app!(pool.clone());

        let cancel = |id: i64, token: &str| {
            test::TestRequest::put()
                .uri(&format!("/api/bookings/{id}/cancel"))
                .insert_header((header::AUTHORIZATION, token.to_string()))
                .to_request()
        };

        let resp = test::call_service(&app, cancel(pending, &other_token)).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Not authorized to cancel this booking");

        let resp = test::call_service(&app, cancel(pending, &owner_token)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(&app, cancel(pending, &owner_token)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Only pending bookings can be cancelled");

        let resp = test::call_service(&app, cancel(approved, &owner_token)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let status: BookingStatus = sqlx::query_scalar("SELECT status FROM bookings WHERE id = ?")
            .bind(approved)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, BookingStatus::Approved);
    }
}
