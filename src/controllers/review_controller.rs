use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use serde_json::json;
use sqlx::MySqlPool;
use validator::Validate;

use crate::auth;
use crate::controllers::room_controller::find_room;
use crate::error::{AppError, AppResult, is_unique_violation};
use crate::models::review::{
    REVIEW_COLUMNS, RatingStats, Review, ReviewRequest, ReviewStatus, ReviewStatusUpdate,
    ReviewUpdate, ReviewWithDetails, ReviewWithUser,
};

const DETAILS_SELECT: &str = "SELECT rv.id, rv.user_id, u.name AS user_name, u.email AS user_email, \
     rv.room_id, r.name AS room_name, rv.rating, rv.comment, rv.status, rv.admin_notes, \
     rv.created_at, rv.updated_at \
     FROM reviews rv JOIN users u ON u.id = rv.user_id JOIN rooms r ON r.id = rv.room_id";

async fn find_review(pool: &MySqlPool, id: i64) -> AppResult<Option<Review>> {
    let review = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(review)
}

#[get("/api/reviews")]
pub async fn list_reviews(req: HttpRequest, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth::require_admin(&req).await?;

    let reviews = sqlx::query_as::<_, ReviewWithDetails>(&format!(
        "{DETAILS_SELECT} ORDER BY rv.created_at DESC, rv.id DESC"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "reviews": reviews })))
}

#[get("/api/reviews/my-reviews")]
pub async fn my_reviews(req: HttpRequest, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;

    let reviews = sqlx::query_as::<_, ReviewWithDetails>(&format!(
        "{DETAILS_SELECT} WHERE rv.user_id = ? ORDER BY rv.created_at DESC, rv.id DESC"
    ))
    .bind(user.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "reviews": reviews })))
}

#[get("/api/reviews/room/{room_id:\\d+}")]
pub async fn room_reviews(pool: web::Data<MySqlPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let reviews = sqlx::query_as::<_, ReviewWithUser>(
        "SELECT rv.id, rv.user_id, u.name AS user_name, rv.room_id, rv.rating, rv.comment, rv.created_at \
         FROM reviews rv JOIN users u ON u.id = rv.user_id \
         WHERE rv.room_id = ? AND rv.status = 'approved' \
         ORDER BY rv.created_at DESC",
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "reviews": reviews })))
}

#[get("/api/reviews/room/{room_id:\\d+}/stats")]
pub async fn room_review_stats(
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let ratings: Vec<i32> = sqlx::query_scalar(
        "SELECT rating FROM reviews WHERE room_id = ? AND status = 'approved'",
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "stats": RatingStats::from_ratings(&ratings) })))
}

#[post("/api/reviews")]
pub async fn create_review(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    data: web::Json<ReviewRequest>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    let data = data.into_inner().normalized();
    data.validate()?;

    if find_room(pool.get_ref(), data.room_id).await?.is_none() {
        return Err(AppError::not_found("Room not found"));
    }

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM reviews WHERE user_id = ? AND room_id = ?")
            .bind(user.id)
            .bind(data.room_id)
            .fetch_optional(pool.get_ref())
            .await?;
    if existing.is_some() {
        return Err(AppError::bad_request("You have already reviewed this room"));
    }

    // The unique (user_id, room_id) index catches a concurrent duplicate.
    let result = sqlx::query(
        "INSERT INTO reviews (user_id, room_id, rating, comment, status) VALUES (?, ?, ?, ?, 'pending')",
    )
    .bind(user.id)
    .bind(data.room_id)
    .bind(data.rating)
    .bind(&data.comment)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::bad_request("You have already reviewed this room")
        } else {
            AppError::from(e)
        }
    })?;

    let review = find_review(pool.get_ref(), result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| AppError::Internal("created review vanished".into()))?;

    log::info!("review {} submitted by user {} for room {}", review.id, user.id, review.room_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "Review submitted successfully. Awaiting admin approval.",
        "review": review,
    })))
}

#[put("/api/reviews/{id:\\d+}")]
pub async fn update_review(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    data: web::Json<ReviewUpdate>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    let id = path.into_inner();
    let data = data.into_inner().normalized();
    data.validate()?;

    let review = find_review(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;

    if review.user_id != user.id {
        return Err(AppError::Forbidden("Not authorized to update this review".into()));
    }
    if review.status != ReviewStatus::Pending {
        return Err(AppError::bad_request("Only pending reviews can be updated"));
    }

    let result = sqlx::query(
        "UPDATE reviews SET rating = ?, comment = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(data.rating)
    .bind(&data.comment)
    .bind(id)
    .execute(pool.get_ref())
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Only pending reviews can be updated"));
    }

    let review = find_review(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Review updated successfully",
        "review": review,
    })))
}

#[put("/api/reviews/{id:\\d+}/status")]
pub async fn moderate_review(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    data: web::Json<ReviewStatusUpdate>,
) -> AppResult<HttpResponse> {
    let admin = auth::require_admin(&req).await?;
    let id = path.into_inner();
    let data = data.into_inner();

    let review = find_review(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;

    if !review.status.can_transition_to(data.status) {
        return Err(AppError::bad_request("Only pending reviews can be moderated"));
    }

    let result = sqlx::query(
        "UPDATE reviews SET status = ?, admin_notes = COALESCE(?, admin_notes) \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(data.status)
    .bind(&data.admin_notes)
    .bind(id)
    .execute(pool.get_ref())
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Only pending reviews can be moderated"));
    }

    let review = find_review(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;

    let verb = match review.status {
        ReviewStatus::Approved => "approved",
        ReviewStatus::Rejected => "rejected",
        ReviewStatus::Pending => "updated",
    };
    log::info!("review {} {} by admin {}", id, verb, admin.id);
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Review {verb} successfully"),
        "review": review,
    })))
}

#[delete("/api/reviews/{id:\\d+}")]
pub async fn delete_review(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let user = auth::verify_user(&req).await?;
    let id = path.into_inner();

    let review = find_review(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;

    if !user.is_admin() && review.user_id != user.id {
        return Err(AppError::Forbidden("Not authorized to delete this review".into()));
    }

    sqlx::query("DELETE FROM reviews WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    log::info!("review {} deleted by user {}", id, user.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Review deleted successfully" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_reviews)
        .service(my_reviews)
        .service(room_reviews)
        .service(room_review_stats)
        .service(create_review)
        .service(update_review)
        .service(moderate_review)
        .service(delete_review);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::fixtures::{insert_room, insert_user};
    use crate::models::user::Role;
    use actix_web::http::{StatusCode, header};
    use actix_web::test;
    use serde_json::Value;

    #[sqlx::test(migrations = "./migrations")]
    async fn one_review_per_guest_and_room(pool: MySqlPool) {
        let (_, token) = insert_user(&pool, "reviewer@example.com", Role::User).await;
        let room_id = insert_room(&pool, 120).await;
        let app = test_app!(pool.clone());

        let review = |comment: &str| {
            test::TestRequest::post()
                .uri("/api/reviews")
                .insert_header((header::AUTHORIZATION, token.as_str()))
                .set_json(json!({ "roomId": room_id, "rating": 5, "comment": comment }))
                .to_request()
        };

        let resp = test::call_service(&app, review("ok         ")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["details"].get("comment").is_some());

        let resp = test::call_service(&app, review("  Lovely stay, great breakfast.  ")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["review"]["status"], "pending");
        assert_eq!(body["review"]["comment"], "Lovely stay, great breakfast.");

        let resp = test::call_service(&app, review("Second thoughts on the same room.")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "You have already reviewed this room");

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }
}
