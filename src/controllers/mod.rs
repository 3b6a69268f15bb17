use actix_web::web::{JsonConfig, PathConfig, QueryConfig};
use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;

use crate::error::AppError;

/// Service over every API route, backed by `$pool` and the test config.
#[cfg(test)]
macro_rules! test_app {
    ($pool:expr) => {{
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($pool))
                .app_data(actix_web::web::Data::new(crate::config::AppConfig::for_tests()))
                .configure(crate::controllers::routes)
                .default_service(actix_web::web::to(crate::controllers::not_found)),
        )
        .await
    }};
}

pub mod auth_controller;
pub mod booking_controller;
pub mod content_controller;
pub mod image_controller;
pub mod review_controller;
pub mod room_controller;

const JSON_LIMIT: usize = 10 * 1024 * 1024;

#[get("/api/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "message": "Metro Hotel API is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "Route not found" }))
}

/// Extractor settings plus every API route. Malformed bodies, paths and
/// queries all surface as 400 with the usual error body.
pub fn routes(cfg: &mut web::ServiceConfig) {
    let json_config = JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            log::debug!("JSON payload error: {}", err);
            AppError::bad_request(format!("Invalid request body: {err}")).into()
        });
    let path_config = PathConfig::default()
        .error_handler(|err, _req| AppError::bad_request(format!("Invalid path: {err}")).into());
    let query_config = QueryConfig::default().error_handler(|err, _req| {
        AppError::bad_request(format!("Invalid query string: {err}")).into()
    });

    cfg.app_data(json_config)
        .app_data(path_config)
        .app_data(query_config)
        .service(health);

    auth_controller::configure(cfg);
    room_controller::configure(cfg);
    review_controller::configure(cfg);
    image_controller::configure(cfg);
    booking_controller::configure(cfg);
    content_controller::configure(cfg);
}

/// Rows and tokens for tests that run against a migrated database.
#[cfg(test)]
pub(crate) mod fixtures {
    use rust_decimal::Decimal;
    use sqlx::MySqlPool;

    use crate::auth;
    use crate::config::AppConfig;
    use crate::models::user::{Role, USER_COLUMNS, User};

    /// Inserts an active account and returns it with a ready `Authorization` value.
    pub async fn insert_user(pool: &MySqlPool, email: &str, role: Role) -> (User, String) {
        let result = sqlx::query(
            "INSERT INTO users (name, email, password, role) VALUES ('Test Guest', ?, 'unused', ?)",
        )
        .bind(email)
        .bind(role)
        .execute(pool)
        .await
        .unwrap();

        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(result.last_insert_id() as i64)
            .fetch_one(pool)
            .await
            .unwrap();
        let token = auth::generate_jwt(&user, &AppConfig::for_tests().auth).unwrap();
        (user, format!("Bearer {token}"))
    }

    pub async fn insert_room(pool: &MySqlPool, price: i64) -> i64 {
        sqlx::query(
            "INSERT INTO rooms (name, description, type, price, capacity, amenities) \
             VALUES ('Garden Double', 'Quiet double room facing the garden', 'double', ?, 2, JSON_ARRAY())",
        )
        .bind(Decimal::from(price))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test};
    use serde_json::Value;
    use sqlx::mysql::MySqlPoolOptions;

    macro_rules! app {
        () => {{
            let pool = MySqlPoolOptions::new()
                .connect_lazy(&AppConfig::for_tests().database.url)
                .unwrap();
            test_app!(pool)
        }};
    }

    #[actix_web::test]
    async fn api_is_rate_limited_per_client() {
        use actix_governor::{Governor, GovernorConfigBuilder};
        use std::net::SocketAddr;

        let config = AppConfig::for_tests();
        let pool = MySqlPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        let limit = crate::config::RateLimitConfig {
            window: std::time::Duration::from_secs(60 * 60),
            max_requests: 2,
        };
        let governor = GovernorConfigBuilder::default()
            .period(limit.period())
            .burst_size(limit.max_requests)
            .finish()
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .service(web::scope("").wrap(Governor::new(&governor)).configure(routes))
                .default_service(web::to(not_found)),
        )
        .await;

        let status_for = |peer: &str| {
            test::TestRequest::get()
                .uri("/api/health")
                .peer_addr(peer.parse::<SocketAddr>().unwrap())
                .to_request()
        };
        for _ in 0..2 {
            let resp = test::call_service(&app, status_for("10.0.0.7:40000")).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let status = match test::try_call_service(&app, status_for("10.0.0.7:40001")).await {
            Ok(resp) => resp.status(),
            Err(e) => e.error_response().status(),
        };
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let resp = test::call_service(&app, status_for("10.0.0.8:40000")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn health_reports_ok() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "OK");
        assert!(body["timestamp"].is_string());
    }

    #[actix_web::test]
    async fn unknown_route_is_404() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Route not found");
    }

    #[actix_web::test]
    async fn protected_routes_need_a_token() {
        let app = app!();
        for uri in ["/api/auth/profile", "/api/bookings/my-bookings", "/api/reviews/my-reviews"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Access denied. No token provided.");
        }
    }

    #[actix_web::test]
    async fn garbage_token_is_rejected() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/content")
            .insert_header((header::AUTHORIZATION, "Bearer not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid token.");
    }

    #[actix_web::test]
    async fn malformed_json_is_400() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{\"email\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn registration_is_validated_before_any_query() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "name": "A", "email": "not-an-email", "password": "123" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Validation failed");
        assert!(body["details"].get("email").is_some());
        assert!(body["details"].get("password").is_some());
    }

    #[actix_web::test]
    async fn unknown_content_page_is_400() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/content/page/blog").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn availability_needs_both_dates() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/bookings/availability/1?checkInDate=2024-06-01")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn availability_rejects_reversed_dates() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/bookings/availability/1?checkInDate=2024-06-03&checkOutDate=2024-06-01")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Check-out date must be after check-in date");
    }
}
