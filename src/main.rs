// main.rs
use actix_cors::Cors;
use actix_files::Files;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{App, HttpServer, web};
use dotenv::dotenv;

use crate::config::AppConfig;

mod auth;
mod config;
mod controllers;
mod db;
mod error;
mod models;
mod utils;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("starting up in {} mode...", config.environment);

    let pool = match db::establish_connection(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Failed to initialise database pool: {:?}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        log::error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    if let Some(seed) = &config.admin {
        if let Err(e) = db::ensure_admin(&pool, seed).await {
            log::error!("Failed to seed admin account: {}", e);
            std::process::exit(1);
        }
    }

    utils::ensure_upload_dir(&config.upload)?;

    let rate_limit = match GovernorConfigBuilder::default()
        .period(config.rate_limit.period())
        .burst_size(config.rate_limit.max_requests)
        .finish()
    {
        Some(rate_limit) => rate_limit,
        None => {
            log::error!("Invalid rate limit: {:?}", config.rate_limit);
            std::process::exit(1);
        }
    };
    log::info!(
        "rate limiting API to {} requests per {:?} per client",
        config.rate_limit.max_requests,
        config.rate_limit.window
    );

    let bind = (config.host.clone(), config.port);
    log::info!("listening on http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.cors_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
            .supports_credentials()
            .max_age(3600);

        let security_headers = DefaultHeaders::new()
            .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
            .add((header::X_FRAME_OPTIONS, "SAMEORIGIN"))
            .add((header::REFERRER_POLICY, "no-referrer"))
            .add(("Cross-Origin-Resource-Policy", "cross-origin"));

        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .service(Files::new(
                &format!("/{}", utils::UPLOADS_ROUTE),
                config.upload.dir.clone(),
            ))
            .service(
                web::scope("")
                    .wrap(Governor::new(&rate_limit))
                    .configure(controllers::routes),
            )
            .default_service(web::to(controllers::not_found))
    })
    .bind(bind)?
    .run()
    .await
}
