use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use validator::ValidationErrors;

use crate::config::{self, Environment};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    fn is_server_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Hash(_)
                | AppError::Token(_)
                | AppError::Io(_)
                | AppError::Internal(_)
        )
    }

    /// JSON body sent to the client. Server-side detail only leaves the
    /// process in development.
    pub fn body(&self, environment: Environment) -> Value {
        match self {
            AppError::Validation(errors) => json!({
                "error": "Validation failed",
                "details": errors,
            }),
            e if e.is_server_error() => json!({
                "error": "Something went wrong!",
                "message": match environment {
                    Environment::Development => e.to_string(),
                    Environment::Production => "Internal server error".to_string(),
                },
            }),
            e => json!({ "error": e.to_string() }),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            log::error!("{self}");
        }
        HttpResponse::build(self.status_code()).json(self.body(config::which()))
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("blocking task failed: {e}"))
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("File upload error: {e}"))
    }
}

/// True when the database refused a row because of a UNIQUE index.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::ValidationError;

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(
            AppError::bad_request("nope").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("Token expired.".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("admins only".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::not_found("Room not found").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn production_hides_internal_detail() {
        let err = AppError::Internal("disk on fire".into());

        let dev = err.body(Environment::Development);
        assert_eq!(dev["message"], "disk on fire");

        let prod = err.body(Environment::Production);
        assert_eq!(prod["error"], "Something went wrong!");
        assert_eq!(prod["message"], "Internal server error");
    }

    #[test]
    fn client_errors_keep_their_message_everywhere() {
        let err = AppError::bad_request("Only pending bookings can be cancelled");
        assert_eq!(
            err.body(Environment::Production)["error"],
            "Only pending bookings can be cancelled"
        );
    }

    #[test]
    fn validation_errors_carry_field_details() {
        let mut errors = ValidationErrors::new();
        errors.add("rating", ValidationError::new("range"));

        let body = AppError::from(errors).body(Environment::Production);
        assert_eq!(body["error"], "Validation failed");
        assert!(body["details"].get("rating").is_some());
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
