use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Page {
    Home,
    About,
    Contact,
    Gallery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Html,
    Json,
}

pub const CONTENT_COLUMNS: &str = "id, page, section, title, content, type, is_published, \
     sort_order, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: i64,
    pub page: Page,
    pub section: String,
    pub title: Option<String>,
    pub content: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub is_published: bool,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub page: Page,
    #[validate(length(min = 1, max = 100, message = "Section is required"))]
    pub section: String,
    #[validate(length(max = 255, message = "Title must be less than 255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    #[serde(rename = "type", default)]
    pub content_type: ContentType,
    pub is_published: Option<bool>,
    pub order: Option<i32>,
}

impl ContentRequest {
    pub fn normalized(mut self) -> AppResult<Self> {
        self.section = self.section.trim().to_string();
        self.content = prepare_body(self.content_type, &self.content)?;
        Ok(self)
    }
}

/// Sanitises html bodies and rejects json bodies that do not parse.
pub fn prepare_body(content_type: ContentType, body: &str) -> AppResult<String> {
    match content_type {
        ContentType::Text => Ok(body.to_string()),
        ContentType::Html => Ok(ammonia::clean(body)),
        ContentType::Json => serde_json::from_str::<serde_json::Value>(body)
            .map(|_| body.to_string())
            .map_err(|e| AppError::bad_request(format!("Content is not valid JSON: {e}"))),
    }
}

/// Whether a row already found at (page, section) blocks saving `editing`.
/// `editing` is `None` on create.
pub fn section_taken(existing_id: Option<i64>, editing: Option<i64>) -> bool {
    match (existing_id, editing) {
        (None, _) => false,
        (Some(found), Some(current)) => found != current,
        (Some(_), None) => true,
    }
}
