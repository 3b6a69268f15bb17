use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ImageCategory {
    Room,
    Hotel,
    #[default]
    Gallery,
}

impl std::str::FromStr for ImageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "room" => Ok(ImageCategory::Room),
            "hotel" => Ok(ImageCategory::Hotel),
            "gallery" => Ok(ImageCategory::Gallery),
            _ => Err("Invalid category".to_string()),
        }
    }
}

/// Columns of `images i` joined with `rooms r`, matching [`ImageRow`].
pub const IMAGE_SELECT: &str = "SELECT i.id, i.filename, i.original_name, i.path, i.url, \
     i.has_thumbnail, i.size, i.mime_type, i.category, i.is_featured, i.alt_text, i.room_id, \
     i.created_at, i.updated_at, r.name AS room_name \
     FROM images i LEFT JOIN rooms r ON r.id = i.room_id";

#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub url: String,
    pub has_thumbnail: bool,
    pub size: i64,
    pub mime_type: String,
    pub category: ImageCategory,
    pub is_featured: bool,
    pub alt_text: Option<String>,
    pub room_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub room_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub url: String,
    pub thumbnail_url: String,
    pub size: i64,
    pub mime_type: String,
    pub category: ImageCategory,
    pub is_featured: bool,
    pub alt_text: Option<String>,
    pub room_id: Option<i64>,
    pub room: Option<RoomRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageResponse {
    /// Images without a generated thumbnail point `thumbnailUrl` at the original.
    pub fn from_row(row: ImageRow, base_url: &str) -> Self {
        let room = match (row.room_id, row.room_name) {
            (Some(id), Some(name)) => Some(RoomRef { id, name }),
            _ => None,
        };
        let thumbnail_url = if row.has_thumbnail {
            format!("{}/{}", base_url, thumbnail_path(&row.path))
        } else {
            row.url.clone()
        };
        Self {
            thumbnail_url,
            id: row.id,
            filename: row.filename,
            original_name: row.original_name,
            path: row.path,
            url: row.url,
            size: row.size,
            mime_type: row.mime_type,
            category: row.category,
            is_featured: row.is_featured,
            alt_text: row.alt_text,
            room_id: row.room_id,
            room,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// `uploads/a.jpg` -> `uploads/a_thumb.jpg`; names without an extension get `_thumb` appended.
pub fn thumbnail_path(path: &str) -> String {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = file_start + dot;
            format!("{}_thumb{}", &path[..dot], &path[dot..])
        }
        _ => format!("{path}_thumb"),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpdateRequest {
    pub category: Option<ImageCategory>,
    pub room_id: Option<i64>,
    #[validate(length(max = 255, message = "Alt text must be less than 255 characters"))]
    pub alt_text: Option<String>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFilter {
    pub category: Option<ImageCategory>,
    pub room_id: Option<i64>,
    pub featured: Option<bool>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_paths() {
        assert_eq!(
            thumbnail_path("uploads/image-3f2a.jpg"),
            "uploads/image-3f2a_thumb.jpg"
        );
        assert_eq!(thumbnail_path("uploads/a.b/c"), "uploads/a.b/c_thumb");
        assert_eq!(thumbnail_path("uploads/.hidden"), "uploads/.hidden_thumb");
    }

    #[test]
    fn pagination_clamps_and_counts_pages() {
        let p = Pagination::new(Some(0), Some(500), 20);
        assert_eq!(p, Pagination { page: 1, limit: 100 });

        let p = Pagination::new(Some(3), None, 12);
        assert_eq!(p.offset(), 24);
        assert_eq!(p.pages(25), 3);
        assert_eq!(p.pages(24), 2);
        assert_eq!(p.pages(0), 0);
    }

    #[test]
    fn category_from_form_field() {
        assert_eq!("room".parse::<ImageCategory>(), Ok(ImageCategory::Room));
        assert!("poster".parse::<ImageCategory>().is_err());
        assert_eq!(ImageCategory::default(), ImageCategory::Gallery);
    }

    fn row(has_thumbnail: bool) -> ImageRow {
        let now = Utc::now();
        ImageRow {
            id: 7,
            filename: "image-1.png".into(),
            original_name: "lobby.png".into(),
            path: "uploads/image-1.png".into(),
            url: "http://localhost:5000/uploads/image-1.png".into(),
            has_thumbnail,
            size: 2048,
            mime_type: "image/png".into(),
            category: ImageCategory::Room,
            is_featured: true,
            alt_text: None,
            room_id: Some(3),
            created_at: now,
            updated_at: now,
            room_name: Some("Executive Suite".into()),
        }
    }

    #[test]
    fn response_links_room_and_thumbnail() {
        let json =
            serde_json::to_value(ImageResponse::from_row(row(true), "http://localhost:5000")).unwrap();
        assert_eq!(
            json["thumbnailUrl"],
            "http://localhost:5000/uploads/image-1_thumb.png"
        );
        assert_eq!(json["room"]["name"], "Executive Suite");
        assert_eq!(json["category"], "room");
    }

    #[test]
    fn missing_thumbnail_points_at_the_original() {
        let image = ImageResponse::from_row(row(false), "http://localhost:5000");
        assert_eq!(image.thumbnail_url, image.url);
        assert_eq!(image.thumbnail_url, "http://localhost:5000/uploads/image-1.png");
    }
}
