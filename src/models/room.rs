use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::{Validate, ValidationError};

use crate::models::{image::ImageResponse, review::ReviewWithUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RoomType {
    Single,
    Double,
    Suite,
    Deluxe,
}

pub const ROOM_COLUMNS: &str = "id, name, description, type, price, capacity, size, amenities, \
     is_available, booking_com_id, featured, discount, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub price: Decimal,
    pub capacity: i32,
    pub size: Option<i32>,
    pub amenities: Json<Vec<String>>,
    pub is_available: bool,
    pub booking_com_id: Option<String>,
    pub featured: bool,
    pub discount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn discounted_price(&self) -> Decimal {
        if self.discount > Decimal::ZERO {
            (self.price * (Decimal::ONE_HUNDRED - self.discount) / Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            self.price
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: Room,
    pub discounted_price: Decimal,
    pub average_rating: f64,
    pub images: Vec<ImageResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<ReviewWithUser>>,
}

impl RoomResponse {
    pub fn new(room: Room, ratings: &[i32], images: Vec<ImageResponse>) -> Self {
        Self {
            discounted_price: room.discounted_price(),
            average_rating: average_rating(ratings),
            room,
            images,
            reviews: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    #[validate(length(min = 2, max = 100, message = "Room name must be between 2 and 100 characters"))]
    pub name: String,
    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    #[validate(custom(function = "non_negative_price"))]
    pub price: Decimal,
    #[validate(range(min = 1, max = 10, message = "Capacity must be between 1 and 10"))]
    pub capacity: i32,
    #[validate(range(min = 1, message = "Size must be a positive number"))]
    pub size: Option<i32>,
    pub amenities: Option<Vec<String>>,
    #[validate(custom(function = "percent"))]
    pub discount: Option<Decimal>,
    pub is_available: Option<bool>,
    pub featured: Option<bool>,
    pub booking_com_id: Option<String>,
}

impl RoomRequest {
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        if let Some(amenities) = self.amenities.as_mut() {
            amenities.retain(|a| !a.trim().is_empty());
            for a in amenities.iter_mut() {
                *a = a.trim().to_string();
            }
        }
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomFilter {
    #[serde(rename = "type")]
    pub room_type: Option<RoomType>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub available: Option<bool>,
}

fn non_negative_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("Price must be a positive number".into());
        return Err(err);
    }
    Ok(())
}

fn percent(discount: &Decimal) -> Result<(), ValidationError> {
    if *discount < Decimal::ZERO || *discount > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("range");
        err.message = Some("Discount must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

/// Mean of the given star ratings rounded to one decimal, 0 when empty.
pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|&r| r as i64).sum();
    let avg = sum as f64 / ratings.len() as f64;
    (avg * 10.0).round() / 10.0
}
