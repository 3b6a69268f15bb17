use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::room::average_rating;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    /// Moderation is one step: a pending review is approved or rejected, then stays that way.
    pub fn can_transition_to(self, next: ReviewStatus) -> bool {
        matches!(
            (self, next),
            (ReviewStatus::Pending, ReviewStatus::Approved)
                | (ReviewStatus::Pending, ReviewStatus::Rejected)
        )
    }
}

pub const REVIEW_COLUMNS: &str =
    "id, user_id, room_id, rating, comment, status, admin_notes, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub room_id: i64,
    pub rating: i32,
    pub comment: String,
    pub status: ReviewStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public listing row: an approved review with the reviewer's display name.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithUser {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub room_id: i64,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Admin and "my reviews" listing row.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithDetails {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub room_id: i64,
    pub room_name: String,
    pub rating: i32,
    pub comment: String,
    pub status: ReviewStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub room_id: i64,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(min = 10, max = 1000, message = "Comment must be between 10 and 1000 characters"))]
    pub comment: String,
}

impl ReviewRequest {
    pub fn normalized(mut self) -> Self {
        self.comment = self.comment.trim().to_string();
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewUpdate {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(min = 10, max = 1000, message = "Comment must be between 10 and 1000 characters"))]
    pub comment: String,
}

impl ReviewUpdate {
    pub fn normalized(mut self) -> Self {
        self.comment = self.comment.trim().to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatusUpdate {
    pub status: ReviewStatus,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RatingCount {
    pub stars: i32,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    pub average_rating: f64,
    pub total_ratings: i64,
    pub rating_distribution: Vec<RatingCount>,
}

impl RatingStats {
    pub fn from_ratings(ratings: &[i32]) -> Self {
        let total = ratings.len() as i64;
        let rating_distribution = (1..=5)
            .rev()
            .map(|stars| {
                let count = ratings.iter().filter(|&&r| r == stars).count() as i64;
                let percentage = if total > 0 {
                    ((count as f64 / total as f64) * 1000.0).round() / 10.0
                } else {
                    0.0
                };
                RatingCount {
                    stars,
                    count,
                    percentage,
                }
            })
            .collect();

        Self {
            average_rating: average_rating(ratings),
            total_ratings: total,
            rating_distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_is_a_single_step() {
        use ReviewStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Pending));
    }

    #[test]
    fn review_request_bounds() {
        let ok = ReviewRequest {
            room_id: 1,
            rating: 5,
            comment: "Lovely stay, great breakfast.".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = ReviewRequest {
            room_id: 1,
            rating: 6,
            comment: "meh".into(),
        };
        let errors = bad.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("rating"));
        assert!(errors.field_errors().contains_key("comment"));
    }

    #[test]
    fn padding_does_not_count_towards_comment_length() {
        let padded = ReviewRequest {
            room_id: 1,
            rating: 4,
            comment: "ok         ".into(),
        }
        .normalized();
        assert_eq!(padded.comment, "ok");
        assert!(padded.validate().unwrap_err().field_errors().contains_key("comment"));

        let update = ReviewUpdate {
            rating: 4,
            comment: "   fine   \n".into(),
        }
        .normalized();
        assert!(update.validate().is_err());

        let kept = ReviewRequest {
            room_id: 1,
            rating: 4,
            comment: "  Quiet room, friendly staff.  ".into(),
        }
        .normalized();
        assert_eq!(kept.comment, "Quiet room, friendly staff.");
        assert!(kept.validate().is_ok());
    }

    #[test]
    fn stats_distribution() {
        let stats = RatingStats::from_ratings(&[5, 5, 4, 1]);
        assert_eq!(stats.total_ratings, 4);
        assert_eq!(stats.average_rating, 3.8);
        assert_eq!(stats.rating_distribution.len(), 5);
        assert_eq!(
            stats.rating_distribution[0],
            RatingCount {
                stars: 5,
                count: 2,
                percentage: 50.0
            }
        );
        assert_eq!(stats.rating_distribution[2].count, 0);
        assert_eq!(stats.rating_distribution[4].percentage, 25.0);
    }

    #[test]
    fn stats_for_unreviewed_room() {
        let stats = RatingStats::from_ratings(&[]);
        assert_eq!(stats.average_rating, 0.0);
        assert!(stats.rating_distribution.iter().all(|c| c.count == 0));
    }
}
