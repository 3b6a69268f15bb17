use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

pub const USER_COLUMNS: &str = "id, name, email, password, phone, address, role, is_active, \
     last_login, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
    #[validate(
        length(max = 20, message = "Phone number must be at most 20 characters"),
        custom(function = "validate_phone")
    )]
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl RegisterRequest {
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = normalize_email(&self.email);
        self.phone = non_empty(self.phone);
        self.address = non_empty(self.address);
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: Option<String>,
    #[validate(
        length(max = 20, message = "Phone number must be at most 20 characters"),
        custom(function = "validate_phone")
    )]
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl UpdateProfileRequest {
    pub fn normalized(mut self) -> Self {
        self.name = non_empty(self.name);
        self.phone = non_empty(self.phone);
        self.address = non_empty(self.address);
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub new_password: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));

    if allowed && (7..=15).contains(&digits) && !phone.trim_start().starts_with('-') {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("Please provide a valid phone number".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_is_trimmed_and_lowercased() {
        let req = RegisterRequest {
            name: "  Jane Guest ".into(),
            email: " Jane@Example.COM ".into(),
            password: "secret1".into(),
            phone: Some("   ".into()),
            address: None,
        }
        .normalized();

        assert_eq!(req.name, "Jane Guest");
        assert_eq!(req.email, "jane@example.com");
        assert_eq!(req.phone, None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn register_request_rejects_short_password_and_bad_email() {
        let req = RegisterRequest {
            name: "Jo".into(),
            email: "not-an-email".into(),
            password: "123".into(),
            phone: None,
            address: None,
        };

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("name"));
    }

    #[test]
    fn phone_numbers() {
        assert!(validate_phone("+1 (987) 654-3210").is_ok());
        assert!(validate_phone("081234567890").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("call me maybe").is_err());
    }

    #[test]
    fn phone_fits_its_column() {
        let long = "(+62) 812-3456-7890-12";
        assert!(validate_phone(long).is_ok());

        let req = RegisterRequest {
            name: "Ayu Lestari".into(),
            email: "ayu@example.com".into(),
            password: "secret123".into(),
            phone: Some(long.into()),
            address: None,
        }
        .normalized();
        assert!(req.validate().unwrap_err().field_errors().contains_key("phone"));

        let update = UpdateProfileRequest {
            name: None,
            phone: Some(long.into()),
            address: None,
        }
        .normalized();
        assert!(update.validate().unwrap_err().field_errors().contains_key("phone"));

        let update = UpdateProfileRequest {
            name: None,
            phone: Some("+62 812-3456-7890".into()),
            address: None,
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn password_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: 1,
            name: "Admin User".into(),
            email: "admin@example.com".into(),
            password: "$2b$12$hash".into(),
            phone: None,
            address: None,
            role: Role::Admin,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "admin");
        assert_eq!(json["isActive"], true);
    }
}
