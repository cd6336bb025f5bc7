//! API request/response models for users.

use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Role enum for the job board's three account types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employer,
    Applicant,
}

/// The authenticated principal, reconstructed from session claims.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub role: Role,
}

// User response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub contact: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            full_name: db.full_name,
            username: db.username,
            email: db.email,
            contact: db.contact,
            role: db.role,
            created_at: db.created_at,
            updated_at: db.updated_at,
            // password_hash and reset ticket columns are intentionally dropped here
        }
    }
}

impl From<&UserDBResponse> for CurrentUser {
    fn from(db: &UserDBResponse) -> Self {
        Self { id: db.id, role: db.role }
    }
}

/// Query parameters for listing users
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    /// Number of users to skip (default: 0)
    pub skip: Option<i64>,
    /// Maximum number of users to return (default: 100)
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_user_response_never_serializes_secrets() {
        let db = UserDBResponse {
            id: Uuid::new_v4(),
            full_name: "Test User".to_string(),
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            contact: None,
            role: Role::Applicant,
            password_hash: Some("$argon2id$secret".to_string()),
            reset_token_hash: Some("deadbeef".to_string()),
            reset_token_expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&UserResponse::from(db)).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("deadbeef"));
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("reset_token"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::Employer).unwrap(), "\"employer\"");
        assert_eq!(serde_json::to_string(&Role::Applicant).unwrap(), "\"applicant\"");
    }
}
