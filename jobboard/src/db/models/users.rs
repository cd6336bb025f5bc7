//! Database models for users.

use crate::api::models::users::Role;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Full user row as stored in the database.
///
/// Carries the password hash and reset ticket columns; never serialize this
/// directly to API clients - convert to
/// [`UserResponse`](crate::api::models::users::UserResponse) first.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub contact: Option<String>,
    pub role: Role,
    pub password_hash: Option<String>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a user row.
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub contact: Option<String>,
    pub role: Role,
    pub password_hash: Option<String>,
}

/// Request to update a user row. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub full_name: Option<String>,
    pub contact: Option<String>,
    pub password_hash: Option<String>,
}
