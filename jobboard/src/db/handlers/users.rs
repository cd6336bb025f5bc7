//! Database repository for users.

use crate::types::{UserId, abbrev_uuid};
use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        // Always generate a new ID for users
        let user_id = Uuid::new_v4();

        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, full_name, username, email, contact, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.full_name)
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.contact)
        .bind(request.role)
        .bind(&request.password_hash)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<std::collections::HashMap<Self::Id, UserDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET
                full_name = COALESCE($2, full_name),
                contact = COALESCE($3, contact),
                password_hash = COALESCE($4, password_hash)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.full_name)
        .bind(&request.contact)
        .bind(&request.password_hash)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Check whether an account already exists for the given email or username.
    #[instrument(skip(self, email, username), err)]
    pub async fn exists_by_email_or_username(&mut self, email: &str, username: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)")
            .bind(email)
            .bind(username)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(exists)
    }

    /// Store a password reset ticket on the user row.
    ///
    /// Overwrites any previous ticket, so at most one ticket is active per
    /// account at any time.
    #[instrument(skip(self, token_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_reset_ticket(&mut self, id: UserId, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE users SET reset_token_hash = $2, reset_token_expires_at = $3 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Look up the holder of an unexpired reset ticket by digest.
    ///
    /// Expiry is evaluated lazily here; expired tickets simply never match.
    #[instrument(skip(self, token_hash), err)]
    pub async fn find_by_reset_token(&mut self, token_hash: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            "SELECT * FROM users WHERE reset_token_hash = $1 AND reset_token_expires_at > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(user)
    }

    /// Replace the password hash and clear the reset ticket in one statement.
    ///
    /// Clearing both ticket columns together with the password update makes
    /// tickets single-use.
    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn complete_password_reset(&mut self, id: UserId, password_hash: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                password_hash = $2,
                reset_token_hash = NULL,
                reset_token_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use crate::api::models::users::Role;
    use crate::auth::password::{generate_reset_token, hash_reset_token};
    use sqlx::PgPool;

    fn create_request(tag: &str, role: Role) -> UserCreateDBRequest {
        UserCreateDBRequest {
            full_name: format!("Test {tag}"),
            username: format!("user_{tag}"),
            email: format!("{tag}@example.com"),
            contact: None,
            role,
            password_hash: Some("$argon2id$fake$hash".to_string()),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("alice", Role::Applicant)).await.unwrap();
        assert_eq!(user.username, "user_alice");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, Role::Applicant);
        assert!(user.reset_token_hash.is_none());
        assert!(user.reset_token_expires_at.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&create_request("bob", Role::Employer)).await.unwrap();

        let mut dup = create_request("bob2", Role::Employer);
        dup.email = "bob@example.com".to_string();

        let err = repo.create(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_user_by_email(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&create_request("carol", Role::Applicant)).await.unwrap();

        let found = repo.get_user_by_email("carol@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        let missing = repo.get_user_by_email("nobody@example.com").await.unwrap();
        assert!(missing.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_exists_by_email_or_username(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&create_request("dave", Role::Employer)).await.unwrap();

        assert!(repo.exists_by_email_or_username("dave@example.com", "other").await.unwrap());
        assert!(repo.exists_by_email_or_username("other@example.com", "user_dave").await.unwrap());
        assert!(!repo.exists_by_email_or_username("other@example.com", "other").await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reset_ticket_lifecycle(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("erin", Role::Applicant)).await.unwrap();

        let secret = generate_reset_token();
        let digest = hash_reset_token(&secret);
        let expires = Utc::now() + chrono::Duration::minutes(30);

        repo.set_reset_ticket(user.id, &digest, expires).await.unwrap();

        let holder = repo.find_by_reset_token(&digest).await.unwrap().unwrap();
        assert_eq!(holder.id, user.id);

        // Consume the ticket
        repo.complete_password_reset(user.id, "$argon2id$new$hash").await.unwrap();

        // Single-use: the same digest no longer matches
        assert!(repo.find_by_reset_token(&digest).await.unwrap().is_none());

        let reloaded = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash.as_deref(), Some("$argon2id$new$hash"));
        assert!(reloaded.reset_token_hash.is_none());
        assert!(reloaded.reset_token_expires_at.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reset_ticket_overwrite_invalidates_previous(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("frank", Role::Applicant)).await.unwrap();
        let expires = Utc::now() + chrono::Duration::minutes(30);

        let first_digest = hash_reset_token(&generate_reset_token());
        repo.set_reset_ticket(user.id, &first_digest, expires).await.unwrap();

        let second_digest = hash_reset_token(&generate_reset_token());
        repo.set_reset_ticket(user.id, &second_digest, expires).await.unwrap();

        // Only the most recent ticket is live
        assert!(repo.find_by_reset_token(&first_digest).await.unwrap().is_none());
        assert!(repo.find_by_reset_token(&second_digest).await.unwrap().is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_expired_reset_ticket_never_matches(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("grace", Role::Applicant)).await.unwrap();

        let digest = hash_reset_token(&generate_reset_token());
        let expired = Utc::now() - chrono::Duration::minutes(1);
        repo.set_reset_ticket(user.id, &digest, expired).await.unwrap();

        assert!(repo.find_by_reset_token(&digest).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_leaves_unset_fields_alone(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("henry", Role::Employer)).await.unwrap();

        let updated = repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    full_name: Some("Henry Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Henry Renamed");
        assert_eq!(updated.email, user.email);
        assert_eq!(updated.password_hash, user.password_hash);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("iris", Role::Applicant)).await.unwrap();

        assert!(repo.delete(user.id).await.unwrap());
        assert!(repo.get_by_id(user.id).await.unwrap().is_none());

        // Second delete is a no-op
        assert!(!repo.delete(user.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_with_pagination(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        for i in 0..5 {
            repo.create(&create_request(&format!("list{i}"), Role::Applicant)).await.unwrap();
        }

        let page = repo.list(&UserFilter::new(0, 3)).await.unwrap();
        assert_eq!(page.len(), 3);

        let rest = repo.list(&UserFilter::new(3, 10)).await.unwrap();
        assert_eq!(rest.len(), 2);
    }
}
