use axum::{Json, extract::State};
use chrono::Utc;
use tracing::{error, info};

use crate::{
    AppState,
    api::handlers::auth::validate_password_length,
    api::models::auth::{PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse},
    auth::password,
    db::handlers::Users,
    email::EmailService,
    errors::Error,
    types::abbrev_uuid,
};

/// Request a password reset (send email)
///
/// Always answers 200 with the same message so callers cannot probe which
/// email addresses have accounts.
#[utoipa::path(
    post,
    path = "/passwords/request-reset",
    request_body = PasswordResetRequest,
    tag = "passwords",
    responses(
        (status = 200, description = "Password reset email sent if the account exists", body = PasswordResetResponse),
        (status = 400, description = "Invalid request"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    // Built before the lookup; a mailer misconfiguration must not produce a
    // different status for known and unknown addresses
    let email_service = match EmailService::new(&state.config) {
        Ok(service) => Some(service),
        Err(e) => {
            error!("Failed to create email service: {e}");
            None
        }
    };

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut tx);

    let user = user_repo.get_user_by_email(&request.email).await?;

    let mut outgoing = None;
    if let Some(user) = user {
        // Only native auth users (those with a password hash) can reset
        if user.password_hash.is_some() {
            let token = password::generate_reset_token();
            let token_hash = password::hash_reset_token(&token);

            let ttl = chrono::Duration::from_std(state.config.auth.native.password_reset_token_duration)
                .map_err(|e| Error::Internal {
                    operation: format!("convert reset token duration: {e}"),
                })?;
            let expires_at = Utc::now() + ttl;

            // Overwrites any earlier ticket for this user
            user_repo.set_reset_ticket(user.id, &token_hash, expires_at).await?;

            info!("Issued password reset ticket for user {}", abbrev_uuid(&user.id));
            outgoing = Some((user.email, token));
        }
    }

    // Commit the ticket before attempting delivery. An email failure must not
    // roll back the ticket, and it must not leak through the response either.
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    if let (Some((email, token)), Some(email_service)) = (outgoing, &email_service) {
        if let Err(e) = email_service.send_password_reset_email(&email, &token).await {
            error!("Failed to send password reset email: {e}");
        }
    }

    Ok(Json(PasswordResetResponse {
        message: "If an account exists with that email, a reset link has been sent.".to_string(),
    }))
}

/// Complete a password reset with the emailed token
#[utoipa::path(
    post,
    path = "/passwords/reset-password",
    request_body = PasswordResetConfirmRequest,
    tag = "passwords",
    responses(
        (status = 200, description = "Password updated", body = PasswordResetResponse),
        (status = 400, description = "Invalid or expired token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    validate_password_length(&request.new_password, &state.config)?;

    // The database stores only the digest; hash the presented token to match
    let token_hash = password::hash_reset_token(&request.token);

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut tx);

    let user = user_repo
        .find_by_reset_token(&token_hash)
        .await?
        .ok_or(Error::InvalidResetToken)?;

    // Hash new password on a blocking thread to avoid blocking async runtime
    let argon2_params = crate::api::handlers::auth::argon2_params_from_config(&state.config);
    let new_password_hash = tokio::task::spawn_blocking({
        let password = request.new_password.clone();
        move || password::hash_string_with_params(&password, Some(argon2_params))
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password hashing task: {e}"),
    })??;

    // Sets the new hash and clears the ticket in one statement, so the
    // ticket cannot be replayed even if a concurrent request holds the row
    user_repo.complete_password_reset(user.id, &new_password_hash).await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!("Password reset completed for user {}", abbrev_uuid(&user.id));

    // Best effort notification; the reset already succeeded
    let config = state.config.clone();
    let email = user.email.clone();
    tokio::spawn(async move {
        match EmailService::new(&config) {
            Ok(email_service) => {
                if let Err(e) = email_service.send_password_changed_email(&email).await {
                    error!("Failed to send password changed notification: {e}");
                }
            }
            Err(e) => error!("Failed to create email service for notification: {e}"),
        }
    });

    Ok(Json(PasswordResetResponse {
        message: "Password has been successfully updated!".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::auth::password::{generate_reset_token, hash_reset_token};
    use crate::test_utils::{create_test_config, create_test_user};
    use axum_test::TestServer;
    use chrono::Duration;
    use sqlx::PgPool;

    fn test_router(pool: PgPool, config: crate::config::Config) -> axum::Router {
        let state = AppState::builder().db(pool).config(config).build();
        axum::Router::new()
            .route("/api/passwords/request-reset", axum::routing::post(request_password_reset))
            .route("/api/passwords/reset-password", axum::routing::post(reset_password))
            .with_state(state)
    }

    #[sqlx::test]
    async fn test_request_reset_known_email(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Applicant, "password123").await;
        let server = TestServer::new(test_router(pool.clone(), config)).unwrap();

        let response = server
            .post("/api/passwords/request-reset")
            .json(&PasswordResetRequest { email: user.email.clone() })
            .await;

        response.assert_status_ok();
        let body: PasswordResetResponse = response.json();
        assert_eq!(body.message, "If an account exists with that email, a reset link has been sent.");

        // A ticket digest was written to the user row
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let stored = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_some());
        assert!(stored.reset_token_expires_at.unwrap() > Utc::now());
    }

    #[sqlx::test]
    async fn test_request_reset_unknown_email_same_response(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Applicant, "password123").await;
        let server = TestServer::new(test_router(pool.clone(), config)).unwrap();

        let response = server
            .post("/api/passwords/request-reset")
            .json(&PasswordResetRequest {
                email: "nobody@example.com".to_string(),
            })
            .await;

        response.assert_status_ok();
        let body: PasswordResetResponse = response.json();
        assert_eq!(body.message, "If an account exists with that email, a reset link has been sent.");

        // No ticket was written anywhere, including the unrelated account
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let stored = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_none());
        assert!(stored.reset_token_expires_at.is_none());
    }

    /// Pull the reset secret out of the link in an emailed message file.
    fn read_emailed_token(dir: &std::path::Path) -> String {
        for entry in std::fs::read_dir(dir).unwrap() {
            let raw = std::fs::read_to_string(entry.unwrap().path()).unwrap_or_default();
            // Undo quoted-printable soft line breaks and encoded '='
            let decoded = raw.replace("=\r\n", "").replace("=\n", "").replace("=3D", "=");
            if let Some(pos) = decoded.find("reset-password?token=") {
                let start = pos + "reset-password?token=".len();
                return decoded[start..start + 64].to_string();
            }
        }
        panic!("no reset email with a token link was written");
    }

    #[sqlx::test]
    async fn test_request_reset_emailed_token_is_usable(pool: PgPool) {
        let mut config = create_test_config();
        let email_dir = std::env::temp_dir().join(format!("jobboard-reset-emails-{}", uuid::Uuid::new_v4().simple()));
        config.email.transport = crate::config::EmailTransportConfig::File {
            path: email_dir.to_string_lossy().to_string(),
        };
        let user = create_test_user(&pool, Role::Applicant, "oldpassword1").await;
        let server = TestServer::new(test_router(pool.clone(), config)).unwrap();

        server
            .post("/api/passwords/request-reset")
            .json(&PasswordResetRequest { email: user.email.clone() })
            .await
            .assert_status_ok();

        // The emailed secret is 64 hex chars and its digest is what was stored
        let token = read_emailed_token(&email_dir);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let stored = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert_eq!(stored.reset_token_hash.as_deref(), Some(hash_reset_token(&token).as_str()));
        drop(conn);

        let response = server
            .post("/api/passwords/reset-password")
            .json(&PasswordResetConfirmRequest {
                token,
                new_password: "newpassword1".to_string(),
            })
            .await;
        response.assert_status_ok();

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let stored = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert!(password::verify_string("newpassword1", stored.password_hash.as_ref().unwrap()).unwrap());

        std::fs::remove_dir_all(&email_dir).ok();
    }

    #[sqlx::test]
    async fn test_request_reset_misconfigured_mailer_stays_uniform(pool: PgPool) {
        let mut config = create_test_config();
        // A file where the emails directory should go makes the transport unbuildable
        let blocked = std::env::temp_dir().join(format!("jobboard-blocked-{}", uuid::Uuid::new_v4().simple()));
        std::fs::write(&blocked, b"not a directory").unwrap();
        config.email.transport = crate::config::EmailTransportConfig::File {
            path: blocked.join("emails").to_string_lossy().to_string(),
        };
        let user = create_test_user(&pool, Role::Applicant, "password123").await;
        let server = TestServer::new(test_router(pool.clone(), config)).unwrap();

        let known = server
            .post("/api/passwords/request-reset")
            .json(&PasswordResetRequest { email: user.email.clone() })
            .await;
        let unknown = server
            .post("/api/passwords/request-reset")
            .json(&PasswordResetRequest {
                email: "nobody@example.com".to_string(),
            })
            .await;

        known.assert_status_ok();
        unknown.assert_status_ok();
        let known_body: PasswordResetResponse = known.json();
        let unknown_body: PasswordResetResponse = unknown.json();
        assert_eq!(known_body.message, unknown_body.message);

        // The ticket is still issued even though delivery could not happen
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let stored = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_some());

        std::fs::remove_file(&blocked).ok();
    }

    #[sqlx::test]
    async fn test_reset_password_full_flow(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Applicant, "oldpassword1").await;

        // Seed a ticket the way request_password_reset would
        let token = generate_reset_token();
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.set_reset_ticket(user.id, &hash_reset_token(&token), Utc::now() + Duration::minutes(30))
            .await
            .unwrap();
        drop(conn);

        let server = TestServer::new(test_router(pool.clone(), config)).unwrap();

        let response = server
            .post("/api/passwords/reset-password")
            .json(&PasswordResetConfirmRequest {
                token: token.clone(),
                new_password: "newpassword1".to_string(),
            })
            .await;

        response.assert_status_ok();
        let body: PasswordResetResponse = response.json();
        assert_eq!(body.message, "Password has been successfully updated!");

        // Ticket is consumed and the new password verifies
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let stored = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_none());
        assert!(stored.reset_token_expires_at.is_none());
        assert!(password::verify_string("newpassword1", stored.password_hash.as_ref().unwrap()).unwrap());
    }

    #[sqlx::test]
    async fn test_reset_password_ticket_single_use(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Applicant, "oldpassword1").await;

        let token = generate_reset_token();
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.set_reset_ticket(user.id, &hash_reset_token(&token), Utc::now() + Duration::minutes(30))
            .await
            .unwrap();
        drop(conn);

        let server = TestServer::new(test_router(pool, config)).unwrap();

        let request = PasswordResetConfirmRequest {
            token,
            new_password: "newpassword1".to_string(),
        };

        server.post("/api/passwords/reset-password").json(&request).await.assert_status_ok();

        // Second use of the same token fails
        let response = server.post("/api/passwords/reset-password").json(&request).await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Password reset token is invalid or has expired.");
    }

    #[sqlx::test]
    async fn test_reset_password_expired_ticket(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Applicant, "oldpassword1").await;

        let token = generate_reset_token();
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.set_reset_ticket(user.id, &hash_reset_token(&token), Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        drop(conn);

        let server = TestServer::new(test_router(pool, config)).unwrap();

        let response = server
            .post("/api/passwords/reset-password")
            .json(&PasswordResetConfirmRequest {
                token,
                new_password: "newpassword1".to_string(),
            })
            .await;

        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    async fn test_reset_password_garbage_token(pool: PgPool) {
        let config = create_test_config();
        let server = TestServer::new(test_router(pool, config)).unwrap();

        let response = server
            .post("/api/passwords/reset-password")
            .json(&PasswordResetConfirmRequest {
                token: "not-a-real-token".to_string(),
                new_password: "newpassword1".to_string(),
            })
            .await;

        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Password reset token is invalid or has expired.");
    }

    #[sqlx::test]
    async fn test_reset_password_rejects_short_password(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Applicant, "oldpassword1").await;

        let token = generate_reset_token();
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.set_reset_ticket(user.id, &hash_reset_token(&token), Utc::now() + Duration::minutes(30))
            .await
            .unwrap();
        drop(conn);

        let server = TestServer::new(test_router(pool.clone(), config)).unwrap();

        let response = server
            .post("/api/passwords/reset-password")
            .json(&PasswordResetConfirmRequest {
                token,
                new_password: "short".to_string(),
            })
            .await;

        response.assert_status(axum::http::StatusCode::BAD_REQUEST);

        // The ticket survives a rejected attempt
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let stored = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_some());
    }

    #[sqlx::test]
    async fn test_request_reset_overwrites_previous_ticket(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Applicant, "password123").await;

        // Old ticket seeded directly
        let old_token = generate_reset_token();
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.set_reset_ticket(user.id, &hash_reset_token(&old_token), Utc::now() + Duration::minutes(30))
            .await
            .unwrap();
        drop(conn);

        let server = TestServer::new(test_router(pool.clone(), config)).unwrap();
        server
            .post("/api/passwords/request-reset")
            .json(&PasswordResetRequest { email: user.email.clone() })
            .await
            .assert_status_ok();

        // The old ticket no longer matches
        let response = server
            .post("/api/passwords/reset-password")
            .json(&PasswordResetConfirmRequest {
                token: old_token,
                new_password: "newpassword1".to_string(),
            })
            .await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    }
}
