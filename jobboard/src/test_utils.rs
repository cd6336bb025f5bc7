//! Test utilities for integration testing (available with `test-utils` feature).

use crate::api::models::users::{CurrentUser, Role, UserResponse};
use crate::auth::{password, session};
use crate::db::handlers::{Repository, Users};
use crate::db::models::users::UserCreateDBRequest;
use sqlx::PgPool;
use uuid::Uuid;

pub fn create_test_config() -> crate::config::Config {
    // Use temp directory for test emails
    let temp_dir = std::env::temp_dir().join(format!("jobboard-test-emails-{}", std::process::id()));

    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        client_url: "http://localhost:5173".to_string(),
        database_url: None,
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: crate::config::AuthConfig {
            native: crate::config::NativeAuthConfig {
                password: crate::config::PasswordConfig {
                    argon2_memory_kib: 128, // 128 KB (vs 19 MB production)
                    argon2_iterations: 1,   // 1 iteration (vs 2 production)
                    argon2_parallelism: 1,  // 1 thread
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        },
        email: crate::config::EmailConfig {
            transport: crate::config::EmailTransportConfig::File {
                path: temp_dir.to_string_lossy().to_string(),
            },
            ..Default::default()
        },
    }
}

/// Create a user with a random username/email and the given password.
pub async fn create_test_user(pool: &PgPool, role: Role, password: &str) -> UserResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let user_id = Uuid::new_v4();
    let username = format!("testuser_{}", user_id.simple());
    let email = format!("{username}@example.com");

    let password_hash = password::hash_string_with_params(
        password,
        Some(password::Argon2Params {
            memory_kib: 128,
            iterations: 1,
            parallelism: 1,
        }),
    )
    .expect("Failed to hash test password");

    let user_create = UserCreateDBRequest {
        full_name: "Test User".to_string(),
        username,
        email,
        contact: None,
        role,
        password_hash: Some(password_hash),
    };

    let user = users_repo.create(&user_create).await.expect("Failed to create test user");
    UserResponse::from(user)
}

/// Build a `jwt=...` cookie header value carrying a valid session for the user.
pub fn session_cookie_for(user: &UserResponse, config: &crate::config::Config) -> String {
    let current_user = CurrentUser {
        id: user.id,
        role: user.role,
    };
    let token = session::create_session_token(&current_user, config).expect("Failed to create session token");
    format!("{}={token}", config.auth.native.session.cookie_name)
}
