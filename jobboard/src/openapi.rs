//! OpenAPI documentation for the job board API.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Security schemes: session cookie or bearer token, both carrying the same JWT.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "session_token".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("jwt"))),
            );
            components.security_schemes.insert(
                "bearer_token".to_string(),
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::passwords::request_password_reset,
        api::handlers::passwords::reset_password,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::delete_user,
    ),
    components(schemas(
        api::models::auth::RegisterRequest,
        api::models::auth::LoginRequest,
        api::models::auth::AuthResponse,
        api::models::auth::AuthSuccessResponse,
        api::models::auth::PasswordResetRequest,
        api::models::auth::PasswordResetConfirmRequest,
        api::models::auth::PasswordResetResponse,
        api::models::users::Role,
        api::models::users::UserResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "authentication", description = "Registration, login and logout"),
        (name = "passwords", description = "Password reset flow"),
        (name = "users", description = "User administration"),
    ),
    info(
        title = "Job Board API",
        description = "User accounts, sessions and password resets for the job board."
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        let json = spec.to_json().unwrap();
        assert!(json.contains("/users/register"));
        assert!(json.contains("/passwords/request-reset"));
        assert!(json.contains("session_token"));
    }
}
