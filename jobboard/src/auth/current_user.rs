//! Request extractor that turns a session credential into a [`CurrentUser`].
//!
//! The credential is taken from the session cookie if present, otherwise from
//! an `Authorization: Bearer` header. Exactly one credential is selected
//! before verification: a present-but-invalid cookie is not retried against
//! the header.

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    errors::{Error, Result},
    types::abbrev_uuid,
};
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use tracing::{debug, instrument};

/// Find the session cookie in the Cookie header, if any.
fn credential_from_cookie(parts: &Parts, cookie_name: &str) -> Result<Option<String>> {
    let Some(cookie_header) = parts.headers.get(header::COOKIE) else {
        return Ok(None);
    };

    let cookie_str = cookie_header.to_str().map_err(|e| Error::BadRequest {
        message: format!("Invalid cookie header: {e}"),
    })?;

    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=') {
            if name == cookie_name {
                return Ok(Some(value.to_string()));
            }
        }
    }
    Ok(None)
}

/// Find a Bearer token in the Authorization header, if any.
fn credential_from_bearer(parts: &Parts) -> Result<Option<String>> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header.to_str().map_err(|e| Error::BadRequest {
        message: format!("Invalid authorization header: {e}"),
    })?;

    Ok(auth_str.strip_prefix("Bearer ").map(|t| t.to_string()))
}

/// Authenticate a request against the configured session secret.
///
/// Credential precedence: session cookie first, then Bearer header. Missing
/// credentials yield a 401 "No token provided"; failed verification yields a
/// 401 "Invalid token or expired token".
pub fn authenticate(parts: &Parts, config: &Config) -> Result<CurrentUser> {
    let token = match credential_from_cookie(parts, &config.auth.native.session.cookie_name)? {
        Some(token) => Some(token),
        None => credential_from_bearer(parts)?,
    };

    let Some(token) = token else {
        return Err(Error::Unauthenticated { message: None });
    };

    session::verify_session_token(&token, config)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = authenticate(parts, &state.config)?;
        debug!("Authenticated user: {}", abbrev_uuid(&user.id));
        Ok(user)
    }
}
