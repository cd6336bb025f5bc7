use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    api::models::{
        auth::AuthSuccessResponse,
        users::{CurrentUser, ListUsersQuery, Role, UserResponse},
    },
    auth::policy,
    db::handlers::{Repository, UserFilter, Users},
    errors::Error,
    types::UserId,
};

/// List all users (admin only)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "List of users", body = Vec<UserResponse>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip(state, current_user))]
pub async fn list_users(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, Error> {
    policy::require_role(&current_user, &[Role::Admin])?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let filter = UserFilter::new(query.skip.unwrap_or(0), query.limit.unwrap_or(100));
    let users = user_repo.list(&filter).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Get a user by id (admin or the account owner)
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(
        ("id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = UserResponse),
        (status = 403, description = "Not authorized to view this user"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip(state, current_user))]
pub async fn get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>, Error> {
    policy::authorize_owner(&current_user, id)?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let user = user_repo.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(UserResponse::from(user)))
}

/// Delete a user (admin only)
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(
        ("id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deleted", body = AuthSuccessResponse),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip(state, current_user))]
pub async fn delete_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    policy::require_role(&current_user, &[Role::Admin])?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let deleted = user_repo.delete(id).await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        });
    }

    Ok(Json(AuthSuccessResponse {
        message: "User deleted successfully".to_string(),
    }))
}
