//! User administration handlers

use axum::{extract::State, http::StatusCode, Json};

use super::{ApiResponse, ApiResult};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::auth::{CreateUserInput, UserProfile};
use crate::services::AuthService;
use crate::AppState;

/// List user accounts (admin only)
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<UserProfile>> {
    user.require_admin()?;
    let service = AuthService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.list_users().await?))
}

/// Create a user account (admin only)
pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserProfile>>)> {
    user.require_admin()?;
    let service = AuthService::new(state.db.clone(), &state.config);
    let created = service.create_user(input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(created)))
}
