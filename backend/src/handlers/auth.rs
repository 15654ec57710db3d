//! Authentication handlers

use axum::{extract::State, Json};

use super::{ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::services::auth::{AuthTokens, ChangePasswordInput, LoginInput, RefreshInput, UserProfile};
use crate::services::AuthService;
use crate::AppState;

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> ApiResult<AuthTokens> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.login(&body.username, &body.password).await?;
    Ok(ApiResponse::ok(tokens))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshInput>,
) -> ApiResult<AuthTokens> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh_token(&body.refresh_token).await?;
    Ok(ApiResponse::ok(tokens))
}

/// Change the caller's password
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ChangePasswordInput>,
) -> ApiResult<()> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service.change_password(user.user_id, body).await?;
    Ok(ApiResponse::with_message((), "Password changed"))
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<UserProfile> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let profile = auth_service.get_user(user.user_id).await?;
    Ok(ApiResponse::ok(profile))
}
