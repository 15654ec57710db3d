//! Dashboard handler

use axum::extract::State;

use super::{ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::services::reporting::DashboardStats;
use crate::services::ReportingService;
use crate::AppState;

/// Aggregate counts plus the most urgent low-stock materials, pending
/// orders and pending tests
pub async fn get_dashboard_stats(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<DashboardStats> {
    let service = ReportingService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_dashboard_stats().await?))
}
