//! Administrative handlers

use axum::extract::State;

use super::{ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::services::seed::SeedReport;
use crate::services::SeedService;
use crate::AppState;

/// Load the demo suppliers, materials and formulas (admin only)
pub async fn seed_demo_data(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<SeedReport> {
    user.require_admin()?;
    let service = SeedService::new(state.db.clone(), &state.config);
    let report = service.seed_demo_data(&user.username).await?;

    let message = if report.is_empty() {
        "Demo data already present"
    } else {
        "Demo data seeded"
    };
    Ok(ApiResponse::with_message(report, message))
}
