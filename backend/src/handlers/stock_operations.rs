//! HTTP handlers for the stock ledger

use axum::{
    extract::{Query, State},
    response::Response,
};
use shared::Pagination;

use super::list_or_csv;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::ledger::StockOperationFilter;
use crate::services::LedgerService;
use crate::AppState;

/// List ledger entries across materials; `format=csv` downloads the page
pub async fn list_stock_operations(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<StockOperationFilter>,
) -> AppResult<Response> {
    let page = Pagination::from_query(filter.skip, filter.limit);
    let service = LedgerService::new(state.db.clone(), &state.config);
    let (items, total) = service.list(&filter, page).await?;
    list_or_csv(items, total, page, filter.format.as_deref(), "stock_operations.csv")
}
