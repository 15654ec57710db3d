//! HTTP handlers for supplier management

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ListResponse, Pagination};
use uuid::Uuid;

use super::{ApiResponse, ApiResult};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::supplier::{CreateSupplierInput, Supplier, SupplierFilter, UpdateSupplierInput};
use crate::services::SupplierService;
use crate::AppState;

pub async fn list_suppliers(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<SupplierFilter>,
) -> ApiResult<ListResponse<Supplier>> {
    let page = Pagination::from_query(filter.skip, filter.limit);
    let service = SupplierService::new(state.db);
    let (items, total) = service.list_suppliers(&filter, page).await?;
    Ok(ApiResponse::ok(ListResponse::new(items, total, page)))
}

pub async fn create_supplier(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateSupplierInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Supplier>>)> {
    user.require_write()?;
    let service = SupplierService::new(state.db);
    let supplier = service.create_supplier(input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(supplier)))
}

pub async fn get_supplier(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(supplier_id): Path<Uuid>,
) -> ApiResult<Supplier> {
    let service = SupplierService::new(state.db);
    Ok(ApiResponse::ok(service.get_supplier(supplier_id).await?))
}

pub async fn update_supplier(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(supplier_id): Path<Uuid>,
    Json(input): Json<UpdateSupplierInput>,
) -> ApiResult<Supplier> {
    user.require_write()?;
    let service = SupplierService::new(state.db);
    Ok(ApiResponse::ok(service.update_supplier(supplier_id, input).await?))
}

pub async fn delete_supplier(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(supplier_id): Path<Uuid>,
) -> ApiResult<()> {
    user.require_write()?;
    let service = SupplierService::new(state.db);
    service.delete_supplier(supplier_id).await?;
    Ok(ApiResponse::with_message((), "Supplier deleted"))
}
