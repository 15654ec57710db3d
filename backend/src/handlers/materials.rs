//! HTTP handlers for material master data and stock operations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{ListResponse, Pagination};
use uuid::Uuid;
use validator::Validate;

use super::{list_or_csv, ApiResponse, ApiResult};
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::ledger::{StockOperation, StockOperationInput, StockOperationRequest, StockOperationResult};
use crate::services::material::{
    CreateMaterialInput, Material, MaterialFilter, MaterialOption, MaterialStats, UpdateMaterialInput,
};
use crate::services::{LedgerService, MaterialService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NextCodeQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextCodeResponse {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OperationsPageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// List materials; `format=csv` downloads the page as CSV
pub async fn list_materials(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<MaterialFilter>,
) -> AppResult<Response> {
    let page = Pagination::from_query(filter.skip, filter.limit);
    let service = MaterialService::new(state.db.clone(), &state.config);
    let (items, total) = service.list_materials(&filter, page).await?;
    list_or_csv(items, total, page, filter.format.as_deref(), "materials.csv")
}

/// Create a material; opening stock is booked through the ledger
pub async fn create_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateMaterialInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Material>>)> {
    user.require_write()?;
    let service = MaterialService::new(state.db.clone(), &state.config);
    let material = service.create_material(input, &user.username).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(material)))
}

pub async fn get_material(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(material_id): Path<Uuid>,
) -> ApiResult<Material> {
    let service = MaterialService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_material(material_id).await?))
}

/// Update material metadata
pub async fn update_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(material_id): Path<Uuid>,
    Json(input): Json<UpdateMaterialInput>,
) -> ApiResult<Material> {
    user.require_write()?;
    let service = MaterialService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.update_material(material_id, input).await?))
}

pub async fn delete_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(material_id): Path<Uuid>,
) -> ApiResult<()> {
    user.require_write()?;
    let service = MaterialService::new(state.db.clone(), &state.config);
    service.delete_material(material_id).await?;
    Ok(ApiResponse::with_message((), "Material deleted"))
}

pub async fn get_material_stats(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<MaterialStats> {
    let service = MaterialService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_stats().await?))
}

pub async fn list_low_stock_materials(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<LowStockQuery>,
) -> ApiResult<Vec<Material>> {
    let service = MaterialService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.list_low_stock(query.limit).await?))
}

pub async fn get_material_options(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Vec<MaterialOption>> {
    let service = MaterialService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_options().await?))
}

/// Next unused material code, optionally within one series (`prefix=L`)
pub async fn get_next_material_code(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<NextCodeQuery>,
) -> ApiResult<NextCodeResponse> {
    let prefix = match query.prefix.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(p) => {
            let mut chars = p.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c.to_ascii_uppercase()),
                _ => {
                    return Err(AppError::validation(
                        "prefix",
                        "Prefix must be a single letter",
                        "前缀必须是单个字母",
                    ))
                }
            }
        }
    };

    let service = MaterialService::new(state.db.clone(), &state.config);
    let code = service.next_code(prefix).await?;
    Ok(ApiResponse::ok(NextCodeResponse { code }))
}

/// Ledger entry point: apply an in/out/adjust operation to a material
pub async fn apply_stock_operation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(material_id): Path<Uuid>,
    Json(input): Json<StockOperationInput>,
) -> ApiResult<StockOperationResult> {
    user.require_write()?;
    input.validate()?;

    let request = StockOperationRequest {
        material_id,
        operation_type: input.operation_type,
        quantity: input.quantity,
        reason: input.reason,
        reference_no: input.reference_no,
        batch_no: input.batch_no,
        approved_by: input.approved_by.unwrap_or_else(|| user.username.clone()),
        created_by: user.username.clone(),
    };

    let service = LedgerService::new(state.db.clone(), &state.config);
    let result = service.apply_stock_operation(request).await?;
    Ok(ApiResponse::with_message(result, "Stock operation recorded"))
}

/// Ledger entries for one material
pub async fn list_material_operations(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(material_id): Path<Uuid>,
    Query(query): Query<OperationsPageQuery>,
) -> ApiResult<ListResponse<StockOperation>> {
    let page = Pagination::from_query(query.skip, query.limit);
    let service = LedgerService::new(state.db.clone(), &state.config);
    let (items, total) = service.list_for_material(material_id, page).await?;
    Ok(ApiResponse::ok(ListResponse::new(items, total, page)))
}
