//! HTTP handlers for formulas and their bill of materials

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{ListResponse, MaterialRequirement, Pagination};
use uuid::Uuid;

use super::{ApiResponse, ApiResult};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::formula::{
    CreateFormulaInput, Formula, FormulaFilter, FormulaMaterialLine, FormulaOption, FormulaStats,
    SetFormulaMaterialsInput, UpdateFormulaInput,
};
use crate::services::test_record::TestRecord;
use crate::services::{FormulaService, TestRecordService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RequirementsQuery {
    pub quantity: i32,
}

pub async fn list_formulas(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<FormulaFilter>,
) -> ApiResult<ListResponse<Formula>> {
    let page = Pagination::from_query(filter.skip, filter.limit);
    let service = FormulaService::new(state.db.clone(), &state.config);
    let (items, total) = service.list_formulas(&filter, page).await?;
    Ok(ApiResponse::ok(ListResponse::new(items, total, page)))
}

pub async fn create_formula(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateFormulaInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Formula>>)> {
    user.require_write()?;
    let service = FormulaService::new(state.db.clone(), &state.config);
    let formula = service.create_formula(input, &user.username).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(formula)))
}

pub async fn get_formula(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(formula_id): Path<Uuid>,
) -> ApiResult<Formula> {
    let service = FormulaService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_formula(formula_id).await?))
}

pub async fn update_formula(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<Uuid>,
    Json(input): Json<UpdateFormulaInput>,
) -> ApiResult<Formula> {
    user.require_write()?;
    let service = FormulaService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.update_formula(formula_id, input).await?))
}

pub async fn delete_formula(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<Uuid>,
) -> ApiResult<()> {
    user.require_write()?;
    let service = FormulaService::new(state.db.clone(), &state.config);
    service.delete_formula(formula_id).await?;
    Ok(ApiResponse::with_message((), "Formula deleted"))
}

pub async fn get_formula_stats(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<FormulaStats> {
    let service = FormulaService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_stats().await?))
}

/// Published formulas for pickers
pub async fn get_formula_options(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Vec<FormulaOption>> {
    let service = FormulaService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_options().await?))
}

pub async fn get_formula_materials(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(formula_id): Path<Uuid>,
) -> ApiResult<Vec<FormulaMaterialLine>> {
    let service = FormulaService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_formula_materials(formula_id).await?))
}

/// Replace a formula's bill of materials
pub async fn set_formula_materials(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(formula_id): Path<Uuid>,
    Json(input): Json<SetFormulaMaterialsInput>,
) -> ApiResult<Vec<FormulaMaterialLine>> {
    user.require_write()?;
    let service = FormulaService::new(state.db.clone(), &state.config);
    let lines = service.set_formula_materials(formula_id, input).await?;
    Ok(ApiResponse::with_message(lines, "Formula materials updated"))
}

/// Material demand for `quantity` units of product
pub async fn get_formula_requirements(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(formula_id): Path<Uuid>,
    Query(query): Query<RequirementsQuery>,
) -> ApiResult<Vec<MaterialRequirement>> {
    let service = FormulaService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_requirements(formula_id, query.quantity).await?))
}

pub async fn list_formula_tests(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(formula_id): Path<Uuid>,
) -> ApiResult<Vec<TestRecord>> {
    let service = TestRecordService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.list_for_formula(formula_id).await?))
}
