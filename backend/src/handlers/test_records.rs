//! HTTP handlers for quality test records

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{Pagination, TestStatus};
use uuid::Uuid;

use super::{list_or_csv, wants_csv, ApiResponse, ApiResult};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::test_record::{
    CreateTestRecordInput, TestRecord, TestRecordCreated, TestRecordFilter, TestRecordStats,
    TestStatusUpdate, UpdateTestRecordInput, UpdateTestStatusInput,
};
use crate::services::TestRecordService;
use crate::AppState;

/// Flat export row; JSON columns are rendered as text
#[derive(Debug, Serialize)]
pub struct TestRecordCsvRow {
    pub test_no: String,
    pub formula_name: String,
    pub formula_version: Option<String>,
    pub order_no: Option<String>,
    pub test_type: String,
    pub status: TestStatus,
    pub test_standard: Option<String>,
    pub tester: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub results: Option<String>,
    pub conclusion: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<TestRecord> for TestRecordCsvRow {
    fn from(record: TestRecord) -> Self {
        Self {
            test_no: record.test_no,
            formula_name: record.formula_name,
            formula_version: record.formula_version,
            order_no: record.order_no,
            test_type: record.test_type,
            status: record.status,
            test_standard: record.test_standard,
            tester: record.tester,
            start_date: record.start_date,
            end_date: record.end_date,
            results: record.results.map(|r| r.to_string()),
            conclusion: record.conclusion,
            created_by: record.created_by,
            created_at: record.created_at,
        }
    }
}

/// List test records; `format=csv` downloads the page as CSV
pub async fn list_test_records(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<TestRecordFilter>,
) -> AppResult<Response> {
    let page = Pagination::from_query(filter.skip, filter.limit);
    let service = TestRecordService::new(state.db.clone(), &state.config);
    let (items, total) = service.list_test_records(&filter, page).await?;

    let format = filter.format.as_deref();
    if wants_csv(format) {
        let rows: Vec<TestRecordCsvRow> = items.into_iter().map(Into::into).collect();
        return list_or_csv(rows, total, page, format, "test_records.csv");
    }
    list_or_csv(items, total, page, format, "test_records.csv")
}

/// Create a test record with advisory warnings
pub async fn create_test_record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateTestRecordInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<TestRecordCreated>>)> {
    user.require_write()?;
    let service = TestRecordService::new(state.db.clone(), &state.config);
    let created = service.create_test_record(input, &user.username).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(created)))
}

pub async fn get_test_record(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(test_id): Path<Uuid>,
) -> ApiResult<TestRecord> {
    let service = TestRecordService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_test_record(test_id).await?))
}

pub async fn update_test_record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(test_id): Path<Uuid>,
    Json(input): Json<UpdateTestRecordInput>,
) -> ApiResult<TestRecord> {
    user.require_write()?;
    let service = TestRecordService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.update_test_record(test_id, input).await?))
}

pub async fn delete_test_record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(test_id): Path<Uuid>,
) -> ApiResult<()> {
    user.require_write()?;
    let service = TestRecordService::new(state.db.clone(), &state.config);
    service.delete_test_record(test_id).await?;
    Ok(ApiResponse::with_message((), "Test record deleted"))
}

/// Move a test through its lifecycle
pub async fn update_test_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(test_id): Path<Uuid>,
    Json(input): Json<UpdateTestStatusInput>,
) -> ApiResult<TestStatusUpdate> {
    user.require_write()?;
    let service = TestRecordService::new(state.db.clone(), &state.config);
    let update = service.update_test_status(test_id, input, &user.username).await?;
    let message = update.message.clone();
    Ok(ApiResponse::with_message(update, message))
}

pub async fn get_test_stats(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<TestRecordStats> {
    let service = TestRecordService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_stats().await?))
}
