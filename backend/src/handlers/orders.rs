//! HTTP handlers for the order lifecycle

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{MaterialRequirement, Pagination};
use uuid::Uuid;

use super::{header_value, list_or_csv, ApiResponse, ApiResult};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::order::{
    resolve_creator_code, CreateOrderInput, Order, OrderCreated, OrderFilter, OrderOption, OrderStats,
    UpdateOrderInput,
};
use crate::services::test_record::{CreateOrderTestsInput, OrderTestsCreated, TestRecord, TestRecordCreated};
use crate::services::{OrderService, TestRecordService};
use crate::AppState;

const CREATOR_CODE_HEADER: &str = "x-creator-code";
const APPROVED_BY_HEADER: &str = "x-approved-by";

/// Order with its live material requirements
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub material_requirements: Vec<MaterialRequirement>,
    pub tracking_url: Option<String>,
}

/// PATCH body: general fields, plus an optional status transition
#[derive(Debug, Deserialize)]
pub struct OrderPatch {
    pub status: Option<String>,
    pub cancel_reason: Option<String>,
    #[serde(flatten)]
    pub fields: UpdateOrderInput,
}

/// Body of a bare status transition
#[derive(Debug, Deserialize)]
pub struct OrderStatusInput {
    pub status: String,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OrderTestsResponse {
    Single(TestRecordCreated),
    Batch(OrderTestsCreated),
}

/// List orders; `format=csv` downloads the page as CSV
pub async fn list_orders(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Response> {
    let page = Pagination::from_query(filter.skip, filter.limit);
    let service = OrderService::new(state.db.clone(), &state.config);
    let (items, total) = service.list_orders(&filter, page).await?;
    list_or_csv(items, total, page, filter.format.as_deref(), "orders.csv")
}

/// Create an order with an advisory stock check
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<OrderCreated>>)> {
    user.require_write()?;

    let created_by = input.created_by.clone().unwrap_or_else(|| user.username.clone());
    let creator_code = resolve_creator_code(
        header_value(&headers, CREATOR_CODE_HEADER),
        user.creator_code,
        &created_by,
    )?;

    let service = OrderService::new(state.db.clone(), &state.config);
    let created = service
        .create_order_with_stock_check(input, &created_by, creator_code)
        .await?;

    let message = if created.warnings.is_empty() {
        "Order created".to_string()
    } else {
        format!("Order created with {} warning(s)", created.warnings.len())
    };

    Ok((StatusCode::CREATED, ApiResponse::with_message(created, message)))
}

pub async fn get_order(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let service = OrderService::new(state.db.clone(), &state.config);
    let order = service.get_order(order_id).await?;
    let material_requirements = service.get_order_material_requirements(order_id).await?;
    Ok(ApiResponse::ok(OrderDetail {
        tracking_url: order.tracking_url(),
        order,
        material_requirements,
    }))
}

/// Update order fields; a `status` field runs the lifecycle transition
pub async fn update_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(patch): Json<OrderPatch>,
) -> ApiResult<Order> {
    user.require_write()?;
    let approved_by = header_value(&headers, APPROVED_BY_HEADER).unwrap_or(&user.username);

    let service = OrderService::new(state.db.clone(), &state.config);
    let patched = service
        .patch_order(
            order_id,
            patch.fields,
            patch.status.as_deref(),
            approved_by,
            &user.username,
            patch.cancel_reason,
        )
        .await?;

    Ok(match patched.message {
        Some(message) => ApiResponse::with_message(patched.order, message),
        None => ApiResponse::ok(patched.order),
    })
}

/// Run a status transition on its own, honouring `x-approved-by`
pub async fn update_order_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(input): Json<OrderStatusInput>,
) -> ApiResult<Order> {
    user.require_write()?;
    let approved_by = header_value(&headers, APPROVED_BY_HEADER).unwrap_or(&user.username);

    let service = OrderService::new(state.db.clone(), &state.config);
    let update = service
        .update_order_status(order_id, &input.status, approved_by, &user.username, input.cancel_reason)
        .await?;

    Ok(ApiResponse::with_message(update.order, update.message))
}

/// Delete a pending or cancelled order
pub async fn delete_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<()> {
    user.require_write()?;
    let service = OrderService::new(state.db.clone(), &state.config);
    service.delete_order(order_id).await?;
    Ok(ApiResponse::with_message((), "Order deleted"))
}

pub async fn get_order_stats(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<OrderStats> {
    let service = OrderService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_stats().await?))
}

/// Pending orders for pickers
pub async fn get_order_options(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Vec<OrderOption>> {
    let service = OrderService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_options().await?))
}

pub async fn get_order_by_no(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(order_no): Path<String>,
) -> ApiResult<Order> {
    let service = OrderService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.get_order_by_no(&order_no).await?))
}

pub async fn list_order_tests(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<TestRecord>> {
    let orders = OrderService::new(state.db.clone(), &state.config);
    orders.get_order(order_id).await?;

    let service = TestRecordService::new(state.db.clone(), &state.config);
    Ok(ApiResponse::ok(service.list_for_order(order_id).await?))
}

/// Open one test, or one per listed type, against the order's formula
pub async fn create_order_tests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<CreateOrderTestsInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<OrderTestsResponse>>)> {
    user.require_write()?;
    let service = TestRecordService::new(state.db.clone(), &state.config);

    let types = input.types();
    let response = match types.as_slice() {
        [single] => OrderTestsResponse::Single(
            service
                .create_test_for_order(order_id, single, &input.tester, &user.username)
                .await?,
        ),
        _ => OrderTestsResponse::Batch(
            service
                .create_batch_tests_for_order(order_id, &types, &input.tester, &user.username)
                .await?,
        ),
    };

    Ok((StatusCode::CREATED, ApiResponse::ok(response)))
}
