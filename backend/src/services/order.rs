//! Order lifecycle: creation with stock check, status transitions and
//! automatic material deduction

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    assess_requirements, compute_requirements, creator_code_from_name, format_order_no,
    is_valid_tracking_number, normalize_creator_code, shipping_company, shipping_query_url,
    shortages, validate_phone, MaterialRequirement, OrderPriority, OrderStatus, OrderType,
    Pagination, StockOperationType,
};
use sqlx::{FromRow, PgConnection, PgPool};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::retry::with_retry;
use crate::services::formula::{find_formula, load_bom_lines};
use crate::services::ledger::{apply_stock_operation_in, StockOperationRequest};
use crate::services::sequence::{self, ORDER_SEQUENCE};

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_no: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub priority: OrderPriority,
    pub formula_id: Option<Uuid>,
    pub formula_version: Option<String>,
    pub quantity: i32,
    pub unit: String,
    pub delivery_date: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub remarks: Option<String>,
    pub created_by: String,
    pub creator_code: String,
    pub shipping_no: Option<String>,
    pub shipping_company: Option<String>,
    pub shipping_date: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Courier tracking page once a tracking number is recorded
    pub fn tracking_url(&self) -> Option<String> {
        let tracking_no = self.shipping_no.as_deref().filter(|n| !n.trim().is_empty())?;
        Some(shipping_query_url(
            self.shipping_company.as_deref().unwrap_or_default(),
            tracking_no,
        ))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderInput {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(length(max = 50))]
    pub contact_person: Option<String>,
    #[validate(length(max = 20))]
    pub contact_phone: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub order_type: Option<OrderType>,
    pub priority: Option<OrderPriority>,
    pub formula_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 20, message = "Unit is required"))]
    pub unit: String,
    pub delivery_date: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub remarks: Option<String>,
    /// Defaults to the authenticated user
    #[validate(length(min = 1, max = 50))]
    pub created_by: Option<String>,
}

/// General order fields. Status is changed only through the lifecycle
/// transition, see [`OrderService::patch_order`].
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrderInput {
    #[validate(length(min = 1, max = 100))]
    pub customer_name: Option<String>,
    #[validate(length(max = 50))]
    pub contact_person: Option<String>,
    #[validate(length(max = 20))]
    pub contact_phone: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub priority: Option<OrderPriority>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub remarks: Option<String>,
    #[validate(length(max = 50))]
    pub shipping_no: Option<String>,
    #[validate(length(max = 50))]
    pub shipping_company: Option<String>,
}

impl UpdateOrderInput {
    pub fn is_empty(&self) -> bool {
        self.customer_name.is_none()
            && self.contact_person.is_none()
            && self.contact_phone.is_none()
            && self.contact_email.is_none()
            && self.priority.is_none()
            && self.delivery_date.is_none()
            && self.total_amount.is_none()
            && self.remarks.is_none()
            && self.shipping_no.is_none()
            && self.shipping_company.is_none()
    }

    /// Field checks the derive cannot express
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        check_contact_phone(self.contact_phone.as_deref())?;

        if let Some(no) = self.shipping_no.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if !is_valid_tracking_number(no) {
                return Err(AppError::validation(
                    "shipping_no",
                    "Tracking number must be 8 to 20 letters or digits",
                    "快递单号应为 8 到 20 位字母或数字",
                ));
            }
        }
        if let Some(code) = self.shipping_company.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            if shipping_company(code).is_none() {
                return Err(AppError::validation(
                    "shipping_company",
                    format!("Unknown shipping company: {}", code),
                    "不支持的快递公司",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub order_type: Option<OrderType>,
    /// Matches customer name or order number
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub format: Option<String>,
}

/// Result of order creation
#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub order: Order,
    pub material_requirements: Vec<MaterialRequirement>,
    pub low_stock_materials: Vec<String>,
    pub warnings: Vec<String>,
}

/// Result of a status transition
#[derive(Debug, Serialize)]
pub struct OrderStatusUpdate {
    pub order: Order,
    pub message: String,
}

/// Result of a field update with an optional status transition
#[derive(Debug, Serialize)]
pub struct OrderPatched {
    pub order: Order,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct OrderStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct OrderOption {
    pub id: Uuid,
    pub order_no: String,
    pub customer_name: String,
}

pub(crate) const ORDER_COLUMNS: &str = "id, order_no, customer_id, customer_name, contact_person, \
    contact_phone, contact_email, order_type, status, priority, formula_id, formula_version, \
    quantity, unit, delivery_date, total_amount, remarks, created_by, creator_code, shipping_no, \
    shipping_company, shipping_date, cancel_reason, created_at, updated_at";

fn check_contact_phone(phone: Option<&str>) -> AppResult<()> {
    match phone.filter(|p| !p.trim().is_empty()) {
        Some(phone) => validate_phone(phone)
            .map_err(|msg| AppError::validation("contact_phone", msg, "联系电话格式无效")),
        None => Ok(()),
    }
}

/// Resolve the creator code stamped into an order number.
///
/// An explicit code wins, then the user's own code, then the first letter
/// of the creator's name.
pub fn resolve_creator_code(
    explicit: Option<&str>,
    user_code: Option<char>,
    created_by: &str,
) -> AppResult<char> {
    if let Some(raw) = explicit.filter(|s| !s.trim().is_empty()) {
        return normalize_creator_code(raw)
            .map_err(|msg| AppError::validation("creator_code", msg, "创建人代码必须是单个字母"));
    }

    user_code
        .or_else(|| creator_code_from_name(created_by))
        .ok_or_else(|| {
            AppError::validation(
                "creator_code",
                "Creator code could not be derived from the creator name",
                "无法从创建人姓名推导创建人代码",
            )
        })
}

/// Aggregate error naming every material that cannot cover its demand
fn shortage_error(order_no: &str, requirements: &[MaterialRequirement]) -> Option<AppError> {
    let short = shortages(requirements);
    if short.is_empty() {
        return None;
    }

    let details: Vec<String> = short
        .iter()
        .map(|r| {
            format!(
                "{} (required: {}, available: {})",
                r.material_code, r.required_quantity, r.current_stock
            )
        })
        .collect();

    Some(AppError::InsufficientStock {
        message: format!(
            "Order {} cannot start production, insufficient stock: {}",
            order_no,
            details.join(", ")
        ),
        materials: short.iter().map(|r| r.material_code.clone()).collect(),
    })
}

/// Lines that actually draw stock
fn deduction_plan(requirements: &[MaterialRequirement]) -> Vec<&MaterialRequirement> {
    requirements
        .iter()
        .filter(|r| r.required_quantity > Decimal::ZERO)
        .collect()
}

fn transition_message(order_no: &str, next: OrderStatus) -> String {
    match next {
        OrderStatus::Processing => format!("Order {} is now in production", order_no),
        OrderStatus::Completed => format!("Order {} completed", order_no),
        OrderStatus::Cancelled => format!("Order {} cancelled", order_no),
        OrderStatus::Pending => format!("Order {} is pending", order_no),
    }
}

pub(crate) async fn find_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE id = $1",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(conn)
    .await?;

    Ok(order)
}

/// Lock an order row for the rest of the transaction
pub(crate) async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Order".to_string()))
}

/// Issue every BOM material of a locked order from stock.
///
/// All materials are locked and checked before any deduction, so either
/// every line is issued or none is.
async fn auto_deduct_materials(
    conn: &mut PgConnection,
    order: &Order,
    approved_by: &str,
    operator: &str,
) -> AppResult<usize> {
    let Some(formula_id) = order.formula_id else {
        return Ok(0);
    };

    let lines = load_bom_lines(&mut *conn, formula_id, true).await?;
    let requirements = compute_requirements(&lines, order.quantity);

    if let Some(err) = shortage_error(&order.order_no, &requirements) {
        tracing::warn!(order_no = %order.order_no, "Automatic deduction rejected for insufficient stock");
        return Err(err);
    }

    let plan = deduction_plan(&requirements);
    for requirement in &plan {
        let request = StockOperationRequest {
            material_id: requirement.material_id,
            operation_type: StockOperationType::Out,
            quantity: requirement.required_quantity,
            reason: format!("Order {} production issue", order.order_no),
            reference_no: Some(order.order_no.clone()),
            batch_no: None,
            approved_by: approved_by.to_string(),
            created_by: operator.to_string(),
        };
        apply_stock_operation_in(&mut *conn, &request).await?;
    }

    Ok(plan.len())
}

/// Move a locked order to `next` on the caller's transaction.
///
/// Entering `processing` issues the formula's materials; entering
/// `completed` stamps the shipping date; entering `cancelled` records the
/// reason. Cancelling does not return issued stock.
pub(crate) async fn transition_order_in(
    conn: &mut PgConnection,
    order: &Order,
    next: OrderStatus,
    approved_by: &str,
    operator: &str,
    cancel_reason: Option<&str>,
) -> AppResult<Order> {
    order.status.transition_to(next)?;

    if next == OrderStatus::Processing {
        let issued = auto_deduct_materials(&mut *conn, order, approved_by, operator).await?;
        tracing::info!(order_no = %order.order_no, issued, "Order materials issued");
    }

    let updated = sqlx::query_as::<_, Order>(&format!(
        r#"
        UPDATE orders
        SET status = $2,
            shipping_date = CASE WHEN $2 = 'completed' THEN NOW() ELSE shipping_date END,
            cancel_reason = CASE WHEN $2 = 'cancelled' THEN $3 ELSE cancel_reason END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(next)
    .bind(cancel_reason)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        order_no = %updated.order_no,
        from = %order.status,
        to = %next,
        "Order status changed"
    );

    Ok(updated)
}

/// Write general order fields on the caller's transaction; absent fields
/// keep their current value
pub(crate) async fn update_order_in(
    conn: &mut PgConnection,
    existing: &Order,
    input: &UpdateOrderInput,
) -> AppResult<Order> {
    let shipping_no = input.shipping_no.as_deref().map(str::trim);
    let shipping_company = input
        .shipping_company
        .as_deref()
        .map(|code| shipping_company(code).map_or(code.trim(), |c| c.code));

    let order = sqlx::query_as::<_, Order>(&format!(
        r#"
        UPDATE orders
        SET customer_name = $2, contact_person = $3, contact_phone = $4, contact_email = $5,
            priority = $6, delivery_date = $7, total_amount = $8, remarks = $9,
            shipping_no = $10, shipping_company = $11, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(existing.id)
    .bind(input.customer_name.as_deref().map(str::trim).unwrap_or(&existing.customer_name))
    .bind(input.contact_person.as_ref().or(existing.contact_person.as_ref()))
    .bind(input.contact_phone.as_ref().or(existing.contact_phone.as_ref()))
    .bind(input.contact_email.as_ref().or(existing.contact_email.as_ref()))
    .bind(input.priority.unwrap_or(existing.priority))
    .bind(input.delivery_date.or(existing.delivery_date))
    .bind(input.total_amount.or(existing.total_amount))
    .bind(input.remarks.as_ref().or(existing.remarks.as_ref()))
    .bind(shipping_no.or(existing.shipping_no.as_deref()))
    .bind(shipping_company.or(existing.shipping_company.as_deref()))
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(order_no = %order.order_no, "Order updated");
    Ok(order)
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            retry: config.database.retry_policy(),
        }
    }

    /// Create an order and report its material demand against current stock.
    ///
    /// Stock shortages never block creation; they are returned as warnings.
    pub async fn create_order_with_stock_check(
        &self,
        input: CreateOrderInput,
        created_by: &str,
        creator_code: char,
    ) -> AppResult<OrderCreated> {
        input.validate()?;
        check_contact_phone(input.contact_phone.as_deref())?;
        let created_by = input.created_by.as_deref().unwrap_or(created_by).trim().to_string();
        if created_by.is_empty() {
            return Err(AppError::validation("created_by", "Creator is required", "请填写创建人"));
        }

        with_retry(&self.retry, "create_order", || {
            self.try_create_order(&input, &created_by, creator_code)
        })
        .await
    }

    async fn try_create_order(
        &self,
        input: &CreateOrderInput,
        created_by: &str,
        creator_code: char,
    ) -> AppResult<OrderCreated> {
        let mut tx = self.db.begin().await?;
        let mut warnings = Vec::new();

        let formula = match input.formula_id {
            Some(formula_id) => {
                let formula = find_formula(&mut tx, formula_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Formula".to_string()))?;
                if !formula.is_published {
                    warnings.push(format!("Formula {} is not published", formula.code));
                }
                Some(formula)
            }
            None => None,
        };

        let today = Utc::now().date_naive();
        let seq = sequence::next_value(&mut tx, ORDER_SEQUENCE, today).await?;
        let order_no = format_order_no(today, seq, creator_code);

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (
                order_no, customer_id, customer_name, contact_person, contact_phone, contact_email,
                order_type, status, priority, formula_id, formula_version, quantity, unit,
                delivery_date, total_amount, remarks, created_by, creator_code
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(&order_no)
        .bind(input.customer_id)
        .bind(input.customer_name.trim())
        .bind(&input.contact_person)
        .bind(&input.contact_phone)
        .bind(&input.contact_email)
        .bind(input.order_type.unwrap_or_default())
        .bind(input.priority.unwrap_or_default())
        .bind(input.formula_id)
        .bind(formula.as_ref().map(|f| f.version.clone()))
        .bind(input.quantity)
        .bind(input.unit.trim())
        .bind(input.delivery_date)
        .bind(input.total_amount)
        .bind(&input.remarks)
        .bind(created_by)
        .bind(creator_code.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let requirements = match &formula {
            Some(formula) => {
                let lines = load_bom_lines(&mut tx, formula.id, false).await?;
                compute_requirements(&lines, order.quantity)
            }
            None => Vec::new(),
        };

        tx.commit().await?;

        let check = assess_requirements(&requirements);
        warnings.extend(check.warnings);

        tracing::info!(
            order_no = %order.order_no,
            customer = %order.customer_name,
            quantity = order.quantity,
            "Order created"
        );
        if !check.low_stock_materials.is_empty() {
            tracing::warn!(
                order_no = %order.order_no,
                materials = ?check.low_stock_materials,
                "Order created with insufficient material stock"
            );
        }

        Ok(OrderCreated {
            order,
            material_requirements: requirements,
            low_stock_materials: check.low_stock_materials,
            warnings,
        })
    }

    /// Apply a status transition, issuing materials when production starts.
    ///
    /// The whole change runs in one transaction with the order locked; a
    /// rejected deduction leaves the order untouched.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: &str,
        approved_by: &str,
        operator: &str,
        cancel_reason: Option<String>,
    ) -> AppResult<OrderStatusUpdate> {
        let patched = self
            .patch_order(
                order_id,
                UpdateOrderInput::default(),
                Some(new_status),
                approved_by,
                operator,
                cancel_reason,
            )
            .await?;

        Ok(OrderStatusUpdate {
            message: patched.message.unwrap_or_default(),
            order: patched.order,
        })
    }

    /// Live material requirements of an order; empty without a formula
    pub async fn get_order_material_requirements(
        &self,
        order_id: Uuid,
    ) -> AppResult<Vec<MaterialRequirement>> {
        let mut conn = self.db.acquire().await?;
        let order = find_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        match order.formula_id {
            Some(formula_id) => {
                let lines = load_bom_lines(&mut conn, formula_id, false).await?;
                Ok(compute_requirements(&lines, order.quantity))
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> AppResult<Order> {
        let mut conn = self.db.acquire().await?;
        find_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    pub async fn get_order_by_no(&self, order_no: &str) -> AppResult<Order> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_no = $1",
            ORDER_COLUMNS
        ))
        .bind(order_no)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    pub async fn list_orders(&self, filter: &OrderFilter, page: Pagination) -> AppResult<(Vec<Order>, i64)> {
        const WHERE: &str = r#"
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::varchar IS NULL OR order_type = $2)
              AND ($3::varchar IS NULL OR customer_name ILIKE '%' || $3 || '%' OR order_no ILIKE '%' || $3 || '%')
        "#;

        let status = filter.status.map(|s| s.as_str());
        let order_type = filter.order_type.map(|t| t.as_str());
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
            ORDER_COLUMNS, WHERE
        ))
        .bind(status)
        .bind(order_type)
        .bind(search)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM orders {}", WHERE))
            .bind(status)
            .bind(order_type)
            .bind(search)
            .fetch_one(&self.db)
            .await?;

        Ok((orders, total))
    }

    /// Pending orders, newest first
    pub async fn list_pending(&self, limit: i64) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE status = 'pending' ORDER BY created_at DESC LIMIT $1",
            ORDER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }

    /// Update general fields and optionally run a status transition, as
    /// one transaction.
    ///
    /// Everything is validated before the first write; a rejected
    /// transition leaves the fields untouched too.
    pub async fn patch_order(
        &self,
        order_id: Uuid,
        fields: UpdateOrderInput,
        new_status: Option<&str>,
        approved_by: &str,
        operator: &str,
        cancel_reason: Option<String>,
    ) -> AppResult<OrderPatched> {
        fields.check()?;
        let next = new_status
            .map(|s| OrderStatus::from_str(s.trim()))
            .transpose()?;

        with_retry(&self.retry, "patch_order", || {
            self.try_patch_order(order_id, &fields, next, approved_by, operator, cancel_reason.as_deref())
        })
        .await
    }

    async fn try_patch_order(
        &self,
        order_id: Uuid,
        fields: &UpdateOrderInput,
        next: Option<OrderStatus>,
        approved_by: &str,
        operator: &str,
        cancel_reason: Option<&str>,
    ) -> AppResult<OrderPatched> {
        let mut tx = self.db.begin().await?;

        let mut order = lock_order(&mut tx, order_id).await?;
        if !fields.is_empty() {
            order = update_order_in(&mut tx, &order, fields).await?;
        }

        let mut message = None;
        if let Some(next) = next {
            order = transition_order_in(&mut tx, &order, next, approved_by, operator, cancel_reason).await?;
            message = Some(transition_message(&order.order_no, next));
        }

        tx.commit().await?;

        Ok(OrderPatched { order, message })
    }

    /// Delete a pending or cancelled order
    pub async fn delete_order(&self, order_id: Uuid) -> AppResult<()> {
        let order = self.get_order(order_id).await?;

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Cancelled) {
            return Err(AppError::Conflict {
                resource: "order".to_string(),
                message: format!(
                    "Order {} is {} and cannot be deleted",
                    order.order_no, order.status
                ),
                message_zh: "只能删除待处理或已取消的订单".to_string(),
            });
        }

        sqlx::query("DELETE FROM orders WHERE id = $1 AND status IN ('pending', 'cancelled')")
            .bind(order_id)
            .execute(&self.db)
            .await?;

        tracing::info!(order_no = %order.order_no, "Order deleted");
        Ok(())
    }

    pub async fn get_stats(&self) -> AppResult<OrderStats> {
        let stats = sqlx::query_as::<_, OrderStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled
            FROM orders
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(stats)
    }

    /// Pending orders, for pickers
    pub async fn get_options(&self) -> AppResult<Vec<OrderOption>> {
        let options = sqlx::query_as::<_, OrderOption>(
            "SELECT id, order_no, customer_name FROM orders WHERE status = 'pending' ORDER BY created_at DESC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement(code: &str, required: i64, stock: i64) -> MaterialRequirement {
        MaterialRequirement {
            material_id: Uuid::new_v4(),
            material_code: code.to_string(),
            material_name: code.to_string(),
            required_quantity: Decimal::from(required),
            current_stock: Decimal::from(stock),
            min_stock: Decimal::ZERO,
            is_sufficient: stock >= required,
        }
    }

    #[test]
    fn test_explicit_creator_code_wins() {
        assert_eq!(resolve_creator_code(Some("j"), Some('A'), "bob").unwrap(), 'J');
    }

    #[test]
    fn test_creator_code_falls_back_to_user_then_name() {
        assert_eq!(resolve_creator_code(None, Some('A'), "bob").unwrap(), 'A');
        assert_eq!(resolve_creator_code(None, None, "bob").unwrap(), 'B');
        assert_eq!(resolve_creator_code(Some("  "), None, "kim").unwrap(), 'K');
    }

    #[test]
    fn test_invalid_creator_code_rejected() {
        assert!(resolve_creator_code(Some("JK"), None, "bob").is_err());
        assert!(resolve_creator_code(Some("7"), None, "bob").is_err());
        assert!(resolve_creator_code(None, None, "7bob").is_err());
    }

    #[test]
    fn test_shortage_error_lists_every_short_material() {
        let reqs = vec![
            requirement("P01", 9, 5),
            requirement("L01", 2, 100),
            requirement("H03", 4, 0),
        ];
        match shortage_error("PE-20260117-006J", &reqs) {
            Some(AppError::InsufficientStock { message, materials }) => {
                assert_eq!(materials, vec!["P01".to_string(), "H03".to_string()]);
                assert!(message.contains("PE-20260117-006J"));
                assert!(message.contains("P01 (required: 9, available: 5)"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_no_shortage_error_when_covered() {
        assert!(shortage_error("PE-20260117-001A", &[requirement("P01", 9, 9)]).is_none());
    }

    #[test]
    fn test_zero_demand_lines_are_not_issued() {
        let reqs = vec![requirement("P01", 9, 10), requirement("L01", 0, 0)];
        let plan = deduction_plan(&reqs);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].material_code, "P01");
    }

    #[test]
    fn test_shipping_fields_checked() {
        let shipped = UpdateOrderInput {
            shipping_no: Some("SF1234567890".to_string()),
            shipping_company: Some("sf".to_string()),
            ..Default::default()
        };
        assert!(shipped.check().is_ok());

        let bad_no = UpdateOrderInput {
            shipping_no: Some("SF-12".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad_no.check(),
            Err(AppError::Validation { ref field, .. }) if field == "shipping_no"
        ));

        let bad_company = UpdateOrderInput {
            shipping_company: Some("Pigeon Post".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad_company.check(),
            Err(AppError::Validation { ref field, .. }) if field == "shipping_company"
        ));
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::services::fixtures::{
        dec, insert_formula, insert_material, insert_order, ledger_rows, material_stock, order_status,
    };

    fn service(pool: &PgPool) -> OrderService {
        OrderService {
            db: pool.clone(),
            retry: RetryPolicy::single_attempt(),
        }
    }

    #[sqlx::test]
    async fn test_start_production_issues_bom(pool: PgPool) {
        let p01 = insert_material(&pool, "P01", "10", "0").await;
        let formula_id = insert_formula(&pool, "F-001", &[(p01, "P01", "0.9")]).await;
        let order_id = insert_order(&pool, "PE-20260117-001T", Some(formula_id), 10, OrderStatus::Pending).await;

        let mut tx = pool.begin().await.unwrap();
        let order = lock_order(&mut tx, order_id).await.unwrap();
        let updated = transition_order_in(&mut tx, &order, OrderStatus::Processing, "qc", "operator", None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(material_stock(&pool, p01).await.0, dec("1"));
        assert_eq!(ledger_rows(&pool, p01).await, 1);

        let (quantity, reference_no): (Decimal, Option<String>) = sqlx::query_as(
            "SELECT quantity, reference_no FROM stock_operations WHERE material_id = $1",
        )
        .bind(p01)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(quantity, dec("9"));
        assert_eq!(reference_no.as_deref(), Some("PE-20260117-001T"));
    }

    #[sqlx::test]
    async fn test_shortage_keeps_order_pending(pool: PgPool) {
        let p01 = insert_material(&pool, "P01", "5", "0").await;
        let formula_id = insert_formula(&pool, "F-001", &[(p01, "P01", "0.9")]).await;
        let order_id = insert_order(&pool, "PE-20260117-002T", Some(formula_id), 10, OrderStatus::Pending).await;

        let err = service(&pool)
            .update_order_status(order_id, "processing", "qc", "operator", None)
            .await
            .unwrap_err();

        match err {
            AppError::InsufficientStock { materials, message } => {
                assert_eq!(materials, vec!["P01".to_string()]);
                assert!(message.contains("P01 (required: 9"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(order_status(&pool, order_id).await, OrderStatus::Pending);
        assert_eq!(material_stock(&pool, p01).await.0, dec("5"));
        assert_eq!(ledger_rows(&pool, p01).await, 0);
    }

    #[sqlx::test]
    async fn test_one_short_line_blocks_every_deduction(pool: PgPool) {
        let p02 = insert_material(&pool, "P02", "100", "0").await;
        let h01 = insert_material(&pool, "H01", "0.5", "0").await;
        let formula_id =
            insert_formula(&pool, "F-002", &[(p02, "P02", "0.85"), (h01, "H01", "0.1")]).await;
        let order_id = insert_order(&pool, "PE-20260117-003T", Some(formula_id), 10, OrderStatus::Pending).await;

        let err = service(&pool)
            .update_order_status(order_id, "processing", "qc", "operator", None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientStock { ref materials, .. } if materials == &["H01".to_string()]));
        assert_eq!(material_stock(&pool, p02).await.0, dec("100"));
        assert_eq!(ledger_rows(&pool, p02).await, 0);
    }

    #[sqlx::test]
    async fn test_patch_applies_fields_and_status_together(pool: PgPool) {
        let order_id = insert_order(&pool, "PE-20260117-004T", None, 3, OrderStatus::Pending).await;
        let fields = UpdateOrderInput {
            remarks: Some("customer withdrew".to_string()),
            ..Default::default()
        };

        let patched = service(&pool)
            .patch_order(order_id, fields, Some("cancelled"), "qc", "operator", Some("withdrawn".to_string()))
            .await
            .unwrap();

        assert_eq!(patched.order.status, OrderStatus::Cancelled);
        assert_eq!(patched.order.remarks.as_deref(), Some("customer withdrew"));
        assert_eq!(patched.order.cancel_reason.as_deref(), Some("withdrawn"));
        assert!(patched.message.is_some());
    }

    #[sqlx::test]
    async fn test_rejected_transition_rolls_back_fields(pool: PgPool) {
        let p01 = insert_material(&pool, "P01", "5", "0").await;
        let formula_id = insert_formula(&pool, "F-001", &[(p01, "P01", "0.9")]).await;
        let order_id = insert_order(&pool, "PE-20260117-005T", Some(formula_id), 10, OrderStatus::Pending).await;
        let service = service(&pool);

        let fields = UpdateOrderInput {
            remarks: Some("rush".to_string()),
            ..Default::default()
        };
        let err = service
            .patch_order(order_id, fields, Some("processing"), "qc", "operator", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));

        let fields = UpdateOrderInput {
            remarks: Some("rush".to_string()),
            ..Default::default()
        };
        let err = service
            .patch_order(order_id, fields, Some("shipped"), "qc", "operator", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));

        let order = service.get_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.remarks, None);
    }

    #[sqlx::test]
    async fn test_shipping_company_stored_as_code(pool: PgPool) {
        let order_id = insert_order(&pool, "PE-20260117-006T", None, 1, OrderStatus::Pending).await;
        let fields = UpdateOrderInput {
            shipping_no: Some("SF1234567890".to_string()),
            shipping_company: Some("sf".to_string()),
            ..Default::default()
        };

        let patched = service(&pool)
            .patch_order(order_id, fields, None, "qc", "operator", None)
            .await
            .unwrap();

        assert_eq!(patched.order.shipping_company.as_deref(), Some("SF"));
        assert!(patched.message.is_none());
        assert!(patched
            .order
            .tracking_url()
            .is_some_and(|url| url.ends_with("keyword=SF1234567890")));
    }
}
