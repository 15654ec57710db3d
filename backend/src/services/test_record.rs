//! Quality test records and their link to order completion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{format_test_no, OrderStatus, Pagination, TestStatus};
use sqlx::{FromRow, PgConnection, PgPool};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::retry::with_retry;
use crate::services::formula::{find_formula, Formula};
use crate::services::order::{find_order, lock_order, transition_order_in, Order};
use crate::services::sequence::{self, TEST_SEQUENCE};

/// Test record service
#[derive(Clone)]
pub struct TestRecordService {
    db: PgPool,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestRecord {
    pub id: Uuid,
    pub test_no: String,
    pub formula_id: Uuid,
    pub formula_name: String,
    pub formula_version: Option<String>,
    pub order_id: Option<Uuid>,
    pub order_no: Option<String>,
    pub test_type: String,
    pub status: TestStatus,
    pub test_standard: Option<String>,
    pub tester: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub results: Option<serde_json::Value>,
    pub conclusion: Option<String>,
    pub attachments: Option<serde_json::Value>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTestRecordInput {
    /// Generated from the daily sequence when absent
    #[validate(length(min = 1, max = 50))]
    pub test_no: Option<String>,
    pub formula_id: Uuid,
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50, message = "Test type is required"))]
    pub test_type: String,
    #[validate(length(max = 50))]
    pub test_standard: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Tester is required"))]
    pub tester: String,
    pub results: Option<serde_json::Value>,
    pub conclusion: Option<String>,
    pub attachments: Option<serde_json::Value>,
}

/// Tests to open against an order, one record per type
#[derive(Debug, Deserialize)]
pub struct CreateOrderTestsInput {
    pub test_type: Option<String>,
    #[serde(default)]
    pub test_types: Vec<String>,
    pub tester: String,
}

impl CreateOrderTestsInput {
    /// The requested test types, single or batch
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for t in self.test_type.iter().chain(self.test_types.iter()) {
            let t = t.trim();
            if !t.is_empty() && !types.iter().any(|seen| seen == t) {
                types.push(t.to_string());
            }
        }
        types
    }
}

/// General test fields. Status is changed only through [`TestRecordService::update_test_status`].
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTestRecordInput {
    #[validate(length(min = 1, max = 50))]
    pub test_type: Option<String>,
    #[validate(length(max = 50))]
    pub test_standard: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub tester: Option<String>,
    pub results: Option<serde_json::Value>,
    pub conclusion: Option<String>,
    pub attachments: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTestStatusInput {
    pub status: String,
    pub conclusion: Option<String>,
    pub results: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestRecordFilter {
    pub status: Option<TestStatus>,
    pub formula_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    /// Matches test number, formula name or test type
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub format: Option<String>,
}

/// Created test record with advisory warnings
#[derive(Debug, Serialize)]
pub struct TestRecordCreated {
    pub test_record: TestRecord,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderTestsCreated {
    pub test_records: Vec<TestRecord>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TestStatusUpdate {
    pub test_record: TestRecord,
    pub order_updated: bool,
    pub message: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TestRecordStats {
    pub total: i64,
    pub pending: i64,
    pub testing: i64,
    pub completed: i64,
    pub failed: i64,
}

const TEST_COLUMNS: &str = "id, test_no, formula_id, formula_name, formula_version, order_id, \
    order_no, test_type, status, test_standard, tester, start_date, end_date, results, conclusion, \
    attachments, created_by, created_at, updated_at";

struct NewTestRecord<'a> {
    test_no: Option<&'a str>,
    formula: &'a Formula,
    order: Option<&'a Order>,
    test_type: &'a str,
    test_standard: Option<&'a str>,
    tester: &'a str,
    results: Option<&'a serde_json::Value>,
    conclusion: Option<&'a str>,
    attachments: Option<&'a serde_json::Value>,
    created_by: &'a str,
}

/// Advisory warnings for testing `formula` against `order`
fn link_warnings(formula: &Formula, order: Option<&Order>) -> Vec<String> {
    let mut warnings = Vec::new();

    if !formula.is_published {
        warnings.push(format!("Formula {} is not published", formula.code));
    }

    if let Some(order) = order {
        if matches!(order.status, OrderStatus::Completed | OrderStatus::Cancelled) {
            warnings.push(format!("Order {} is already {}", order.order_no, order.status));
        }
        if order.formula_id.is_some_and(|id| id != formula.id) {
            warnings.push(format!(
                "Order {} uses a different formula than {}",
                order.order_no, formula.code
            ));
        }
    }

    warnings
}

async fn insert_test_record(conn: &mut PgConnection, new: NewTestRecord<'_>) -> AppResult<TestRecord> {
    let test_no = match new.test_no {
        Some(no) => no.trim().to_string(),
        None => {
            let today = Utc::now().date_naive();
            let seq = sequence::next_value(&mut *conn, TEST_SEQUENCE, today).await?;
            format_test_no(today, seq)
        }
    };

    let record = sqlx::query_as::<_, TestRecord>(&format!(
        r#"
        INSERT INTO test_records (
            test_no, formula_id, formula_name, formula_version, order_id, order_no, test_type,
            status, test_standard, tester, results, conclusion, attachments, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        TEST_COLUMNS
    ))
    .bind(&test_no)
    .bind(new.formula.id)
    .bind(&new.formula.name)
    .bind(&new.formula.version)
    .bind(new.order.map(|o| o.id))
    .bind(new.order.map(|o| o.order_no.as_str()))
    .bind(new.test_type.trim())
    .bind(new.test_standard)
    .bind(new.tester.trim())
    .bind(new.results)
    .bind(new.conclusion)
    .bind(new.attachments)
    .bind(new.created_by)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        test_no = %record.test_no,
        formula = %new.formula.code,
        order_no = record.order_no.as_deref().unwrap_or(""),
        "Test record created"
    );

    Ok(record)
}

fn status_message(test_no: &str, next: TestStatus, order_updated: bool) -> String {
    let base = format!("Test {} is now {}", test_no, next);
    if order_updated {
        format!("{}; linked order completed", base)
    } else {
        base
    }
}

impl TestRecordService {
    /// Create a new TestRecordService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            retry: config.database.retry_policy(),
        }
    }

    pub async fn create_test_record(
        &self,
        input: CreateTestRecordInput,
        created_by: &str,
    ) -> AppResult<TestRecordCreated> {
        input.validate()?;

        with_retry(&self.retry, "create_test_record", || {
            self.try_create_test_record(&input, created_by)
        })
        .await
    }

    async fn try_create_test_record(
        &self,
        input: &CreateTestRecordInput,
        created_by: &str,
    ) -> AppResult<TestRecordCreated> {
        let mut tx = self.db.begin().await?;

        let formula = find_formula(&mut tx, input.formula_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Formula".to_string()))?;

        let order = match input.order_id {
            Some(order_id) => Some(
                find_order(&mut tx, order_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Order".to_string()))?,
            ),
            None => None,
        };

        let warnings = link_warnings(&formula, order.as_ref());

        let test_record = insert_test_record(
            &mut tx,
            NewTestRecord {
                test_no: input.test_no.as_deref(),
                formula: &formula,
                order: order.as_ref(),
                test_type: &input.test_type,
                test_standard: input.test_standard.as_deref(),
                tester: &input.tester,
                results: input.results.as_ref(),
                conclusion: input.conclusion.as_deref(),
                attachments: input.attachments.as_ref(),
                created_by,
            },
        )
        .await?;

        tx.commit().await?;

        Ok(TestRecordCreated { test_record, warnings })
    }

    /// Open one test against an order's formula
    pub async fn create_test_for_order(
        &self,
        order_id: Uuid,
        test_type: &str,
        tester: &str,
        created_by: &str,
    ) -> AppResult<TestRecordCreated> {
        let created = self
            .create_batch_tests_for_order(order_id, &[test_type.to_string()], tester, created_by)
            .await?;

        let test_record = created
            .test_records
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("No test record created".to_string()))?;

        Ok(TestRecordCreated {
            test_record,
            warnings: created.warnings,
        })
    }

    /// Open one test per type against an order's formula, all or nothing
    pub async fn create_batch_tests_for_order(
        &self,
        order_id: Uuid,
        test_types: &[String],
        tester: &str,
        created_by: &str,
    ) -> AppResult<OrderTestsCreated> {
        if test_types.is_empty() || test_types.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::validation(
                "test_type",
                "At least one test type is required",
                "请至少选择一种测试类型",
            ));
        }
        if tester.trim().is_empty() {
            return Err(AppError::validation("tester", "Tester is required", "请填写测试人员"));
        }

        with_retry(&self.retry, "create_tests_for_order", || {
            self.try_create_tests_for_order(order_id, test_types, tester, created_by)
        })
        .await
    }

    async fn try_create_tests_for_order(
        &self,
        order_id: Uuid,
        test_types: &[String],
        tester: &str,
        created_by: &str,
    ) -> AppResult<OrderTestsCreated> {
        let mut tx = self.db.begin().await?;

        let order = find_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let formula_id = order.formula_id.ok_or_else(|| {
            AppError::validation(
                "formula_id",
                format!("Order {} has no formula to test", order.order_no),
                "该订单未关联配方，无法创建测试",
            )
        })?;

        let formula = find_formula(&mut tx, formula_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Formula".to_string()))?;

        let warnings = link_warnings(&formula, Some(&order));

        let mut test_records = Vec::with_capacity(test_types.len());
        for test_type in test_types {
            let record = insert_test_record(
                &mut tx,
                NewTestRecord {
                    test_no: None,
                    formula: &formula,
                    order: Some(&order),
                    test_type,
                    test_standard: None,
                    tester,
                    results: None,
                    conclusion: None,
                    attachments: None,
                    created_by,
                },
            )
            .await?;
            test_records.push(record);
        }

        tx.commit().await?;

        Ok(OrderTestsCreated { test_records, warnings })
    }

    /// Move a test through its lifecycle. Completing a test whose order is
    /// in production completes the order in the same transaction.
    pub async fn update_test_status(
        &self,
        test_id: Uuid,
        input: UpdateTestStatusInput,
        operator: &str,
    ) -> AppResult<TestStatusUpdate> {
        let next = TestStatus::from_str(input.status.trim())?;

        with_retry(&self.retry, "update_test_status", || {
            self.try_update_test_status(test_id, next, &input, operator)
        })
        .await
    }

    async fn try_update_test_status(
        &self,
        test_id: Uuid,
        next: TestStatus,
        input: &UpdateTestStatusInput,
        operator: &str,
    ) -> AppResult<TestStatusUpdate> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, TestRecord>(&format!(
            "SELECT {} FROM test_records WHERE id = $1 FOR UPDATE",
            TEST_COLUMNS
        ))
        .bind(test_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Test record".to_string()))?;

        current.status.transition_to(next)?;

        // A retest reopens the window: new start, no end.
        let test_record = sqlx::query_as::<_, TestRecord>(&format!(
            r#"
            UPDATE test_records
            SET status = $2,
                start_date = CASE WHEN $2 = 'testing' THEN NOW() ELSE start_date END,
                end_date = CASE
                    WHEN $2 IN ('completed', 'failed') THEN NOW()
                    WHEN $2 = 'testing' THEN NULL
                    ELSE end_date
                END,
                conclusion = COALESCE($3, conclusion),
                results = COALESCE($4, results),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TEST_COLUMNS
        ))
        .bind(test_id)
        .bind(next)
        .bind(&input.conclusion)
        .bind(&input.results)
        .fetch_one(&mut *tx)
        .await?;

        tracing::info!(
            test_no = %test_record.test_no,
            from = %current.status,
            to = %next,
            "Test status changed"
        );

        let mut order_updated = false;
        if current.status.completes_on(next) {
            if let Some(order_id) = test_record.order_id {
                let order = lock_order(&mut tx, order_id).await?;
                if order.status == OrderStatus::Processing {
                    transition_order_in(&mut tx, &order, OrderStatus::Completed, operator, operator, None)
                        .await?;
                    order_updated = true;
                }
            }
        }

        tx.commit().await?;

        Ok(TestStatusUpdate {
            message: status_message(&test_record.test_no, next, order_updated),
            test_record,
            order_updated,
        })
    }

    pub async fn get_test_record(&self, test_id: Uuid) -> AppResult<TestRecord> {
        sqlx::query_as::<_, TestRecord>(&format!(
            "SELECT {} FROM test_records WHERE id = $1",
            TEST_COLUMNS
        ))
        .bind(test_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Test record".to_string()))
    }

    pub async fn list_test_records(
        &self,
        filter: &TestRecordFilter,
        page: Pagination,
    ) -> AppResult<(Vec<TestRecord>, i64)> {
        const WHERE: &str = r#"
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR formula_id = $2)
              AND ($3::uuid IS NULL OR order_id = $3)
              AND ($4::varchar IS NULL OR test_no ILIKE '%' || $4 || '%'
                   OR formula_name ILIKE '%' || $4 || '%' OR test_type ILIKE '%' || $4 || '%')
        "#;

        let status = filter.status.map(|s| s.as_str());
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let records = sqlx::query_as::<_, TestRecord>(&format!(
            "SELECT {} FROM test_records {} ORDER BY created_at DESC LIMIT $5 OFFSET $6",
            TEST_COLUMNS, WHERE
        ))
        .bind(status)
        .bind(filter.formula_id)
        .bind(filter.order_id)
        .bind(search)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM test_records {}", WHERE))
            .bind(status)
            .bind(filter.formula_id)
            .bind(filter.order_id)
            .bind(search)
            .fetch_one(&self.db)
            .await?;

        Ok((records, total))
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> AppResult<Vec<TestRecord>> {
        let records = sqlx::query_as::<_, TestRecord>(&format!(
            "SELECT {} FROM test_records WHERE order_id = $1 ORDER BY created_at",
            TEST_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(records)
    }

    pub async fn list_for_formula(&self, formula_id: Uuid) -> AppResult<Vec<TestRecord>> {
        let records = sqlx::query_as::<_, TestRecord>(&format!(
            "SELECT {} FROM test_records WHERE formula_id = $1 ORDER BY created_at DESC",
            TEST_COLUMNS
        ))
        .bind(formula_id)
        .fetch_all(&self.db)
        .await?;

        Ok(records)
    }

    /// Tests waiting to start, oldest first
    pub async fn list_pending(&self, limit: i64) -> AppResult<Vec<TestRecord>> {
        let records = sqlx::query_as::<_, TestRecord>(&format!(
            "SELECT {} FROM test_records WHERE status = 'pending' ORDER BY created_at LIMIT $1",
            TEST_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(records)
    }

    pub async fn update_test_record(
        &self,
        test_id: Uuid,
        input: UpdateTestRecordInput,
    ) -> AppResult<TestRecord> {
        input.validate()?;

        let existing = self.get_test_record(test_id).await?;

        let record = sqlx::query_as::<_, TestRecord>(&format!(
            r#"
            UPDATE test_records
            SET test_type = $2, test_standard = $3, tester = $4, results = $5, conclusion = $6,
                attachments = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TEST_COLUMNS
        ))
        .bind(test_id)
        .bind(input.test_type.as_deref().map(str::trim).unwrap_or(&existing.test_type))
        .bind(input.test_standard.as_ref().or(existing.test_standard.as_ref()))
        .bind(input.tester.as_deref().map(str::trim).unwrap_or(&existing.tester))
        .bind(input.results.as_ref().or(existing.results.as_ref()))
        .bind(input.conclusion.as_ref().or(existing.conclusion.as_ref()))
        .bind(input.attachments.as_ref().or(existing.attachments.as_ref()))
        .fetch_one(&self.db)
        .await?;

        Ok(record)
    }

    pub async fn delete_test_record(&self, test_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM test_records WHERE id = $1")
            .bind(test_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Test record".to_string()));
        }

        Ok(())
    }

    pub async fn get_stats(&self) -> AppResult<TestRecordStats> {
        let stats = sqlx::query_as::<_, TestRecordStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'testing') AS testing,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM test_records
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderPriority, OrderType};

    fn formula(published: bool) -> Formula {
        Formula {
            id: Uuid::new_v4(),
            code: "PCM-28".to_string(),
            name: "Paraffin 28".to_string(),
            version: "1.0".to_string(),
            description: None,
            phase_change_temperature: None,
            latent_heat: None,
            thermal_conductivity: None,
            density: None,
            specific_heat: None,
            melting_point: None,
            solidification_point: None,
            stability: None,
            category: None,
            parameters: None,
            standard_reference: None,
            is_published: published,
            created_by: "admin".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn order(status: OrderStatus, formula_id: Option<Uuid>) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_no: "PE-20260117-006J".to_string(),
            customer_id: None,
            customer_name: "Acme".to_string(),
            contact_person: None,
            contact_phone: None,
            contact_email: None,
            order_type: OrderType::Production,
            status,
            priority: OrderPriority::Medium,
            formula_id,
            formula_version: None,
            quantity: 10,
            unit: "kg".to_string(),
            delivery_date: None,
            total_amount: None,
            remarks: None,
            created_by: "jane".to_string(),
            creator_code: "J".to_string(),
            shipping_no: None,
            shipping_company: None,
            shipping_date: None,
            cancel_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_warnings_for_matching_open_order() {
        let f = formula(true);
        let o = order(OrderStatus::Processing, Some(f.id));
        assert!(link_warnings(&f, Some(&o)).is_empty());
        assert!(link_warnings(&f, None).is_empty());
    }

    #[test]
    fn test_warnings_for_unpublished_closed_and_mismatched() {
        let f = formula(false);
        let o = order(OrderStatus::Completed, Some(Uuid::new_v4()));
        let warnings = link_warnings(&f, Some(&o));
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("not published"));
        assert!(warnings[1].contains("already completed"));
        assert!(warnings[2].contains("different formula"));
    }

    #[test]
    fn test_order_without_formula_is_not_a_mismatch() {
        let f = formula(true);
        let o = order(OrderStatus::Pending, None);
        assert!(link_warnings(&f, Some(&o)).is_empty());
    }

    #[test]
    fn test_order_tests_input_types() {
        let input = CreateOrderTestsInput {
            test_type: Some("dsc".to_string()),
            test_types: vec!["cycling".to_string(), " ".to_string()],
            tester: "lee".to_string(),
        };
        assert_eq!(input.types(), vec!["dsc".to_string(), "cycling".to_string()]);
    }

    #[test]
    fn test_status_message() {
        assert_eq!(
            status_message("T-20260117-001", TestStatus::Completed, true),
            "Test T-20260117-001 is now completed; linked order completed"
        );
        assert_eq!(
            status_message("T-20260117-001", TestStatus::Failed, false),
            "Test T-20260117-001 is now failed"
        );
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::services::fixtures::{insert_formula, insert_order, insert_test, order_status};

    fn service(pool: &PgPool) -> TestRecordService {
        TestRecordService {
            db: pool.clone(),
            retry: RetryPolicy::single_attempt(),
        }
    }

    fn to(status: &str) -> UpdateTestStatusInput {
        UpdateTestStatusInput {
            status: status.to_string(),
            conclusion: None,
            results: None,
        }
    }

    #[sqlx::test]
    async fn test_completion_completes_order_in_production(pool: PgPool) {
        let formula_id = insert_formula(&pool, "F-001", &[]).await;
        let order_id =
            insert_order(&pool, "PE-20260117-001T", Some(formula_id), 1, OrderStatus::Processing).await;
        let test_id = insert_test(&pool, "T-20260117-001", formula_id, Some(order_id), TestStatus::Testing).await;

        let update = service(&pool)
            .update_test_status(test_id, to("completed"), "qc")
            .await
            .unwrap();

        assert!(update.order_updated);
        assert_eq!(update.test_record.status, TestStatus::Completed);
        assert!(update.test_record.end_date.is_some());
        assert_eq!(order_status(&pool, order_id).await, OrderStatus::Completed);

        let shipped: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT shipping_date FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(shipped.is_some());
    }

    #[sqlx::test]
    async fn test_completion_leaves_pending_order(pool: PgPool) {
        let formula_id = insert_formula(&pool, "F-001", &[]).await;
        let order_id =
            insert_order(&pool, "PE-20260117-002T", Some(formula_id), 1, OrderStatus::Pending).await;
        let test_id = insert_test(&pool, "T-20260117-002", formula_id, Some(order_id), TestStatus::Testing).await;

        let update = service(&pool)
            .update_test_status(test_id, to("completed"), "qc")
            .await
            .unwrap();

        assert!(!update.order_updated);
        assert_eq!(update.test_record.status, TestStatus::Completed);
        assert_eq!(order_status(&pool, order_id).await, OrderStatus::Pending);
    }

    #[sqlx::test]
    async fn test_failure_leaves_order_in_production(pool: PgPool) {
        let formula_id = insert_formula(&pool, "F-001", &[]).await;
        let order_id =
            insert_order(&pool, "PE-20260117-003T", Some(formula_id), 1, OrderStatus::Processing).await;
        let test_id = insert_test(&pool, "T-20260117-003", formula_id, Some(order_id), TestStatus::Testing).await;
        let service = service(&pool);

        let update = service.update_test_status(test_id, to("failed"), "qc").await.unwrap();
        assert!(!update.order_updated);
        assert_eq!(order_status(&pool, order_id).await, OrderStatus::Processing);

        // Retest reopens the window
        let update = service.update_test_status(test_id, to("testing"), "qc").await.unwrap();
        assert_eq!(update.test_record.status, TestStatus::Testing);
        assert!(update.test_record.end_date.is_none());
    }

    #[sqlx::test]
    async fn test_illegal_transition_writes_nothing(pool: PgPool) {
        let formula_id = insert_formula(&pool, "F-001", &[]).await;
        let test_id = insert_test(&pool, "T-20260117-004", formula_id, None, TestStatus::Completed).await;

        let err = service(&pool)
            .update_test_status(test_id, to("failed"), "qc")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));

        let record = service(&pool).get_test_record(test_id).await.unwrap();
        assert_eq!(record.status, TestStatus::Completed);
    }
}
