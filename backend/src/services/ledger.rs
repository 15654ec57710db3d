//! Material stock ledger
//!
//! Every change to a material's stock goes through [`apply_stock_operation_in`]:
//! the material row is locked, the new stock is computed by the shared stock
//! rule, the material is updated and exactly one immutable ledger row is
//! appended, all on the same transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{check_stock_quantity, MaterialStatus, Pagination, StockOperationType};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::retry::with_retry;
use crate::services::material::{Material, MATERIAL_COLUMNS};

/// Stock ledger service
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
    retry: RetryPolicy,
}

/// Immutable ledger row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockOperation {
    pub id: Uuid,
    pub material_id: Uuid,
    pub material_code: String,
    pub material_name: String,
    pub operation_type: StockOperationType,
    pub quantity: Decimal,
    pub before_stock: Decimal,
    pub after_stock: Decimal,
    pub batch_no: Option<String>,
    pub reason: String,
    pub reference_no: Option<String>,
    pub approved_by: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A fully specified stock mutation
#[derive(Debug, Clone)]
pub struct StockOperationRequest {
    pub material_id: Uuid,
    pub operation_type: StockOperationType,
    pub quantity: Decimal,
    pub reason: String,
    pub reference_no: Option<String>,
    pub batch_no: Option<String>,
    pub approved_by: String,
    pub created_by: String,
}

impl StockOperationRequest {
    /// Reject requests that can never succeed, before touching the database
    pub fn validate(&self) -> AppResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(AppError::validation(
                "quantity",
                "Quantity must be greater than zero",
                "数量必须大于零",
            ));
        }
        check_stock_quantity(self.quantity)?;
        if self.reason.trim().is_empty() {
            return Err(AppError::validation("reason", "Reason is required", "请填写操作原因"));
        }
        if self.approved_by.trim().is_empty() {
            return Err(AppError::validation(
                "approved_by",
                "Approver is required",
                "请填写审批人",
            ));
        }
        if self.created_by.trim().is_empty() {
            return Err(AppError::validation(
                "created_by",
                "Operator is required",
                "请填写操作人",
            ));
        }
        Ok(())
    }
}

/// Request body for a manual stock operation
#[derive(Debug, Deserialize, Validate)]
pub struct StockOperationInput {
    pub operation_type: StockOperationType,
    pub quantity: Decimal,
    #[validate(length(min = 1, max = 500, message = "Reason is required"))]
    pub reason: String,
    #[validate(length(max = 50))]
    pub reference_no: Option<String>,
    #[validate(length(max = 50))]
    pub batch_no: Option<String>,
    /// Defaults to the authenticated user
    #[validate(length(min = 1, max = 50))]
    pub approved_by: Option<String>,
}

/// Result of a stock operation
#[derive(Debug, Serialize)]
pub struct StockOperationResult {
    pub material: Material,
    pub operation: StockOperation,
}

/// Ledger query filters
#[derive(Debug, Default, Deserialize)]
pub struct StockOperationFilter {
    pub material_id: Option<Uuid>,
    pub operation_type: Option<StockOperationType>,
    pub reference_no: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    /// `json` (default) or `csv`
    pub format: Option<String>,
}

const OPERATION_COLUMNS: &str = "id, material_id, material_code, material_name, operation_type, \
    quantity, before_stock, after_stock, batch_no, reason, reference_no, approved_by, created_by, \
    created_at";

/// Lock a material row for the rest of the transaction
pub async fn lock_material(conn: &mut PgConnection, material_id: Uuid) -> AppResult<Material> {
    sqlx::query_as::<_, Material>(&format!(
        "SELECT {} FROM materials WHERE id = $1 FOR UPDATE",
        MATERIAL_COLUMNS
    ))
    .bind(material_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Material".to_string()))
}

/// Apply one stock operation on an open transaction.
///
/// Nothing is written when the operation is rejected. Callers own the
/// transaction, so several operations can be committed or rolled back
/// together.
pub async fn apply_stock_operation_in(
    conn: &mut PgConnection,
    request: &StockOperationRequest,
) -> AppResult<(Material, StockOperation)> {
    request.validate()?;

    let material = lock_material(&mut *conn, request.material_id).await?;

    let movement = request
        .operation_type
        .apply(material.current_stock, request.quantity)
        .map_err(|e| match e {
            shared::DomainError::InsufficientStock {
                available,
                requested,
            } => AppError::InsufficientStock {
                message: format!(
                    "Material {} has insufficient stock (available: {}, requested: {})",
                    material.code, available, requested
                ),
                materials: vec![material.code.clone()],
            },
            other => AppError::from(other),
        })?;

    let status = MaterialStatus::derive(movement.after, material.min_stock);

    let updated = sqlx::query_as::<_, Material>(&format!(
        r#"
        UPDATE materials
        SET current_stock = $2, status = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        MATERIAL_COLUMNS
    ))
    .bind(material.id)
    .bind(movement.after)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;

    let operation = sqlx::query_as::<_, StockOperation>(&format!(
        r#"
        INSERT INTO stock_operations (
            material_id, material_code, material_name, operation_type, quantity,
            before_stock, after_stock, batch_no, reason, reference_no, approved_by, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {}
        "#,
        OPERATION_COLUMNS
    ))
    .bind(material.id)
    .bind(&material.code)
    .bind(&material.name)
    .bind(request.operation_type)
    .bind(movement.quantity)
    .bind(movement.before)
    .bind(movement.after)
    .bind(&request.batch_no)
    .bind(&request.reason)
    .bind(&request.reference_no)
    .bind(&request.approved_by)
    .bind(&request.created_by)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        material_code = %updated.code,
        operation = %request.operation_type,
        quantity = %movement.quantity,
        before = %movement.before,
        after = %movement.after,
        reference_no = request.reference_no.as_deref().unwrap_or(""),
        "Stock operation recorded"
    );

    if status != MaterialStatus::Normal && material.status == MaterialStatus::Normal {
        tracing::warn!(
            material_code = %updated.code,
            status = %status,
            "Material dropped below its minimum stock"
        );
    }

    Ok((updated, operation))
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            retry: config.database.retry_policy(),
        }
    }

    /// Apply a stock operation in its own transaction
    pub async fn apply_stock_operation(
        &self,
        request: StockOperationRequest,
    ) -> AppResult<StockOperationResult> {
        request.validate()?;
        with_retry(&self.retry, "apply_stock_operation", || {
            self.try_apply_stock_operation(&request)
        })
        .await
    }

    async fn try_apply_stock_operation(
        &self,
        request: &StockOperationRequest,
    ) -> AppResult<StockOperationResult> {
        let mut tx = self.db.begin().await?;
        let (material, operation) = apply_stock_operation_in(&mut tx, request).await?;
        tx.commit().await?;

        Ok(StockOperationResult {
            material,
            operation,
        })
    }

    /// Ledger entries for one material, newest first
    pub async fn list_for_material(
        &self,
        material_id: Uuid,
        page: Pagination,
    ) -> AppResult<(Vec<StockOperation>, i64)> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM materials WHERE id = $1)")
            .bind(material_id)
            .fetch_one(&self.db)
            .await?;

        if !exists {
            return Err(AppError::NotFound("Material".to_string()));
        }

        self.list(
            &StockOperationFilter {
                material_id: Some(material_id),
                ..Default::default()
            },
            page,
        )
        .await
    }

    /// Ledger entries matching the filter, newest first, with the total count
    pub async fn list(
        &self,
        filter: &StockOperationFilter,
        page: Pagination,
    ) -> AppResult<(Vec<StockOperation>, i64)> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR material_id = $1)
              AND ($2::varchar IS NULL OR operation_type = $2)
              AND ($3::varchar IS NULL OR reference_no = $3)
        "#;

        let operation_type = filter.operation_type.map(|t| t.as_str());

        let rows = sqlx::query_as::<_, StockOperation>(&format!(
            "SELECT {} FROM stock_operations {} ORDER BY created_at DESC, id LIMIT $4 OFFSET $5",
            OPERATION_COLUMNS, WHERE
        ))
        .bind(filter.material_id)
        .bind(operation_type)
        .bind(&filter.reference_no)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM stock_operations {}",
            WHERE
        ))
        .bind(filter.material_id)
        .bind(operation_type)
        .bind(&filter.reference_no)
        .fetch_one(&self.db)
        .await?;

        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: i64) -> StockOperationRequest {
        StockOperationRequest {
            material_id: Uuid::new_v4(),
            operation_type: StockOperationType::Out,
            quantity: Decimal::from(quantity),
            reason: "production issue".to_string(),
            reference_no: None,
            batch_no: None,
            approved_by: "qc".to_string(),
            created_by: "operator".to_string(),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request(5).validate().is_ok());
        assert!(request(0).validate().is_err());
        assert!(request(-1).validate().is_err());

        let mut blank_reason = request(5);
        blank_reason.reason = "   ".to_string();
        assert!(matches!(
            blank_reason.validate(),
            Err(AppError::Validation { ref field, .. }) if field == "reason"
        ));

        let mut tiny = request(5);
        tiny.quantity = Decimal::new(4, 4);
        assert!(matches!(
            tiny.validate(),
            Err(AppError::Validation { ref field, .. }) if field == "quantity"
        ));

        let mut huge = request(5);
        huge.quantity = Decimal::new(100_000_000_000, 0);
        assert!(huge.validate().is_err());

        let mut no_approver = request(5);
        no_approver.approved_by = String::new();
        assert!(no_approver.validate().is_err());
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::services::fixtures::{dec, insert_material, ledger_rows, material_stock};

    fn issue(material_id: Uuid, quantity: &str) -> StockOperationRequest {
        StockOperationRequest {
            material_id,
            operation_type: StockOperationType::Out,
            quantity: dec(quantity),
            reason: "order deduction".to_string(),
            reference_no: None,
            batch_no: None,
            approved_by: "qc".to_string(),
            created_by: "operator".to_string(),
        }
    }

    #[sqlx::test]
    async fn test_out_updates_stock_and_appends_one_row(pool: PgPool) {
        let material_id = insert_material(&pool, "P01", "1000", "200").await;

        let mut tx = pool.begin().await.unwrap();
        let (material, operation) = apply_stock_operation_in(&mut tx, &issue(material_id, "850"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(material.current_stock, dec("150"));
        assert_eq!(material.status, MaterialStatus::LowStock);
        assert_eq!(operation.before_stock, dec("1000"));
        assert_eq!(operation.after_stock, dec("150"));
        assert_eq!(ledger_rows(&pool, material_id).await, 1);
        assert_eq!(
            material_stock(&pool, material_id).await,
            (dec("150"), MaterialStatus::LowStock)
        );
    }

    #[sqlx::test]
    async fn test_overdraw_writes_nothing(pool: PgPool) {
        let material_id = insert_material(&pool, "P01", "5", "0").await;

        let mut tx = pool.begin().await.unwrap();
        let err = apply_stock_operation_in(&mut tx, &issue(material_id, "9"))
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        match err {
            AppError::InsufficientStock { materials, .. } => assert_eq!(materials, vec!["P01".to_string()]),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(ledger_rows(&pool, material_id).await, 0);
        assert_eq!(
            material_stock(&pool, material_id).await,
            (dec("5"), MaterialStatus::Normal)
        );
    }

    #[sqlx::test]
    async fn test_sub_column_quantity_rejected_before_write(pool: PgPool) {
        let material_id = insert_material(&pool, "P02", "0.001", "0").await;
        let service = LedgerService {
            db: pool.clone(),
            retry: RetryPolicy::single_attempt(),
        };

        let err = service
            .apply_stock_operation(issue(material_id, "0.0006"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
        assert_eq!(ledger_rows(&pool, material_id).await, 0);
        assert_eq!(material_stock(&pool, material_id).await.0, dec("0.001"));
    }

    #[sqlx::test]
    async fn test_issuing_everything_marks_out_of_stock(pool: PgPool) {
        let material_id = insert_material(&pool, "H01", "500", "100").await;
        let service = LedgerService {
            db: pool.clone(),
            retry: RetryPolicy::single_attempt(),
        };

        let result = service
            .apply_stock_operation(issue(material_id, "500"))
            .await
            .unwrap();

        assert_eq!(result.material.status, MaterialStatus::OutOfStock);
        assert_eq!(result.operation.after_stock, Decimal::ZERO);
    }
}
