//! Material master data: CRUD, stock views and picker options

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    check_stock_quantity, next_available_material_code, validate_material_code, validate_stock_thresholds, MaterialStatus,
    Pagination, StockOperationType,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::retry::with_retry;
use crate::services::ledger::{apply_stock_operation_in, lock_material, StockOperationRequest};

/// Material service
#[derive(Clone)]
pub struct MaterialService {
    db: PgPool,
    retry: RetryPolicy,
}

/// Raw material with live stock
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Material {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: String,
    pub specification: Option<String>,
    pub unit: String,
    pub current_stock: Decimal,
    pub min_stock: Decimal,
    pub max_stock: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    pub supplier_name: Option<String>,
    pub batch_no: Option<String>,
    pub production_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: MaterialStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a material
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMaterialInput {
    #[validate(length(min = 3, max = 20))]
    pub code: String,
    #[validate(length(min = 1, max = 100, message = "Material name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Category is required"))]
    pub category: String,
    #[validate(length(max = 200))]
    pub specification: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Unit is required"))]
    pub unit: String,
    /// Opening stock, booked through the ledger as an `in` operation
    pub initial_stock: Option<Decimal>,
    pub min_stock: Option<Decimal>,
    pub max_stock: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    #[validate(length(max = 50))]
    pub batch_no: Option<String>,
    pub production_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Input for updating material metadata. Stock is not editable here.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMaterialInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    #[validate(length(max = 200))]
    pub specification: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    pub min_stock: Option<Decimal>,
    pub max_stock: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    #[validate(length(max = 50))]
    pub batch_no: Option<String>,
    pub production_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Material list filters
#[derive(Debug, Default, Deserialize)]
pub struct MaterialFilter {
    pub category: Option<String>,
    pub status: Option<MaterialStatus>,
    /// Matches code or name
    pub search: Option<String>,
    pub low_stock_only: Option<bool>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    /// `json` (default) or `csv`
    pub format: Option<String>,
}

/// Material counts by status
#[derive(Debug, Serialize, FromRow)]
pub struct MaterialStats {
    pub total: i64,
    pub normal: i64,
    pub low_stock: i64,
    pub out_of_stock: i64,
}

/// Material entry for selection lists
#[derive(Debug, Serialize, FromRow)]
pub struct MaterialOption {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub current_stock: Decimal,
}

pub(crate) const MATERIAL_COLUMNS: &str = "id, code, name, category, specification, unit, current_stock, \
    min_stock, max_stock, supplier_id, supplier_name, batch_no, production_date, expiry_date, \
    status, created_by, created_at, updated_at";

/// Reject stock figures a `NUMERIC(14, 3)` column would round or overflow
pub(crate) fn check_stock_field(field: &str, value: Decimal) -> AppResult<()> {
    check_stock_quantity(value).map_err(|err| {
        AppError::validation(field, err.to_string(), "库存数值最多保留 3 位小数且不能超出允许范围")
    })
}

impl MaterialService {
    /// Create a new MaterialService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            retry: config.database.retry_policy(),
        }
    }

    /// Create a material. Opening stock goes through the ledger.
    pub async fn create_material(
        &self,
        input: CreateMaterialInput,
        created_by: &str,
    ) -> AppResult<Material> {
        input.validate()?;

        validate_material_code(&input.code)
            .map_err(|msg| AppError::validation("code", msg, "物料编码不在允许的编码系列中"))?;

        let min_stock = input.min_stock.unwrap_or(Decimal::ZERO);
        let max_stock = input.max_stock.unwrap_or(Decimal::ZERO);
        check_stock_field("min_stock", min_stock)?;
        check_stock_field("max_stock", max_stock)?;
        validate_stock_thresholds(min_stock, max_stock)
            .map_err(|msg| AppError::validation("min_stock", msg, "库存上下限设置无效"))?;

        let initial_stock = input.initial_stock.unwrap_or(Decimal::ZERO);
        if initial_stock < Decimal::ZERO {
            return Err(AppError::validation(
                "initial_stock",
                "Initial stock cannot be negative",
                "初始库存不能为负数",
            ));
        }
        check_stock_field("initial_stock", initial_stock)?;

        with_retry(&self.retry, "create_material", || {
            self.try_create_material(&input, min_stock, initial_stock, created_by)
        })
        .await
    }

    async fn try_create_material(
        &self,
        input: &CreateMaterialInput,
        min_stock: Decimal,
        initial_stock: Decimal,
        created_by: &str,
    ) -> AppResult<Material> {
        let mut tx = self.db.begin().await?;

        let supplier_name = match input.supplier_id {
            Some(supplier_id) => Some(
                sqlx::query_scalar::<_, String>("SELECT name FROM suppliers WHERE id = $1")
                    .bind(supplier_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Supplier".to_string()))?,
            ),
            None => None,
        };

        let mut material = sqlx::query_as::<_, Material>(&format!(
            r#"
            INSERT INTO materials (
                code, name, category, specification, unit, current_stock, min_stock, max_stock,
                supplier_id, supplier_name, batch_no, production_date, expiry_date, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(&input.code)
        .bind(input.name.trim())
        .bind(&input.category)
        .bind(&input.specification)
        .bind(&input.unit)
        .bind(min_stock)
        .bind(input.max_stock)
        .bind(input.supplier_id)
        .bind(&supplier_name)
        .bind(&input.batch_no)
        .bind(input.production_date)
        .bind(input.expiry_date)
        .bind(MaterialStatus::derive(Decimal::ZERO, min_stock))
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        if initial_stock > Decimal::ZERO {
            let request = StockOperationRequest {
                material_id: material.id,
                operation_type: StockOperationType::In,
                quantity: initial_stock,
                reason: "Opening stock".to_string(),
                reference_no: None,
                batch_no: input.batch_no.clone(),
                approved_by: created_by.to_string(),
                created_by: created_by.to_string(),
            };
            let (updated, _) = apply_stock_operation_in(&mut tx, &request).await?;
            material = updated;
        }

        tx.commit().await?;

        tracing::info!(material_code = %material.code, "Material created");
        Ok(material)
    }

    /// Get a material by ID
    pub async fn get_material(&self, material_id: Uuid) -> AppResult<Material> {
        sqlx::query_as::<_, Material>(&format!(
            "SELECT {} FROM materials WHERE id = $1",
            MATERIAL_COLUMNS
        ))
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))
    }

    /// List materials matching the filter, ordered by code
    pub async fn list_materials(
        &self,
        filter: &MaterialFilter,
        page: Pagination,
    ) -> AppResult<(Vec<Material>, i64)> {
        const WHERE: &str = r#"
            WHERE ($1::varchar IS NULL OR category = $1)
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::varchar IS NULL OR code ILIKE '%' || $3 || '%' OR name ILIKE '%' || $3 || '%')
              AND (NOT $4 OR current_stock < min_stock)
        "#;

        let status = filter.status.map(|s| s.as_str());
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let low_stock_only = filter.low_stock_only.unwrap_or(false);

        let materials = sqlx::query_as::<_, Material>(&format!(
            "SELECT {} FROM materials {} ORDER BY code LIMIT $5 OFFSET $6",
            MATERIAL_COLUMNS, WHERE
        ))
        .bind(&filter.category)
        .bind(status)
        .bind(search)
        .bind(low_stock_only)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM materials {}", WHERE))
            .bind(&filter.category)
            .bind(status)
            .bind(search)
            .bind(low_stock_only)
            .fetch_one(&self.db)
            .await?;

        Ok((materials, total))
    }

    /// Materials whose stock is under their minimum, most depleted first
    pub async fn list_low_stock(&self, limit: Option<i64>) -> AppResult<Vec<Material>> {
        let materials = sqlx::query_as::<_, Material>(&format!(
            r#"
            SELECT {} FROM materials
            WHERE current_stock < min_stock
            ORDER BY (current_stock - min_stock) ASC, code
            LIMIT $1
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(materials)
    }

    /// Update material metadata. A new minimum re-derives the status.
    pub async fn update_material(
        &self,
        material_id: Uuid,
        input: UpdateMaterialInput,
    ) -> AppResult<Material> {
        input.validate()?;
        with_retry(&self.retry, "update_material", || {
            self.try_update_material(material_id, &input)
        })
        .await
    }

    async fn try_update_material(
        &self,
        material_id: Uuid,
        input: &UpdateMaterialInput,
    ) -> AppResult<Material> {
        let mut tx = self.db.begin().await?;

        let existing = lock_material(&mut tx, material_id).await?;

        let min_stock = input.min_stock.unwrap_or(existing.min_stock);
        let max_stock = input.max_stock.or(existing.max_stock);
        check_stock_field("min_stock", min_stock)?;
        check_stock_field("max_stock", max_stock.unwrap_or(Decimal::ZERO))?;
        validate_stock_thresholds(min_stock, max_stock.unwrap_or(Decimal::ZERO))
            .map_err(|msg| AppError::validation("min_stock", msg, "库存上下限设置无效"))?;

        let (supplier_id, supplier_name) = match input.supplier_id {
            Some(supplier_id) if Some(supplier_id) != existing.supplier_id => {
                let name = sqlx::query_scalar::<_, String>("SELECT name FROM suppliers WHERE id = $1")
                    .bind(supplier_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Supplier".to_string()))?;
                (Some(supplier_id), Some(name))
            }
            _ => (existing.supplier_id, existing.supplier_name.clone()),
        };

        let status = MaterialStatus::derive(existing.current_stock, min_stock);

        let material = sqlx::query_as::<_, Material>(&format!(
            r#"
            UPDATE materials
            SET name = $2, category = $3, specification = $4, unit = $5, min_stock = $6,
                max_stock = $7, supplier_id = $8, supplier_name = $9, batch_no = $10,
                production_date = $11, expiry_date = $12, status = $13, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(material_id)
        .bind(input.name.as_deref().unwrap_or(&existing.name))
        .bind(input.category.as_deref().unwrap_or(&existing.category))
        .bind(input.specification.as_ref().or(existing.specification.as_ref()))
        .bind(input.unit.as_deref().unwrap_or(&existing.unit))
        .bind(min_stock)
        .bind(max_stock)
        .bind(supplier_id)
        .bind(&supplier_name)
        .bind(input.batch_no.as_ref().or(existing.batch_no.as_ref()))
        .bind(input.production_date.or(existing.production_date))
        .bind(input.expiry_date.or(existing.expiry_date))
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if status != existing.status {
            tracing::info!(
                material_code = %material.code,
                from = %existing.status,
                to = %status,
                "Material status re-derived after threshold change"
            );
        }

        Ok(material)
    }

    /// Delete a material that no formula or ledger entry refers to
    pub async fn delete_material(&self, material_id: Uuid) -> AppResult<()> {
        let (in_bom, in_ledger) = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM formula_materials WHERE material_id = $1),
                EXISTS(SELECT 1 FROM stock_operations WHERE material_id = $1)
            "#,
        )
        .bind(material_id)
        .fetch_one(&self.db)
        .await?;

        if in_bom || in_ledger {
            return Err(AppError::Conflict {
                resource: "material".to_string(),
                message: "Material is used by a formula or has stock history and cannot be deleted"
                    .to_string(),
                message_zh: "该物料已被配方引用或存在出入库记录，无法删除".to_string(),
            });
        }

        let result = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(material_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Material".to_string()));
        }

        Ok(())
    }

    /// Material counts by status
    pub async fn get_stats(&self) -> AppResult<MaterialStats> {
        let stats = sqlx::query_as::<_, MaterialStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'normal') AS normal,
                COUNT(*) FILTER (WHERE status = 'low_stock') AS low_stock,
                COUNT(*) FILTER (WHERE status = 'out_of_stock') AS out_of_stock
            FROM materials
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(stats)
    }

    /// Materials in normal standing, for pickers
    pub async fn get_options(&self) -> AppResult<Vec<MaterialOption>> {
        let options = sqlx::query_as::<_, MaterialOption>(
            "SELECT id, code, name, unit, current_stock FROM materials WHERE status = 'normal' ORDER BY code",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(options)
    }

    /// First unused material code, optionally within one series
    pub async fn next_code(&self, prefix: Option<char>) -> AppResult<Option<String>> {
        let used = sqlx::query_scalar::<_, String>("SELECT code FROM materials")
            .fetch_all(&self.db)
            .await?;

        Ok(next_available_material_code(&used, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_fields_fit_the_column() {
        assert!(check_stock_field("min_stock", Decimal::new(200, 0)).is_ok());
        assert!(check_stock_field("min_stock", Decimal::new(12345, 3)).is_ok());

        let err = check_stock_field("initial_stock", Decimal::new(4, 4)).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "initial_stock"));

        let err = check_stock_field("max_stock", Decimal::new(100_000_000_000, 0)).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "max_stock"));
    }
}
