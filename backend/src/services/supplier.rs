//! Supplier management service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{validate_phone, validate_supplier_rating, Pagination, SupplierStatus};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Supplier service
#[derive(Clone)]
pub struct SupplierService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub rating: i32,
    pub status: SupplierStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSupplierInput {
    #[validate(length(min = 1, max = 20, message = "Supplier code is required"))]
    pub code: String,
    #[validate(length(min = 1, max = 100, message = "Supplier name is required"))]
    pub name: String,
    #[validate(length(max = 50))]
    pub contact_person: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    pub rating: Option<i32>,
    pub status: Option<SupplierStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSupplierInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub contact_person: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    pub rating: Option<i32>,
    pub status: Option<SupplierStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SupplierFilter {
    pub status: Option<SupplierStatus>,
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

const SUPPLIER_COLUMNS: &str = "id, code, name, contact_person, phone, email, address, rating, \
    status, created_at, updated_at";

fn check_contact(rating: Option<i32>, phone: Option<&str>) -> AppResult<()> {
    if let Some(rating) = rating {
        validate_supplier_rating(rating)
            .map_err(|msg| AppError::validation("rating", msg, "评分必须在 1 到 5 之间"))?;
    }
    if let Some(phone) = phone.filter(|p| !p.trim().is_empty()) {
        validate_phone(phone).map_err(|msg| AppError::validation("phone", msg, "电话号码格式无效"))?;
    }
    Ok(())
}

impl SupplierService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_supplier(&self, input: CreateSupplierInput) -> AppResult<Supplier> {
        input.validate()?;
        check_contact(input.rating, input.phone.as_deref())?;

        let supplier = sqlx::query_as::<_, Supplier>(&format!(
            r#"
            INSERT INTO suppliers (code, name, contact_person, phone, email, address, rating, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SUPPLIER_COLUMNS
        ))
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(&input.contact_person)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .bind(input.rating.unwrap_or(5))
        .bind(input.status.unwrap_or_default())
        .fetch_one(&self.db)
        .await?;

        Ok(supplier)
    }

    pub async fn get_supplier(&self, supplier_id: Uuid) -> AppResult<Supplier> {
        sqlx::query_as::<_, Supplier>(&format!(
            "SELECT {} FROM suppliers WHERE id = $1",
            SUPPLIER_COLUMNS
        ))
        .bind(supplier_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Supplier".to_string()))
    }

    pub async fn list_suppliers(
        &self,
        filter: &SupplierFilter,
        page: Pagination,
    ) -> AppResult<(Vec<Supplier>, i64)> {
        const WHERE: &str = r#"
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::varchar IS NULL OR code ILIKE '%' || $2 || '%' OR name ILIKE '%' || $2 || '%')
        "#;

        let status = filter.status.map(|s| s.as_str());
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let suppliers = sqlx::query_as::<_, Supplier>(&format!(
            "SELECT {} FROM suppliers {} ORDER BY code LIMIT $3 OFFSET $4",
            SUPPLIER_COLUMNS, WHERE
        ))
        .bind(status)
        .bind(search)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM suppliers {}", WHERE))
            .bind(status)
            .bind(search)
            .fetch_one(&self.db)
            .await?;

        Ok((suppliers, total))
    }

    /// Update a supplier. A new name is copied onto the materials it supplies.
    pub async fn update_supplier(
        &self,
        supplier_id: Uuid,
        input: UpdateSupplierInput,
    ) -> AppResult<Supplier> {
        input.validate()?;
        check_contact(input.rating, input.phone.as_deref())?;

        let existing = self.get_supplier(supplier_id).await?;

        let mut tx = self.db.begin().await?;

        let supplier = sqlx::query_as::<_, Supplier>(&format!(
            r#"
            UPDATE suppliers
            SET name = $2, contact_person = $3, phone = $4, email = $5, address = $6,
                rating = $7, status = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SUPPLIER_COLUMNS
        ))
        .bind(supplier_id)
        .bind(input.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(input.contact_person.as_ref().or(existing.contact_person.as_ref()))
        .bind(input.phone.as_ref().or(existing.phone.as_ref()))
        .bind(input.email.as_ref().or(existing.email.as_ref()))
        .bind(input.address.as_ref().or(existing.address.as_ref()))
        .bind(input.rating.unwrap_or(existing.rating))
        .bind(input.status.unwrap_or(existing.status))
        .fetch_one(&mut *tx)
        .await?;

        if supplier.name != existing.name {
            sqlx::query("UPDATE materials SET supplier_name = $2, updated_at = NOW() WHERE supplier_id = $1")
                .bind(supplier_id)
                .bind(&supplier.name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(supplier)
    }

    pub async fn delete_supplier(&self, supplier_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(supplier_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Supplier".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_rating(rating: Option<i32>) -> AppResult<()> {
        check_contact(rating, None)
    }

    #[test]
    fn test_rating_bounds() {
        assert!(check_rating(None).is_ok());
        assert!(check_rating(Some(1)).is_ok());
        assert!(check_rating(Some(5)).is_ok());
        assert!(check_rating(Some(0)).is_err());
        assert!(check_rating(Some(6)).is_err());
    }
}
