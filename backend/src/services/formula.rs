//! Formula management and bill-of-materials resolution

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    compute_requirements, validate_bom_ratios, validate_order_quantity, BomLine, MaterialRequirement,
    Pagination,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::retry::with_retry;
use crate::services::material::check_stock_field;

/// Formula service
#[derive(Clone)]
pub struct FormulaService {
    db: PgPool,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Formula {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub phase_change_temperature: Option<Decimal>,
    pub latent_heat: Option<Decimal>,
    pub thermal_conductivity: Option<Decimal>,
    pub density: Option<Decimal>,
    pub specific_heat: Option<Decimal>,
    pub melting_point: Option<Decimal>,
    pub solidification_point: Option<Decimal>,
    pub stability: Option<i32>,
    pub category: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub standard_reference: Option<String>,
    pub is_published: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// BOM line with the material's current stock
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FormulaMaterialLine {
    pub id: Uuid,
    pub material_id: Uuid,
    pub material_code: String,
    pub material_name: String,
    pub unit: String,
    pub ratio: Decimal,
    pub required_quantity: Option<Decimal>,
    pub current_stock: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFormulaInput {
    #[validate(length(min = 1, max = 50, message = "Formula code is required"))]
    pub code: String,
    #[validate(length(min = 1, max = 100, message = "Formula name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 20))]
    pub version: Option<String>,
    pub description: Option<String>,
    pub phase_change_temperature: Option<Decimal>,
    pub latent_heat: Option<Decimal>,
    pub thermal_conductivity: Option<Decimal>,
    pub density: Option<Decimal>,
    pub specific_heat: Option<Decimal>,
    pub melting_point: Option<Decimal>,
    pub solidification_point: Option<Decimal>,
    /// Thermal cycles survived
    #[validate(range(min = 0))]
    pub stability: Option<i32>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub standard_reference: Option<String>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFormulaInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub version: Option<String>,
    pub description: Option<String>,
    pub phase_change_temperature: Option<Decimal>,
    pub latent_heat: Option<Decimal>,
    pub thermal_conductivity: Option<Decimal>,
    pub density: Option<Decimal>,
    pub specific_heat: Option<Decimal>,
    pub melting_point: Option<Decimal>,
    pub solidification_point: Option<Decimal>,
    /// Thermal cycles survived
    #[validate(range(min = 0))]
    pub stability: Option<i32>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub standard_reference: Option<String>,
    pub is_published: Option<bool>,
}

/// One line of a BOM definition
#[derive(Debug, Clone, Deserialize)]
pub struct BomLineInput {
    pub material_id: Uuid,
    /// Percentage share of the formula, in (0, 100]
    pub ratio: Decimal,
    /// Quantity per unit of finished product
    pub required_quantity: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SetFormulaMaterialsInput {
    pub materials: Vec<BomLineInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FormulaFilter {
    pub category: Option<String>,
    pub is_published: Option<bool>,
    /// Matches code or name
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FormulaStats {
    pub total: i64,
    pub published: i64,
    pub draft: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FormulaOption {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub version: String,
}

pub(crate) const FORMULA_COLUMNS: &str = "id, code, name, version, description, \
    phase_change_temperature, latent_heat, thermal_conductivity, density, specific_heat, \
    melting_point, solidification_point, stability, category, parameters, standard_reference, \
    is_published, created_by, created_at, updated_at";

/// Fetch a formula on an existing connection or transaction
pub async fn find_formula(conn: &mut PgConnection, formula_id: Uuid) -> AppResult<Option<Formula>> {
    let formula = sqlx::query_as::<_, Formula>(&format!(
        "SELECT {} FROM formulas WHERE id = $1",
        FORMULA_COLUMNS
    ))
    .bind(formula_id)
    .fetch_optional(conn)
    .await?;

    Ok(formula)
}

/// Load a formula's BOM joined with live material stock, in material code order.
///
/// With `lock` set the material rows are locked `FOR UPDATE` in that order,
/// so concurrent deductions over overlapping materials queue instead of
/// deadlocking.
pub async fn load_bom_lines(
    conn: &mut PgConnection,
    formula_id: Uuid,
    lock: bool,
) -> AppResult<Vec<BomLine>> {
    let sql = format!(
        r#"
        SELECT m.id AS material_id, m.code AS material_code, m.name AS material_name,
               fm.required_quantity, m.current_stock, m.min_stock
        FROM formula_materials fm
        JOIN materials m ON m.id = fm.material_id
        WHERE fm.formula_id = $1
        ORDER BY m.code
        {}
        "#,
        if lock { "FOR UPDATE OF m" } else { "" }
    );

    let lines = sqlx::query_as::<_, BomLine>(&sql)
        .bind(formula_id)
        .fetch_all(conn)
        .await?;

    Ok(lines)
}

/// Validate a BOM definition before it is written
fn validate_bom_input(lines: &[BomLineInput]) -> AppResult<()> {
    let ratios: Vec<Decimal> = lines.iter().map(|l| l.ratio).collect();
    validate_bom_ratios(&ratios)
        .map_err(|msg| AppError::validation("ratio", msg, "配比必须大于 0 且合计不超过 100%"))?;

    if lines
        .iter()
        .any(|l| l.required_quantity.is_some_and(|q| q < Decimal::ZERO))
    {
        return Err(AppError::validation(
            "required_quantity",
            "Required quantity cannot be negative",
            "单位用量不能为负数",
        ));
    }
    for quantity in lines.iter().filter_map(|l| l.required_quantity) {
        check_stock_field("required_quantity", quantity)?;
    }

    let mut ids: Vec<Uuid> = lines.iter().map(|l| l.material_id).collect();
    ids.sort();
    ids.dedup();
    if ids.len() != lines.len() {
        return Err(AppError::validation(
            "material_id",
            "A material may appear only once in a formula",
            "同一物料在配方中只能出现一次",
        ));
    }

    Ok(())
}

impl FormulaService {
    /// Create a new FormulaService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            retry: config.database.retry_policy(),
        }
    }

    pub async fn create_formula(&self, input: CreateFormulaInput, created_by: &str) -> AppResult<Formula> {
        input.validate()?;

        let formula = sqlx::query_as::<_, Formula>(&format!(
            r#"
            INSERT INTO formulas (
                code, name, version, description, phase_change_temperature, latent_heat,
                thermal_conductivity, density, specific_heat, melting_point, solidification_point,
                stability, category, parameters, standard_reference, is_published, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            FORMULA_COLUMNS
        ))
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(input.version.as_deref().unwrap_or("1.0"))
        .bind(&input.description)
        .bind(input.phase_change_temperature)
        .bind(input.latent_heat)
        .bind(input.thermal_conductivity)
        .bind(input.density)
        .bind(input.specific_heat)
        .bind(input.melting_point)
        .bind(input.solidification_point)
        .bind(input.stability)
        .bind(&input.category)
        .bind(&input.parameters)
        .bind(&input.standard_reference)
        .bind(input.is_published.unwrap_or(false))
        .bind(created_by)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(formula_code = %formula.code, "Formula created");
        Ok(formula)
    }

    pub async fn get_formula(&self, formula_id: Uuid) -> AppResult<Formula> {
        let mut conn = self.db.acquire().await?;
        find_formula(&mut conn, formula_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Formula".to_string()))
    }

    pub async fn list_formulas(
        &self,
        filter: &FormulaFilter,
        page: Pagination,
    ) -> AppResult<(Vec<Formula>, i64)> {
        const WHERE: &str = r#"
            WHERE ($1::varchar IS NULL OR category = $1)
              AND ($2::boolean IS NULL OR is_published = $2)
              AND ($3::varchar IS NULL OR code ILIKE '%' || $3 || '%' OR name ILIKE '%' || $3 || '%')
        "#;

        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let formulas = sqlx::query_as::<_, Formula>(&format!(
            "SELECT {} FROM formulas {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
            FORMULA_COLUMNS, WHERE
        ))
        .bind(&filter.category)
        .bind(filter.is_published)
        .bind(search)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM formulas {}", WHERE))
            .bind(&filter.category)
            .bind(filter.is_published)
            .bind(search)
            .fetch_one(&self.db)
            .await?;

        Ok((formulas, total))
    }

    pub async fn update_formula(&self, formula_id: Uuid, input: UpdateFormulaInput) -> AppResult<Formula> {
        input.validate()?;

        let existing = self.get_formula(formula_id).await?;

        let formula = sqlx::query_as::<_, Formula>(&format!(
            r#"
            UPDATE formulas
            SET name = $2, version = $3, description = $4, phase_change_temperature = $5,
                latent_heat = $6, thermal_conductivity = $7, density = $8, specific_heat = $9,
                melting_point = $10, solidification_point = $11, stability = $12, category = $13,
                parameters = $14, standard_reference = $15, is_published = $16, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            FORMULA_COLUMNS
        ))
        .bind(formula_id)
        .bind(input.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(input.version.as_deref().unwrap_or(&existing.version))
        .bind(input.description.as_ref().or(existing.description.as_ref()))
        .bind(input.phase_change_temperature.or(existing.phase_change_temperature))
        .bind(input.latent_heat.or(existing.latent_heat))
        .bind(input.thermal_conductivity.or(existing.thermal_conductivity))
        .bind(input.density.or(existing.density))
        .bind(input.specific_heat.or(existing.specific_heat))
        .bind(input.melting_point.or(existing.melting_point))
        .bind(input.solidification_point.or(existing.solidification_point))
        .bind(input.stability.or(existing.stability))
        .bind(input.category.as_ref().or(existing.category.as_ref()))
        .bind(input.parameters.as_ref().or(existing.parameters.as_ref()))
        .bind(input.standard_reference.as_ref().or(existing.standard_reference.as_ref()))
        .bind(input.is_published.unwrap_or(existing.is_published))
        .fetch_one(&self.db)
        .await?;

        Ok(formula)
    }

    /// Delete a formula. Formulas referenced by orders or tests are kept.
    pub async fn delete_formula(&self, formula_id: Uuid) -> AppResult<()> {
        let referenced = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM orders WHERE formula_id = $1)
                OR EXISTS(SELECT 1 FROM test_records WHERE formula_id = $1)
            "#,
        )
        .bind(formula_id)
        .fetch_one(&self.db)
        .await?;

        if referenced {
            return Err(AppError::Conflict {
                resource: "formula".to_string(),
                message: "Formula is used by orders or test records and cannot be deleted".to_string(),
                message_zh: "该配方已被订单或测试记录引用，无法删除".to_string(),
            });
        }

        let result = sqlx::query("DELETE FROM formulas WHERE id = $1")
            .bind(formula_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Formula".to_string()));
        }

        Ok(())
    }

    pub async fn get_stats(&self) -> AppResult<FormulaStats> {
        let stats = sqlx::query_as::<_, FormulaStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_published) AS published,
                COUNT(*) FILTER (WHERE NOT is_published) AS draft
            FROM formulas
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(stats)
    }

    /// Published formulas, for pickers
    pub async fn get_options(&self) -> AppResult<Vec<FormulaOption>> {
        let options = sqlx::query_as::<_, FormulaOption>(
            "SELECT id, code, name, version FROM formulas WHERE is_published ORDER BY code",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(options)
    }

    /// A formula's BOM with live stock
    pub async fn get_formula_materials(&self, formula_id: Uuid) -> AppResult<Vec<FormulaMaterialLine>> {
        self.get_formula(formula_id).await?;

        let lines = sqlx::query_as::<_, FormulaMaterialLine>(
            r#"
            SELECT fm.id, fm.material_id, m.code AS material_code, m.name AS material_name, m.unit,
                   fm.ratio, fm.required_quantity, m.current_stock
            FROM formula_materials fm
            JOIN materials m ON m.id = fm.material_id
            WHERE fm.formula_id = $1
            ORDER BY m.code
            "#,
        )
        .bind(formula_id)
        .fetch_all(&self.db)
        .await?;

        Ok(lines)
    }

    /// Replace a formula's BOM wholesale
    pub async fn set_formula_materials(
        &self,
        formula_id: Uuid,
        input: SetFormulaMaterialsInput,
    ) -> AppResult<Vec<FormulaMaterialLine>> {
        validate_bom_input(&input.materials)?;

        with_retry(&self.retry, "set_formula_materials", || {
            self.try_set_formula_materials(formula_id, &input.materials)
        })
        .await?;

        self.get_formula_materials(formula_id).await
    }

    async fn try_set_formula_materials(&self, formula_id: Uuid, lines: &[BomLineInput]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM formulas WHERE id = $1 FOR UPDATE")
            .bind(formula_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::NotFound("Formula".to_string()));
        }

        sqlx::query("DELETE FROM formula_materials WHERE formula_id = $1")
            .bind(formula_id)
            .execute(&mut *tx)
            .await?;

        for line in lines {
            let code = sqlx::query_scalar::<_, String>("SELECT code FROM materials WHERE id = $1")
                .bind(line.material_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Material {}", line.material_id)))?;

            sqlx::query(
                r#"
                INSERT INTO formula_materials (formula_id, material_id, material_code, ratio, required_quantity)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(formula_id)
            .bind(line.material_id)
            .bind(&code)
            .bind(line.ratio)
            .bind(line.required_quantity)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE formulas SET updated_at = NOW() WHERE id = $1")
            .bind(formula_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%formula_id, lines = lines.len(), "Formula BOM replaced");
        Ok(())
    }

    /// Material requirements for producing `order_quantity` units
    pub async fn get_requirements(
        &self,
        formula_id: Uuid,
        order_quantity: i32,
    ) -> AppResult<Vec<MaterialRequirement>> {
        validate_order_quantity(order_quantity)
            .map_err(|msg| AppError::validation("quantity", msg, "订单数量至少为 1"))?;

        let mut conn = self.db.acquire().await?;
        if find_formula(&mut conn, formula_id).await?.is_none() {
            return Err(AppError::NotFound("Formula".to_string()));
        }

        let lines = load_bom_lines(&mut conn, formula_id, false).await?;
        Ok(compute_requirements(&lines, order_quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn line(ratio: &str, per_unit: Option<&str>) -> BomLineInput {
        BomLineInput {
            material_id: Uuid::new_v4(),
            ratio: Decimal::from_str(ratio).unwrap(),
            required_quantity: per_unit.map(|q| Decimal::from_str(q).unwrap()),
        }
    }

    #[test]
    fn test_bom_input_accepts_valid_definition() {
        assert!(validate_bom_input(&[line("60", Some("0.6")), line("40", None)]).is_ok());
    }

    #[test]
    fn test_bom_input_rejects_overfull_ratios() {
        assert!(validate_bom_input(&[line("70", None), line("40", None)]).is_err());
    }

    #[test]
    fn test_bom_input_rejects_negative_quantity() {
        assert!(validate_bom_input(&[line("50", Some("-1"))]).is_err());
    }

    #[test]
    fn test_bom_input_rejects_duplicate_material() {
        let first = line("30", None);
        let mut second = line("30", None);
        second.material_id = first.material_id;
        assert!(validate_bom_input(&[first, second]).is_err());
    }
}
