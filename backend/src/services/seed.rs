//! Demo data for a fresh installation
//!
//! Two suppliers, seven materials (one already below its minimum), and two
//! published formulas with their bills of materials. Seeding is idempotent:
//! rows whose code already exists are left alone, and opening stock is
//! received through the ledger so every unit on hand has a ledger entry.

use rust_decimal::Decimal;
use serde::Serialize;
use shared::{MaterialStatus, StockOperationType};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::{Config, RetryPolicy};
use crate::error::AppResult;
use crate::retry::with_retry;
use crate::services::ledger::{apply_stock_operation_in, StockOperationRequest};

pub(crate) struct SeedSupplier {
    pub code: &'static str,
    pub name: &'static str,
    pub contact_person: &'static str,
    pub phone: &'static str,
    pub email: &'static str,
    pub address: &'static str,
    pub rating: i32,
}

pub(crate) struct SeedMaterial {
    pub code: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub specification: &'static str,
    pub stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub supplier_code: &'static str,
}

pub(crate) struct SeedFormula {
    pub code: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    /// Phase-change temperature, latent heat, thermal conductivity, density,
    /// specific heat, melting point, solidification point
    pub properties: [&'static str; 7],
    pub stability: i32,
    pub category: &'static str,
    pub standard_reference: Option<&'static str>,
    /// Material code, ratio (%), quantity per product unit
    pub bom: &'static [(&'static str, &'static str, &'static str)],
}

pub(crate) const SUPPLIERS: [SeedSupplier; 2] = [
    SeedSupplier {
        code: "S001",
        name: "上海化工原料有限公司",
        contact_person: "张经理",
        phone: "021-12345678",
        email: "zhang@shanghai-chem.com",
        address: "上海市浦东新区",
        rating: 5,
    },
    SeedSupplier {
        code: "S002",
        name: "北京特种材料厂",
        contact_person: "李主管",
        phone: "010-87654321",
        email: "li@beijing-spec.com",
        address: "北京市朝阳区",
        rating: 4,
    },
];

pub(crate) const MATERIALS: [SeedMaterial; 7] = [
    SeedMaterial {
        code: "P01",
        name: "石蜡 PCM-01",
        category: "相变材料",
        specification: "熔点: 25°C, 潜热: 180 kJ/kg",
        stock: 1000,
        min_stock: 200,
        max_stock: 2000,
        supplier_code: "S001",
    },
    SeedMaterial {
        code: "P02",
        name: "水合盐 PCM-02",
        category: "相变材料",
        specification: "熔点: 30°C, 潜热: 200 kJ/kg",
        stock: 1500,
        min_stock: 300,
        max_stock: 3000,
        supplier_code: "S001",
    },
    SeedMaterial {
        code: "H01",
        name: "石墨烯粉末",
        category: "导热增强",
        specification: "纯度: 99.9%, 粒径: 10μm",
        stock: 500,
        min_stock: 100,
        max_stock: 1000,
        supplier_code: "S002",
    },
    SeedMaterial {
        code: "H02",
        name: "碳纤维",
        category: "导热增强",
        specification: "长度: 6mm, 直径: 7μm",
        stock: 800,
        min_stock: 200,
        max_stock: 1500,
        supplier_code: "S002",
    },
    SeedMaterial {
        code: "A01",
        name: "成核剂",
        category: "添加剂",
        specification: "粉末, 粒径: 5μm",
        stock: 300,
        min_stock: 50,
        max_stock: 500,
        supplier_code: "S001",
    },
    SeedMaterial {
        code: "A02",
        name: "抗氧化剂",
        category: "添加剂",
        specification: "粉末, 纯度: 98%",
        stock: 400,
        min_stock: 100,
        max_stock: 800,
        supplier_code: "S002",
    },
    SeedMaterial {
        code: "L01",
        name: "相变胶囊",
        category: "相变材料",
        specification: "粒径: 10-20μm",
        stock: 50,
        min_stock: 100,
        max_stock: 500,
        supplier_code: "S001",
    },
];

pub(crate) const FORMULAS: [SeedFormula; 2] = [
    SeedFormula {
        code: "F-001",
        name: "PCM-25 标准配方",
        version: "1.0",
        properties: ["25.0", "180.5", "0.5", "0.88", "2.0", "25.5", "24.5"],
        stability: 500,
        category: "标准相变材料",
        standard_reference: Some("GB/T 26802-2011"),
        bom: &[("P01", "90", "0.9"), ("A01", "10", "0.1")],
    },
    SeedFormula {
        code: "F-002",
        name: "PCM-30 增强导热配方",
        version: "1.2",
        properties: ["30.0", "200.3", "1.2", "0.90", "2.1", "30.5", "29.5"],
        stability: 600,
        category: "增强导热相变材料",
        standard_reference: None,
        bom: &[("P02", "85", "0.85"), ("H01", "10", "0.1"), ("A02", "5", "0.05")],
    },
];

/// Rows created by one seeding run
#[derive(Debug, Default, Serialize)]
pub struct SeedReport {
    pub suppliers: u32,
    pub materials: u32,
    pub formulas: u32,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.suppliers == 0 && self.materials == 0 && self.formulas == 0
    }
}

#[derive(Clone)]
pub struct SeedService {
    db: PgPool,
    retry: RetryPolicy,
}

async fn id_by_code(conn: &mut PgConnection, table: &str, code: &str) -> AppResult<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>(&format!("SELECT id FROM {} WHERE code = $1", table))
        .bind(code)
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

async fn seed_suppliers(conn: &mut PgConnection) -> AppResult<u32> {
    let mut created = 0;
    for supplier in &SUPPLIERS {
        let result = sqlx::query(
            r#"
            INSERT INTO suppliers (code, name, contact_person, phone, email, address, rating, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(supplier.code)
        .bind(supplier.name)
        .bind(supplier.contact_person)
        .bind(supplier.phone)
        .bind(supplier.email)
        .bind(supplier.address)
        .bind(supplier.rating)
        .execute(&mut *conn)
        .await?;
        created += result.rows_affected() as u32;
    }
    Ok(created)
}

async fn seed_materials(conn: &mut PgConnection, operator: &str) -> AppResult<u32> {
    let mut created = 0;
    for material in &MATERIALS {
        if id_by_code(&mut *conn, "materials", material.code).await?.is_some() {
            continue;
        }

        let supplier = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM suppliers WHERE code = $1")
            .bind(material.supplier_code)
            .fetch_optional(&mut *conn)
            .await?;

        let min_stock = Decimal::from(material.min_stock);
        let material_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO materials (
                code, name, category, specification, unit, current_stock, min_stock, max_stock,
                supplier_id, supplier_name, status, created_by
            )
            VALUES ($1, $2, $3, $4, 'kg', 0, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(material.code)
        .bind(material.name)
        .bind(material.category)
        .bind(material.specification)
        .bind(min_stock)
        .bind(Decimal::from(material.max_stock))
        .bind(supplier.as_ref().map(|(id, _)| *id))
        .bind(supplier.as_ref().map(|(_, name)| name.as_str()))
        .bind(MaterialStatus::derive(Decimal::ZERO, min_stock))
        .bind(operator)
        .fetch_one(&mut *conn)
        .await?;

        let request = StockOperationRequest {
            material_id,
            operation_type: StockOperationType::In,
            quantity: Decimal::from(material.stock),
            reason: "Opening stock".to_string(),
            reference_no: None,
            batch_no: None,
            approved_by: operator.to_string(),
            created_by: operator.to_string(),
        };
        apply_stock_operation_in(&mut *conn, &request).await?;
        created += 1;
    }
    Ok(created)
}

async fn seed_formulas(conn: &mut PgConnection, operator: &str) -> AppResult<u32> {
    let mut created = 0;
    for formula in &FORMULAS {
        if id_by_code(&mut *conn, "formulas", formula.code).await?.is_some() {
            continue;
        }

        let mut query = sqlx::query_scalar::<sqlx::Postgres, Uuid>(
            r#"
            INSERT INTO formulas (
                code, name, version, phase_change_temperature, latent_heat, thermal_conductivity,
                density, specific_heat, melting_point, solidification_point, stability, category,
                standard_reference, is_published, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, TRUE, $14)
            RETURNING id
            "#,
        )
        .bind(formula.code)
        .bind(formula.name)
        .bind(formula.version);
        for property in formula.properties {
            query = query.bind(property.parse::<Decimal>().ok());
        }
        let formula_id = query
            .bind(formula.stability)
            .bind(formula.category)
            .bind(formula.standard_reference)
            .bind(operator)
            .fetch_one(&mut *conn)
            .await?;

        for (material_code, ratio, per_unit) in formula.bom {
            let Some(material_id) = id_by_code(&mut *conn, "materials", material_code).await? else {
                tracing::warn!(formula_code = formula.code, material_code, "Seed BOM material missing");
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO formula_materials (formula_id, material_id, material_code, ratio, required_quantity)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(formula_id)
            .bind(material_id)
            .bind(*material_code)
            .bind(ratio.parse::<Decimal>().ok())
            .bind(per_unit.parse::<Decimal>().ok())
            .execute(&mut *conn)
            .await?;
        }
        created += 1;
    }
    Ok(created)
}

impl SeedService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            retry: config.database.retry_policy(),
        }
    }

    /// Insert whatever demo rows are missing, in one transaction
    pub async fn seed_demo_data(&self, operator: &str) -> AppResult<SeedReport> {
        with_retry(&self.retry, "seed_demo_data", || self.try_seed(operator)).await
    }

    async fn try_seed(&self, operator: &str) -> AppResult<SeedReport> {
        let mut tx = self.db.begin().await?;

        let report = SeedReport {
            suppliers: seed_suppliers(&mut tx).await?,
            materials: seed_materials(&mut tx, operator).await?,
            formulas: seed_formulas(&mut tx, operator).await?,
        };

        tx.commit().await?;

        tracing::info!(
            suppliers = report.suppliers,
            materials = report.materials,
            formulas = report.formulas,
            "Demo data seeded"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{check_stock_quantity, is_valid_material_code, validate_bom_ratios, validate_phone};

    #[test]
    fn test_seed_materials_are_valid() {
        for material in &MATERIALS {
            assert!(is_valid_material_code(material.code), "{}", material.code);
            assert!(SUPPLIERS.iter().any(|s| s.code == material.supplier_code));
            assert!(material.min_stock <= material.max_stock);
        }
        for supplier in &SUPPLIERS {
            assert!(validate_phone(supplier.phone).is_ok(), "{}", supplier.phone);
        }
    }

    #[test]
    fn test_seed_boms_are_valid() {
        for formula in &FORMULAS {
            let ratios: Vec<Decimal> = formula.bom.iter().map(|(_, r, _)| r.parse().unwrap()).collect();
            assert!(validate_bom_ratios(&ratios).is_ok(), "{}", formula.code);
            for (code, _, per_unit) in formula.bom {
                assert!(MATERIALS.iter().any(|m| m.code == *code), "{}", code);
                assert!(check_stock_quantity(per_unit.parse().unwrap()).is_ok());
            }
            for property in formula.properties {
                assert!(property.parse::<Decimal>().is_ok(), "{}", property);
            }
        }
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::services::fixtures::{dec, ledger_rows, material_stock};

    #[sqlx::test]
    async fn test_seed_is_idempotent(pool: PgPool) {
        let service = SeedService {
            db: pool.clone(),
            retry: RetryPolicy::single_attempt(),
        };

        let first = service.seed_demo_data("admin").await.unwrap();
        assert_eq!(first.suppliers, 2);
        assert_eq!(first.materials, 7);
        assert_eq!(first.formulas, 2);

        let second = service.seed_demo_data("admin").await.unwrap();
        assert!(second.is_empty());

        let mut conn = pool.acquire().await.unwrap();
        let p01 = id_by_code(&mut conn, "materials", "P01").await.unwrap().unwrap();
        let l01 = id_by_code(&mut conn, "materials", "L01").await.unwrap().unwrap();
        drop(conn);

        assert_eq!(material_stock(&pool, p01).await, (dec("1000"), MaterialStatus::Normal));
        assert_eq!(material_stock(&pool, l01).await, (dec("50"), MaterialStatus::LowStock));
        assert_eq!(ledger_rows(&pool, p01).await, 1);

        let bom_lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM formula_materials")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(bom_lines, 5);
    }
}
