//! Rows for tests that run against a migrated database

use rust_decimal::Decimal;
use shared::{MaterialStatus, OrderStatus, TestStatus};
use sqlx::PgPool;
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub async fn insert_material(pool: &PgPool, code: &str, stock: &str, min_stock: &str) -> Uuid {
    let (stock, min_stock) = (dec(stock), dec(min_stock));
    sqlx::query_scalar(
        r#"
        INSERT INTO materials (code, name, category, unit, current_stock, min_stock, status, created_by)
        VALUES ($1, $1, '相变材料', 'kg', $2, $3, $4, 'tester')
        RETURNING id
        "#,
    )
    .bind(code)
    .bind(stock)
    .bind(min_stock)
    .bind(MaterialStatus::derive(stock, min_stock))
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Published formula whose BOM draws `per_unit` of each material per product
pub async fn insert_formula(pool: &PgPool, code: &str, bom: &[(Uuid, &str, &str)]) -> Uuid {
    let formula_id: Uuid = sqlx::query_scalar(
        "INSERT INTO formulas (code, name, is_published, created_by) VALUES ($1, $1, TRUE, 'tester') RETURNING id",
    )
    .bind(code)
    .fetch_one(pool)
    .await
    .unwrap();

    for (material_id, material_code, per_unit) in bom {
        sqlx::query(
            r#"
            INSERT INTO formula_materials (formula_id, material_id, material_code, ratio, required_quantity)
            VALUES ($1, $2, $3, 10, $4)
            "#,
        )
        .bind(formula_id)
        .bind(material_id)
        .bind(material_code)
        .bind(dec(per_unit))
        .execute(pool)
        .await
        .unwrap();
    }

    formula_id
}

pub async fn insert_order(
    pool: &PgPool,
    order_no: &str,
    formula_id: Option<Uuid>,
    quantity: i32,
    status: OrderStatus,
) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO orders (order_no, customer_name, status, formula_id, quantity, unit, created_by, creator_code)
        VALUES ($1, 'Test Customer', $2, $3, $4, 'pcs', 'tester', 'T')
        RETURNING id
        "#,
    )
    .bind(order_no)
    .bind(status)
    .bind(formula_id)
    .bind(quantity)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_test(
    pool: &PgPool,
    test_no: &str,
    formula_id: Uuid,
    order_id: Option<Uuid>,
    status: TestStatus,
) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO test_records (test_no, formula_id, formula_name, order_id, test_type, status, tester, created_by)
        VALUES ($1, $2, 'Formula', $3, '热循环', $4, 'qc', 'qc')
        RETURNING id
        "#,
    )
    .bind(test_no)
    .bind(formula_id)
    .bind(order_id)
    .bind(status)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn material_stock(pool: &PgPool, material_id: Uuid) -> (Decimal, MaterialStatus) {
    sqlx::query_as("SELECT current_stock, status FROM materials WHERE id = $1")
        .bind(material_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn ledger_rows(pool: &PgPool, material_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM stock_operations WHERE material_id = $1")
        .bind(material_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn order_status(pool: &PgPool, order_id: Uuid) -> OrderStatus {
    sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
