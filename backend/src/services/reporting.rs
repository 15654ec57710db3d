//! Dashboard aggregation and CSV export

use serde::Serialize;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::formula::{FormulaService, FormulaStats};
use crate::services::material::{Material, MaterialService, MaterialStats};
use crate::services::order::{Order, OrderService, OrderStats};
use crate::services::test_record::{TestRecord, TestRecordService, TestRecordStats};

const DASHBOARD_LOW_STOCK_LIMIT: i64 = 10;
const DASHBOARD_PENDING_LIMIT: i64 = 5;

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    materials: MaterialService,
    formulas: FormulaService,
    orders: OrderService,
    tests: TestRecordService,
}

/// Everything the dashboard shows on one screen
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub materials: MaterialStats,
    pub formulas: FormulaStats,
    pub orders: OrderStats,
    pub tests: TestRecordStats,
    pub low_stock_materials: Vec<Material>,
    pub pending_orders: Vec<Order>,
    pub pending_tests: Vec<TestRecord>,
}

impl ReportingService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            materials: MaterialService::new(db.clone(), config),
            formulas: FormulaService::new(db.clone(), config),
            orders: OrderService::new(db.clone(), config),
            tests: TestRecordService::new(db, config),
        }
    }

    /// Get dashboard statistics
    pub async fn get_dashboard_stats(&self) -> AppResult<DashboardStats> {
        let (materials, formulas, orders, tests) = tokio::try_join!(
            self.materials.get_stats(),
            self.formulas.get_stats(),
            self.orders.get_stats(),
            self.tests.get_stats(),
        )?;

        let (low_stock_materials, pending_orders, pending_tests) = tokio::try_join!(
            self.materials.list_low_stock(Some(DASHBOARD_LOW_STOCK_LIMIT)),
            self.orders.list_pending(DASHBOARD_PENDING_LIMIT),
            self.tests.list_pending(DASHBOARD_PENDING_LIMIT),
        )?;

        Ok(DashboardStats {
            materials,
            formulas,
            orders,
            tests,
            low_stock_materials,
            pending_orders,
            pending_tests,
        })
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}
