//! Route definitions for the Passive Edge API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        // Everything else requires a bearer token
        .merge(protected_routes(state))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(handlers::me))
        .route("/auth/password", post(handlers::change_password))
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route("/admin/seed", post(handlers::seed_demo_data))
        .nest("/materials", material_routes())
        .route("/stock-operations", get(handlers::list_stock_operations))
        .nest("/suppliers", supplier_routes())
        .nest("/formulas", formula_routes())
        .nest("/orders", order_routes())
        .nest("/tests", test_routes())
        .route("/dashboard/stats", get(handlers::get_dashboard_stats))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Material and stock ledger routes
fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_materials).post(handlers::create_material))
        .route("/stats", get(handlers::get_material_stats))
        .route("/low-stock", get(handlers::list_low_stock_materials))
        .route("/options", get(handlers::get_material_options))
        .route("/next-code", get(handlers::get_next_material_code))
        .route(
            "/:material_id",
            get(handlers::get_material)
                .put(handlers::update_material)
                .delete(handlers::delete_material),
        )
        .route("/:material_id/stock", post(handlers::apply_stock_operation))
        .route("/:material_id/operations", get(handlers::list_material_operations))
}

fn supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_suppliers).post(handlers::create_supplier))
        .route(
            "/:supplier_id",
            get(handlers::get_supplier)
                .put(handlers::update_supplier)
                .delete(handlers::delete_supplier),
        )
}

/// Formula and BOM routes
fn formula_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_formulas).post(handlers::create_formula))
        .route("/stats", get(handlers::get_formula_stats))
        .route("/options", get(handlers::get_formula_options))
        .route(
            "/:formula_id",
            get(handlers::get_formula)
                .put(handlers::update_formula)
                .delete(handlers::delete_formula),
        )
        .route(
            "/:formula_id/materials",
            get(handlers::get_formula_materials).put(handlers::set_formula_materials),
        )
        .route("/:formula_id/requirements", get(handlers::get_formula_requirements))
        .route("/:formula_id/tests", get(handlers::list_formula_tests))
}

/// Order lifecycle routes
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/stats", get(handlers::get_order_stats))
        .route("/options", get(handlers::get_order_options))
        .route("/by-number/:order_no", get(handlers::get_order_by_no))
        .route(
            "/:order_id",
            get(handlers::get_order)
                .patch(handlers::update_order)
                .delete(handlers::delete_order),
        )
        .route("/:order_id/status", post(handlers::update_order_status))
        .route(
            "/:order_id/tests",
            get(handlers::list_order_tests).post(handlers::create_order_tests),
        )
}

/// Test record routes
fn test_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_test_records).post(handlers::create_test_record))
        .route("/stats", get(handlers::get_test_stats))
        .route(
            "/:test_id",
            get(handlers::get_test_record)
                .patch(handlers::update_test_record)
                .delete(handlers::delete_test_record),
        )
        .route("/:test_id/status", post(handlers::update_test_status))
}
