//! Business logic services for the Passive Edge platform

pub mod auth;
pub mod formula;
pub mod ledger;
pub mod material;
pub mod order;
pub mod reporting;
pub mod seed;
pub mod sequence;
pub mod supplier;
pub mod test_record;

#[cfg(test)]
pub(crate) mod fixtures;

pub use auth::AuthService;
pub use formula::FormulaService;
pub use ledger::LedgerService;
pub use material::MaterialService;
pub use order::OrderService;
pub use reporting::ReportingService;
pub use seed::SeedService;
pub use supplier::SupplierService;
pub use test_record::TestRecordService;
