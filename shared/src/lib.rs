//! Shared types and rules for the Passive Edge platform
//!
//! This crate holds the domain rules that must behave identically on the
//! server and in the browser dashboard (via WASM): status derivation and
//! transition tables, stock arithmetic, bill-of-materials requirements,
//! identifier formats and courier tracking links.

pub mod error;
pub mod identifiers;
pub mod models;
pub mod shipping;
pub mod types;
pub mod validation;

pub use error::*;
pub use identifiers::*;
pub use models::*;
pub use shipping::*;
pub use types::*;
pub use validation::*;
