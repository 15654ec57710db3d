//! Domain models for the Passive Edge platform

mod formula;
mod material;
mod order;
mod stock;
mod supplier;
mod test_record;
mod user;

pub use formula::*;
pub use material::*;
pub use order::*;
pub use stock::*;
pub use supplier::*;
pub use test_record::*;
pub use user::*;
