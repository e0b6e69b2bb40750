//! `stockledger-core`: foundation building blocks for lot costing.
//!
//! Identifiers, the error taxonomy and optimistic-concurrency primitives. No I/O.

pub mod entity;
pub mod error;
pub mod id;
pub mod version;

pub use entity::Entity;
pub use error::{InventoryError, InventoryResult};
pub use id::{ConsumptionId, LotId, ProductId, ReconciliationId, UserId};
pub use version::{ExpectedVersion, Versioned};
