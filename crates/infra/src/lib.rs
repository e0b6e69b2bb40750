//! Infrastructure layer: storage port, retries, configuration and the engine services.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod consumption_engine;
pub mod ledger;
pub mod lot_store;
pub mod reconciliation_engine;
pub mod retry;
pub mod sequence_counter;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{CountSnapshot, InMemoryCatalog, PhysicalCountSource, ProductCatalog};
pub use config::EngineConfig;
pub use consumption_engine::ConsumptionEngine;
pub use ledger::StockLedger;
pub use lot_store::{LotStore, ProductValuation};
pub use reconciliation_engine::ReconciliationEngine;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use sequence_counter::SequenceCounter;
pub use store::{InMemoryInventoryStore, InventoryStore, StoreError, WriteBatch};
