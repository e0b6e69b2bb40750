//! Inventory costing domain (lots, lot ledger, costing policies, reconciliation).
//!
//! This crate contains the business rules only, implemented as deterministic domain
//! logic (no IO, no storage, no clocks). Storage and retries live in
//! `stockledger-infra`.

pub mod actor;
pub mod consumption;
pub mod costing;
pub mod lot;
pub mod product;
pub mod reconciliation;
pub mod sequence;

pub use actor::Actor;
pub use consumption::{LotConsumption, RelatedDocument, RelatedKind};
pub use costing::{
    available_quantity, order_lots, plan_allocations, weighted_average_cost, Allocation, AllocationPlan,
    CostingPolicy,
};
pub use lot::{sequential_lot_number, timestamp_lot_number, LotMovement, LotStatus, NewLot, StockLot};
pub use product::ProductInfo;
pub use reconciliation::{Period, Reconciliation, ReconciliationReport, ReconciliationStatus};
pub use sequence::{format_sequence, CounterState, CounterType, SequenceNumber};
