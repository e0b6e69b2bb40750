use std::sync::Arc;

use thiserror::Error;

use stockledger_core::{ExpectedVersion, InventoryError, LotId, ProductId, ReconciliationId, Versioned};
use stockledger_inventory::{CounterState, CounterType, LotConsumption, Period, Reconciliation, StockLot};

/// Storage operation error.
///
/// These are infrastructure errors as opposed to business errors. `Conflict` is the
/// only retryable one; services run it through the retry policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("invalid write batch: {0}")]
    InvalidBatch(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("lock poisoned")]
    Poisoned,
}

impl From<StoreError> for InventoryError {
    fn from(value: StoreError) -> Self {
        InventoryError::storage(value.to_string())
    }
}

/// All writes of one atomic unit.
///
/// Every entity write carries the version it was read at; consumption entries are
/// append-only. A store commits the whole batch or nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub lots: Vec<(StockLot, ExpectedVersion)>,
    pub consumptions: Vec<LotConsumption>,
    pub reconciliations: Vec<(Reconciliation, ExpectedVersion)>,
    pub counters: Vec<(CounterState, ExpectedVersion)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_lot(&mut self, lot: StockLot, expected: ExpectedVersion) -> &mut Self {
        self.lots.push((lot, expected));
        self
    }

    pub fn append_consumption(&mut self, entry: LotConsumption) -> &mut Self {
        self.consumptions.push(entry);
        self
    }

    pub fn put_reconciliation(&mut self, record: Reconciliation, expected: ExpectedVersion) -> &mut Self {
        self.reconciliations.push((record, expected));
        self
    }

    pub fn put_counter(&mut self, counter: CounterState, expected: ExpectedVersion) -> &mut Self {
        self.counters.push((counter, expected));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
            && self.consumptions.is_empty()
            && self.reconciliations.is_empty()
            && self.counters.is_empty()
    }
}

/// Storage port for lots, the lot ledger, reconciliation records and counters.
///
/// ## Design Principles
///
/// - **No storage assumptions**: in-memory for tests/dev, document or SQL backends in
///   production
/// - **Optimistic locking**: every read returns a version; every write names the
///   version it expects
/// - **Append-only ledger**: consumption entries are never updated or deleted
/// - **Atomic batches**: a lot update, its ledger entry and any reconciliation status
///   change land together or not at all
///
/// Implementations must reject a batch with `Conflict` when any expected version does
/// not match, and with `Duplicate` when a new lot reuses a `(product, lot number)`
/// pair or a ledger entry id is reused.
pub trait InventoryStore: Send + Sync {
    fn lot(&self, id: LotId) -> Result<Option<Versioned<StockLot>>, StoreError>;

    /// Every lot of a product, whatever its status.
    fn lots_for_product(&self, product_id: ProductId) -> Result<Vec<Versioned<StockLot>>, StoreError>;

    /// Ledger entries of one lot in posting order.
    fn consumptions_for_lot(&self, lot_id: LotId) -> Result<Vec<LotConsumption>, StoreError>;

    fn reconciliation(&self, id: ReconciliationId) -> Result<Option<Versioned<Reconciliation>>, StoreError>;

    fn reconciliations_for_period(&self, period: Period) -> Result<Vec<Versioned<Reconciliation>>, StoreError>;

    fn counter(&self, counter_type: CounterType) -> Result<Option<Versioned<CounterState>>, StoreError>;

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn lot(&self, id: LotId) -> Result<Option<Versioned<StockLot>>, StoreError> {
        (**self).lot(id)
    }

    fn lots_for_product(&self, product_id: ProductId) -> Result<Vec<Versioned<StockLot>>, StoreError> {
        (**self).lots_for_product(product_id)
    }

    fn consumptions_for_lot(&self, lot_id: LotId) -> Result<Vec<LotConsumption>, StoreError> {
        (**self).consumptions_for_lot(lot_id)
    }

    fn reconciliation(&self, id: ReconciliationId) -> Result<Option<Versioned<Reconciliation>>, StoreError> {
        (**self).reconciliation(id)
    }

    fn reconciliations_for_period(&self, period: Period) -> Result<Vec<Versioned<Reconciliation>>, StoreError> {
        (**self).reconciliations_for_period(period)
    }

    fn counter(&self, counter_type: CounterType) -> Result<Option<Versioned<CounterState>>, StoreError> {
        (**self).counter(counter_type)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        (**self).commit(batch)
    }
}
