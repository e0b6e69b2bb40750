#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use stockledger_core::{LotId, ProductId, ReconciliationId, UserId, Versioned};
use stockledger_infra::{
    Clock, EngineConfig, InMemoryInventoryStore, InventoryStore, ManualClock, RetryPolicy, StockLedger, StoreError,
    WriteBatch,
};
use stockledger_inventory::{
    Actor, CounterState, CounterType, LotConsumption, NewLot, Period, Reconciliation, StockLot,
};

pub fn init_tracing() {
    stockledger_observability::init_with_default("warn");
}

pub fn jan(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

pub fn test_actor() -> Actor {
    Actor::new(UserId::new(), "ops@example.com")
}

pub fn test_config(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy::fixed(max_attempts, Duration::ZERO),
        ..EngineConfig::default()
    }
}

pub fn new_lot(product_id: ProductId, number: &str, qty: Decimal, cost: Decimal, purchased: DateTime<Utc>) -> NewLot {
    NewLot {
        product_id,
        lot_number: Some(number.to_string()),
        initial_quantity: qty,
        unit_cost: cost,
        currency: "USD".to_string(),
        purchase_date: purchased,
        supplier_name: Some("Northwind".to_string()),
        invoice_number: Some(format!("INV-{number}")),
        created_by: test_actor(),
    }
}

pub fn in_memory_ledger(config: EngineConfig) -> (StockLedger<Arc<InMemoryInventoryStore>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(jan(31)));
    let store = Arc::new(InMemoryInventoryStore::new());
    (StockLedger::new(store, clock.clone() as Arc<dyn Clock>, config), clock)
}

type CommitHook = Box<dyn FnOnce(&InMemoryInventoryStore) + Send>;

/// Store wrapper that fails chosen commits (1-based, counted from `new`).
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryInventoryStore,
    state: Mutex<FailState>,
    before_commit: Mutex<Option<CommitHook>>,
}

#[derive(Debug, Default)]
struct FailState {
    commits: usize,
    fail_on: HashSet<usize>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the commits `offset` steps after the current one, for each offset given.
    pub fn fail_next(&self, offsets: &[usize]) {
        let mut state = self.state.lock().unwrap();
        let base = state.commits;
        state.fail_on = offsets.iter().map(|o| base + o).collect();
    }

    /// Run `hook` against the underlying store right before the next commit lands,
    /// simulating a concurrent writer.
    pub fn before_next_commit(&self, hook: impl FnOnce(&InMemoryInventoryStore) + Send + 'static) {
        *self.before_commit.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }
}

impl InventoryStore for FailingStore {
    fn lot(&self, id: LotId) -> Result<Option<Versioned<StockLot>>, StoreError> {
        self.inner.lot(id)
    }

    fn lots_for_product(&self, product_id: ProductId) -> Result<Vec<Versioned<StockLot>>, StoreError> {
        self.inner.lots_for_product(product_id)
    }

    fn consumptions_for_lot(&self, lot_id: LotId) -> Result<Vec<LotConsumption>, StoreError> {
        self.inner.consumptions_for_lot(lot_id)
    }

    fn reconciliation(&self, id: ReconciliationId) -> Result<Option<Versioned<Reconciliation>>, StoreError> {
        self.inner.reconciliation(id)
    }

    fn reconciliations_for_period(&self, period: Period) -> Result<Vec<Versioned<Reconciliation>>, StoreError> {
        self.inner.reconciliations_for_period(period)
    }

    fn counter(&self, counter_type: CounterType) -> Result<Option<Versioned<CounterState>>, StoreError> {
        self.inner.counter(counter_type)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.commits += 1;
            state.fail_on.contains(&state.commits)
        };
        if fail {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        let hook = self.before_commit.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.commit(batch)
    }
}
