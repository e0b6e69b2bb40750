//! Service wiring over one store.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::consumption_engine::ConsumptionEngine;
use crate::lot_store::LotStore;
use crate::reconciliation_engine::ReconciliationEngine;
use crate::sequence_counter::SequenceCounter;
use crate::store::{InMemoryInventoryStore, InventoryStore};

/// The four services sharing one store, clock and configuration.
#[derive(Clone)]
pub struct StockLedger<S> {
    pub lots: LotStore<S>,
    pub consumption: ConsumptionEngine<S>,
    pub reconciliation: ReconciliationEngine<S>,
    pub counters: SequenceCounter<S>,
}

impl<S> StockLedger<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let lots = LotStore::new(store.clone(), Arc::clone(&clock), config.retry.clone());
        Self {
            consumption: ConsumptionEngine::new(lots.clone(), config.retry.clone(), config.default_policy),
            reconciliation: ReconciliationEngine::new(lots.clone(), config.retry.clone(), config.variance_epsilon),
            counters: SequenceCounter::new(store, clock, config.retry),
            lots,
        }
    }
}

impl StockLedger<Arc<InMemoryInventoryStore>> {
    /// In-memory wiring (dev/test).
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(InMemoryInventoryStore::new()), Arc::new(SystemClock), config)
    }
}
