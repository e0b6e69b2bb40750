//! Lot intake and the single mutation path for the lot ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use stockledger_core::{ConsumptionId, ExpectedVersion, InventoryError, InventoryResult, LotId, ProductId, Versioned};
use stockledger_inventory::{
    order_lots, sequential_lot_number, timestamp_lot_number, weighted_average_cost, CostingPolicy,
    LotConsumption, LotMovement, NewLot, RelatedDocument, StockLot,
};

use crate::clock::Clock;
use crate::retry::{retry_on_conflict, AttemptError, RetryPolicy};
use crate::store::{InventoryStore, StoreError, WriteBatch};

/// On-hand position of one product across its active lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductValuation {
    pub product_id: ProductId,
    pub on_hand: Decimal,
    /// `Σ remaining_i × unit_cost_i`
    pub total_value: Decimal,
    /// `None` when nothing is on hand.
    pub average_unit_cost: Option<Decimal>,
    pub active_lots: usize,
}

/// Lot repository service.
///
/// Every quantity change goes through [`LotStore::post_movement`]: read the lot, decide
/// against the fresh value, then commit the lot and its ledger entry in one versioned
/// batch, retrying on conflict.
#[derive(Clone)]
pub struct LotStore<S> {
    store: S,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> LotStore<S>
where
    S: InventoryStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a purchased lot.
    ///
    /// A blank lot number is generated as `{product prefix}-{seq}`; if that collides
    /// with a concurrent intake the timestamp form is used instead. A caller-supplied
    /// number that already exists for the product is rejected.
    pub fn create_lot(&self, spec: NewLot) -> InventoryResult<StockLot> {
        spec.validate()?;
        let product_id = spec.product_id;
        let requested = spec.requested_lot_number().map(str::to_string);
        let mut collided = false;

        let lot = retry_on_conflict(&self.retry, "create_lot", || {
            let now = self.clock.now();
            let lot_number = match &requested {
                Some(number) => number.clone(),
                None if collided => timestamp_lot_number(product_id, now),
                None => {
                    let existing = self.store.lots_for_product(product_id)?.len();
                    sequential_lot_number(product_id, existing + 1)
                }
            };

            let lot = StockLot::create(LotId::new(), spec.clone(), lot_number, now)?;
            let mut batch = WriteBatch::new();
            batch.put_lot(lot.clone(), ExpectedVersion::Absent);

            match self.store.commit(batch) {
                Ok(()) => Ok(lot),
                Err(StoreError::Duplicate(msg)) if requested.is_some() => {
                    Err(InventoryError::invalid_lot(msg).into())
                }
                Err(StoreError::Duplicate(msg)) => {
                    collided = true;
                    Err(AttemptError::Conflict(msg))
                }
                Err(other) => Err(other.into()),
            }
        })?;

        info!(
            lot_id = %lot.id_typed(),
            product_id = %product_id,
            lot_number = lot.lot_number(),
            quantity = %lot.initial_quantity(),
            unit_cost = %lot.unit_cost(),
            "lot created"
        );
        Ok(lot)
    }

    pub fn get_lot(&self, lot_id: LotId) -> InventoryResult<StockLot> {
        Ok(self.load(lot_id)?.value)
    }

    fn load(&self, lot_id: LotId) -> InventoryResult<Versioned<StockLot>> {
        self.store
            .lot(lot_id)?
            .ok_or_else(|| InventoryError::not_found(format!("lot {lot_id}")))
    }

    /// Active lots of a product in the order `policy` draws from them.
    pub fn list_available_lots(&self, product_id: ProductId, policy: CostingPolicy) -> InventoryResult<Vec<StockLot>> {
        let mut lots: Vec<StockLot> = self
            .store
            .lots_for_product(product_id)?
            .into_iter()
            .map(|v| v.value)
            .filter(StockLot::is_available)
            .collect();
        order_lots(&mut lots, policy);
        Ok(lots)
    }

    pub fn debit(&self, lot_id: LotId, quantity: Decimal, related: &RelatedDocument) -> InventoryResult<LotConsumption> {
        ensure_not_reconciliation(related)?;
        self.post_movement(lot_id, LotMovement::Debit(quantity), related, |_, _| Ok(()))
    }

    pub fn credit(&self, lot_id: LotId, quantity: Decimal, related: &RelatedDocument) -> InventoryResult<LotConsumption> {
        ensure_not_reconciliation(related)?;
        self.post_movement(lot_id, LotMovement::Credit(quantity), related, |_, _| Ok(()))
    }

    /// Apply one movement and append its ledger entry atomically.
    ///
    /// `attach` may add further writes to the same batch (it sees the entry about to be
    /// appended); it runs again on every retry.
    pub(crate) fn post_movement<F>(
        &self,
        lot_id: LotId,
        movement: LotMovement,
        related: &RelatedDocument,
        mut attach: F,
    ) -> InventoryResult<LotConsumption>
    where
        F: FnMut(&mut WriteBatch, &LotConsumption) -> Result<(), AttemptError>,
    {
        let operation = match movement {
            LotMovement::Debit(_) => "lot_debit",
            LotMovement::Credit(_) => "lot_credit",
        };

        retry_on_conflict(&self.retry, operation, || {
            let current = self.load(lot_id)?;
            let (next, entry) =
                current
                    .value
                    .apply_movement(movement, related, ConsumptionId::new(), self.clock.now())?;

            let mut batch = WriteBatch::new();
            batch.put_lot(next, current.expected());
            batch.append_consumption(entry.clone());
            attach(&mut batch, &entry)?;

            self.store.commit(batch)?;
            Ok(entry)
        })
    }

    /// Ledger entries of one lot, oldest first.
    pub fn lot_history(&self, lot_id: LotId) -> InventoryResult<Vec<LotConsumption>> {
        self.load(lot_id)?;
        let mut entries = self.store.consumptions_for_lot(lot_id)?;
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    pub fn valuation(&self, product_id: ProductId) -> InventoryResult<ProductValuation> {
        let lots = self.list_available_lots(product_id, CostingPolicy::WeightedAverage)?;
        Ok(ProductValuation {
            product_id,
            on_hand: lots.iter().map(StockLot::remaining_quantity).sum(),
            total_value: lots.iter().map(StockLot::remaining_value).sum(),
            average_unit_cost: weighted_average_cost(&lots),
            active_lots: lots.len(),
        })
    }
}

/// Phantom entries are posted only through a reconciliation adjustment.
pub(crate) fn ensure_not_reconciliation(related: &RelatedDocument) -> InventoryResult<()> {
    if related.is_phantom() {
        return Err(InventoryError::validation(format!(
            "{} entries can only be posted by a reconciliation adjustment",
            related.kind
        )));
    }
    Ok(())
}
