//! Monthly reconciliation runs and the review/adjust workflow.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tracing::{info, warn};

use stockledger_core::{ExpectedVersion, InventoryError, InventoryResult, ReconciliationId, Versioned};
use stockledger_inventory::{
    Actor, Period, ProductInfo, Reconciliation, ReconciliationReport, ReconciliationStatus, RelatedDocument,
    RelatedKind,
};

use crate::collaborators::{PhysicalCountSource, ProductCatalog};
use crate::lot_store::LotStore;
use crate::retry::{retry_on_conflict, AttemptError, RetryPolicy};
use crate::store::{InventoryStore, WriteBatch};

/// Periods with a run in flight.
type RunLocks = Arc<Mutex<HashSet<Period>>>;

/// Held for the duration of one run; releases the period on drop.
struct RunGuard {
    locks: RunLocks,
    period: Period,
}

impl RunGuard {
    fn acquire(locks: &RunLocks, period: Period) -> InventoryResult<Self> {
        let mut running = locks.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(period) {
            return Err(InventoryError::ReconciliationInProgress(period.to_string()));
        }
        Ok(Self {
            locks: Arc::clone(locks),
            period,
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut running = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.period);
    }
}

#[derive(Clone)]
pub struct ReconciliationEngine<S> {
    lots: LotStore<S>,
    retry: RetryPolicy,
    epsilon: Decimal,
    running: RunLocks,
}

impl<S> ReconciliationEngine<S>
where
    S: InventoryStore,
{
    pub fn new(lots: LotStore<S>, retry: RetryPolicy, epsilon: Decimal) -> Self {
        Self {
            lots,
            retry,
            epsilon,
            running: Arc::default(),
        }
    }

    /// Compare every counted lot of the given products against its ledger balance.
    ///
    /// Creates one `pending` record per lot whose `|variance| > epsilon` and returns the
    /// records created by this run. A lot is skipped when it still has an open record
    /// for the period, or when an existing record already captured the same accounting
    /// and physical figures, so re-running with unchanged inputs creates nothing.
    pub fn run_monthly_reconciliation(
        &self,
        period: Period,
        products: &[ProductInfo],
        counts: &dyn PhysicalCountSource,
    ) -> InventoryResult<Vec<Reconciliation>> {
        let _guard = RunGuard::acquire(&self.running, period)?;
        let store = self.lots.store();

        let created = retry_on_conflict(&self.retry, "run_monthly_reconciliation", || {
            let existing = store.reconciliations_for_period(period)?;
            let now = self.lots.now();
            let mut created = Vec::new();

            for product in products.iter().filter(|p| p.lot_tracking_enabled) {
                for Versioned { value: lot, .. } in store.lots_for_product(product.id)? {
                    let Some(physical) = counts.physical_balance(period, product.id, lot.lot_number()) else {
                        continue;
                    };
                    if physical < Decimal::ZERO {
                        return Err(InventoryError::validation(format!(
                            "negative physical count {physical} for lot {}",
                            lot.lot_number()
                        ))
                        .into());
                    }

                    let accounting = lot.remaining_quantity();
                    let already_seen = existing.iter().any(|r| {
                        r.value.lot_id == lot.id_typed()
                            && (r.value.is_open() || r.value.matches_observation(lot.id_typed(), accounting, physical))
                    });
                    if already_seen {
                        continue;
                    }

                    if let Some(record) = Reconciliation::detect(
                        ReconciliationId::new(),
                        product,
                        &lot,
                        period,
                        physical,
                        self.epsilon,
                        now,
                    )? {
                        created.push(record);
                    }
                }
            }

            let mut batch = WriteBatch::new();
            for record in &created {
                batch.put_reconciliation(record.clone(), ExpectedVersion::Absent);
            }
            store.commit(batch)?;
            Ok(created)
        })?;

        info!(
            period = %period,
            products = products.len(),
            created = created.len(),
            "reconciliation run finished"
        );
        Ok(created)
    }

    /// [`Self::run_monthly_reconciliation`] over the catalog's lot-tracked products.
    pub fn run_for_catalog(
        &self,
        period: Period,
        catalog: &dyn ProductCatalog,
        counts: &dyn PhysicalCountSource,
    ) -> InventoryResult<Vec<Reconciliation>> {
        self.run_monthly_reconciliation(period, &catalog.lot_tracked_products(), counts)
    }

    pub fn get(&self, id: ReconciliationId) -> InventoryResult<Reconciliation> {
        Ok(self.load(id)?.value)
    }

    fn load(&self, id: ReconciliationId) -> InventoryResult<Versioned<Reconciliation>> {
        self.lots
            .store()
            .reconciliation(id)?
            .ok_or_else(|| InventoryError::not_found(format!("reconciliation {id}")))
    }

    pub fn list_for_period(&self, period: Period) -> InventoryResult<Vec<Reconciliation>> {
        Ok(self
            .lots
            .store()
            .reconciliations_for_period(period)?
            .into_iter()
            .map(|v| v.value)
            .collect())
    }

    /// `pending → approved`.
    pub fn approve(&self, id: ReconciliationId, reviewer: &Actor) -> InventoryResult<Reconciliation> {
        self.transition(id, "approve_reconciliation", |record, now| record.approve(reviewer, now))
    }

    /// `pending | approved → rejected`. The record stays as a permanent audit entry.
    pub fn reject(&self, id: ReconciliationId, reviewer: &Actor, reason: Option<String>) -> InventoryResult<Reconciliation> {
        self.transition(id, "reject_reconciliation", |record, now| {
            record.reject(reviewer, reason.clone(), now)
        })
    }

    fn transition<F>(&self, id: ReconciliationId, operation: &str, apply: F) -> InventoryResult<Reconciliation>
    where
        F: Fn(&Reconciliation, chrono::DateTime<chrono::Utc>) -> InventoryResult<Reconciliation>,
    {
        let next = retry_on_conflict(&self.retry, operation, || {
            let current = self.load(id)?;
            let next = apply(&current.value, self.lots.now())?;
            let mut batch = WriteBatch::new();
            batch.put_reconciliation(next.clone(), current.expected());
            self.lots.store().commit(batch)?;
            Ok(next)
        })?;

        info!(reconciliation_id = %id, status = %next.status, "reconciliation transitioned");
        Ok(next)
    }

    /// Post the phantom movement that brings the lot in line with the count and mark
    /// the record `adjusted`, in one atomic write.
    ///
    /// Positive variance credits the lot, negative variance debits it. A debit larger
    /// than the lot's remaining quantity fails with `AdjustmentExceedsLotQuantity`.
    pub fn apply_reconciliation_adjustment(
        &self,
        id: ReconciliationId,
        approver: &Actor,
    ) -> InventoryResult<Reconciliation> {
        let record = self.get(id)?;
        record.ensure_transition(ReconciliationStatus::Adjusted)?;

        let related = RelatedDocument::new(RelatedKind::Reconciliation, id.to_string());
        let mut adjusted = None;
        let result = self.lots.post_movement(record.lot_id, record.adjustment_movement(), &related, |batch, entry| {
            let fresh = self.load(id)?;
            let next = fresh.value.mark_adjusted(approver, entry.id, entry.timestamp)?;
            batch.put_reconciliation(next.clone(), fresh.expected());
            adjusted = Some(next);
            Ok::<(), AttemptError>(())
        });

        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                if matches!(err, InventoryError::AdjustmentExceedsLotQuantity { .. }) {
                    warn!(
                        reconciliation_id = %id,
                        lot_id = %record.lot_id,
                        variance = %record.variance,
                        "adjustment exceeds lot quantity, needs manual review"
                    );
                }
                return Err(err);
            }
        };

        let adjusted = adjusted
            .ok_or_else(|| InventoryError::storage(format!("reconciliation {id} committed without a status update")))?;

        info!(
            reconciliation_id = %id,
            lot_id = %record.lot_id,
            entry_id = %entry.id,
            quantity = %entry.quantity,
            adjusted_by = %approver.email,
            "reconciliation adjustment posted"
        );
        Ok(adjusted)
    }

    /// Status counts and variance totals for a period. Read-only.
    pub fn generate_reconciliation_report(&self, period: Period) -> InventoryResult<ReconciliationReport> {
        let records = self.list_for_period(period)?;
        Ok(ReconciliationReport::from_records(period, &records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use stockledger_core::{LotId, ProductId, UserId};
    use stockledger_inventory::NewLot;

    use crate::clock::SystemClock;
    use crate::collaborators::CountSnapshot;
    use crate::store::InMemoryInventoryStore;

    type Engine = ReconciliationEngine<Arc<InMemoryInventoryStore>>;

    fn setup() -> (Engine, LotStore<Arc<InMemoryInventoryStore>>) {
        let retry = RetryPolicy::fixed(5, Duration::ZERO);
        let lots = LotStore::new(Arc::new(InMemoryInventoryStore::new()), Arc::new(SystemClock), retry.clone());
        (ReconciliationEngine::new(lots.clone(), retry, dec!(0.0001)), lots)
    }

    fn test_actor() -> Actor {
        Actor::new(UserId::new(), "controller@example.com")
    }

    fn lot_with(lots: &LotStore<Arc<InMemoryInventoryStore>>, product: &ProductInfo, qty: Decimal) -> LotId {
        lots.create_lot(NewLot {
            product_id: product.id,
            lot_number: Some("L-1".into()),
            initial_quantity: qty,
            unit_cost: dec!(12),
            currency: "USD".into(),
            purchase_date: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            supplier_name: None,
            invoice_number: None,
            created_by: test_actor(),
        })
        .unwrap()
        .id_typed()
    }

    fn period() -> Period {
        Period::new(2024, 1).unwrap()
    }

    #[test]
    fn matching_counts_produce_no_records() {
        let (engine, lots) = setup();
        let product = ProductInfo::lot_tracked(ProductId::new(), "Beans", "kg");
        lot_with(&lots, &product, dec!(30));
        let mut counts = CountSnapshot::new();
        counts.record(period(), product.id, "L-1", dec!(30.00001));

        let created = engine
            .run_monthly_reconciliation(period(), &[product], &counts)
            .unwrap();
        assert!(created.is_empty());
    }

    #[test]
    fn untracked_products_are_ignored() {
        let (engine, lots) = setup();
        let mut product = ProductInfo::lot_tracked(ProductId::new(), "Beans", "kg");
        lot_with(&lots, &product, dec!(30));
        product.lot_tracking_enabled = false;
        let mut counts = CountSnapshot::new();
        counts.record(period(), product.id, "L-1", dec!(1));

        assert!(engine
            .run_monthly_reconciliation(period(), &[product], &counts)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn positive_variance_credits_the_lot() {
        let (engine, lots) = setup();
        let product = ProductInfo::lot_tracked(ProductId::new(), "Beans", "kg");
        let lot_id = lot_with(&lots, &product, dec!(30));
        lots.debit(lot_id, dec!(10), &RelatedDocument::shipment("s")).unwrap();

        let mut counts = CountSnapshot::new();
        counts.record(period(), product.id, "L-1", dec!(23));
        let created = engine
            .run_monthly_reconciliation(period(), &[product], &counts)
            .unwrap();
        assert_eq!(created[0].variance, dec!(3));

        let approved = engine.approve(created[0].id, &test_actor()).unwrap();
        assert_eq!(approved.status, ReconciliationStatus::Approved);

        let adjusted = engine
            .apply_reconciliation_adjustment(created[0].id, &test_actor())
            .unwrap();
        assert_eq!(adjusted.status, ReconciliationStatus::Adjusted);
        assert_eq!(lots.get_lot(lot_id).unwrap().remaining_quantity(), dec!(23));

        let history = lots.lot_history(lot_id).unwrap();
        let phantom = history.iter().find(|e| e.is_phantom).unwrap();
        assert_eq!(phantom.quantity, dec!(3));
        assert_eq!(adjusted.adjustment_entry_id, Some(phantom.id));
    }

    #[test]
    fn oversized_debit_is_surfaced_and_nothing_changes() {
        let (engine, lots) = setup();
        let product = ProductInfo::lot_tracked(ProductId::new(), "Beans", "kg");
        let lot_id = lot_with(&lots, &product, dec!(30));
        let mut counts = CountSnapshot::new();
        counts.record(period(), product.id, "L-1", dec!(5));
        let created = engine
            .run_monthly_reconciliation(period(), &[product], &counts)
            .unwrap();

        // Stock leaves after the count, so the -25 adjustment no longer fits.
        lots.debit(lot_id, dec!(20), &RelatedDocument::shipment("s")).unwrap();

        let err = engine
            .apply_reconciliation_adjustment(created[0].id, &test_actor())
            .unwrap_err();
        assert!(matches!(err, InventoryError::AdjustmentExceedsLotQuantity { .. }));
        assert_eq!(engine.get(created[0].id).unwrap().status, ReconciliationStatus::Pending);
        assert_eq!(lots.get_lot(lot_id).unwrap().remaining_quantity(), dec!(10));
    }

    #[test]
    fn rejected_records_are_terminal() {
        let (engine, lots) = setup();
        let product = ProductInfo::lot_tracked(ProductId::new(), "Beans", "kg");
        lot_with(&lots, &product, dec!(30));
        let mut counts = CountSnapshot::new();
        counts.record(period(), product.id, "L-1", dec!(28));
        let created = engine
            .run_monthly_reconciliation(period(), &[product], &counts)
            .unwrap();

        let rejected = engine
            .reject(created[0].id, &test_actor(), Some("recount scheduled".into()))
            .unwrap();
        assert_eq!(rejected.notes.as_deref(), Some("recount scheduled"));
        assert!(matches!(
            engine.approve(created[0].id, &test_actor()),
            Err(InventoryError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn concurrent_run_for_the_same_period_is_refused() {
        let (engine, _) = setup();
        let _held = RunGuard::acquire(&engine.running, period()).unwrap();

        let err = engine
            .run_monthly_reconciliation(period(), &[], &CountSnapshot::new())
            .unwrap_err();
        assert_eq!(err, InventoryError::ReconciliationInProgress("2024-01".into()));

        // Other periods are unaffected.
        let other = Period::new(2024, 2).unwrap();
        assert!(engine
            .run_monthly_reconciliation(other, &[], &CountSnapshot::new())
            .is_ok());
    }

    #[test]
    fn run_lock_is_released_after_a_run() {
        let (engine, _) = setup();
        engine
            .run_monthly_reconciliation(period(), &[], &CountSnapshot::new())
            .unwrap();
        assert!(engine
            .run_monthly_reconciliation(period(), &[], &CountSnapshot::new())
            .is_ok());
    }

    #[test]
    fn unknown_record_is_not_found() {
        let (engine, _) = setup();
        assert!(matches!(
            engine.apply_reconciliation_adjustment(ReconciliationId::new(), &test_actor()),
            Err(InventoryError::NotFound(_))
        ));
    }
}
