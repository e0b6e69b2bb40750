//! Multi-lot consumption as a compensating saga.
//!
//! A consumption walks several lots, each debit being its own optimistic transaction.
//! If a step fails after others committed, the committed steps are credited back (in
//! reverse order) before the error reaches the caller.

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use stockledger_core::{InventoryError, InventoryResult, LotId, ProductId};
use stockledger_inventory::{
    available_quantity, plan_allocations, Allocation, AllocationPlan, CostingPolicy, LotConsumption,
    RelatedDocument, RelatedKind,
};

use crate::lot_store::{ensure_not_reconciliation, LotStore};
use crate::retry::{retry_on_conflict, AttemptError, RetryPolicy};
use crate::store::InventoryStore;

/// A committed saga step that can be undone.
struct Step {
    lot_id: LotId,
    quantity: Decimal,
}

#[derive(Clone)]
pub struct ConsumptionEngine<S> {
    lots: LotStore<S>,
    retry: RetryPolicy,
    default_policy: CostingPolicy,
}

impl<S> ConsumptionEngine<S>
where
    S: InventoryStore,
{
    pub fn new(lots: LotStore<S>, retry: RetryPolicy, default_policy: CostingPolicy) -> Self {
        Self {
            lots,
            retry,
            default_policy,
        }
    }

    pub fn default_policy(&self) -> CostingPolicy {
        self.default_policy
    }

    /// Whether the product's active lots can cover `quantity`. Read-only.
    pub fn has_sufficient_stock(&self, product_id: ProductId, quantity: Decimal) -> InventoryResult<bool> {
        if quantity <= Decimal::ZERO {
            return Err(InventoryError::validation(format!(
                "consumption quantity must be positive (got {quantity})"
            )));
        }
        let lots = self
            .lots
            .list_available_lots(product_id, CostingPolicy::WeightedAverage)?;
        Ok(available_quantity(&lots) >= quantity)
    }

    pub fn consume_with_default(
        &self,
        product_id: ProductId,
        quantity: Decimal,
        related: &RelatedDocument,
    ) -> InventoryResult<AllocationPlan> {
        self.consume(product_id, quantity, self.default_policy, related)
    }

    /// Draw `quantity` of a product from its lots under `policy`.
    ///
    /// All or nothing: on `InsufficientStock` no lot is touched; on a mid-walk failure
    /// every completed debit is reverted before `PartialConsumptionFailure` is returned.
    /// Losing a race for a lot's remaining quantity replans the whole walk.
    pub fn consume(
        &self,
        product_id: ProductId,
        quantity: Decimal,
        policy: CostingPolicy,
        related: &RelatedDocument,
    ) -> InventoryResult<AllocationPlan> {
        ensure_not_reconciliation(related)?;
        let outcome = retry_on_conflict(&self.retry, "consume", || {
            let lots = self.lots.list_available_lots(product_id, policy)?;
            let plan = plan_allocations(product_id, &lots, quantity, policy)?;

            let mut done: Vec<Step> = Vec::with_capacity(plan.allocations.len());
            for allocation in &plan.allocations {
                match self.lots.debit(allocation.lot_id, allocation.quantity, related) {
                    Ok(_) => done.push(Step {
                        lot_id: allocation.lot_id,
                        quantity: allocation.quantity,
                    }),
                    Err(err) => {
                        self.compensate(product_id, &done, related, Direction::Debited, &err)?;
                        return Err(match err {
                            // Another writer took the quantity between planning and debiting.
                            InventoryError::InsufficientLotQuantity { .. } => AttemptError::Conflict(err.to_string()),
                            err if done.is_empty() => AttemptError::Failed(err),
                            err => AttemptError::Failed(InventoryError::PartialConsumptionFailure {
                                product_id,
                                completed_steps: done.len(),
                                reason: err.to_string(),
                            }),
                        });
                    }
                }
            }
            Ok(plan)
        });

        let plan = match outcome {
            Ok(plan) => plan,
            Err(err) => {
                if err.is_business_precondition() {
                    info!(product_id = %product_id, quantity = %quantity, error = %err, "consumption refused");
                } else {
                    warn!(product_id = %product_id, quantity = %quantity, error = %err, "consumption failed");
                }
                return Err(err);
            }
        };

        info!(
            product_id = %product_id,
            policy = %policy,
            quantity = %quantity,
            lots = plan.allocations.len(),
            total_cost = %plan.total_cost,
            related_kind = %related.kind,
            related_id = %related.id,
            "consumption committed"
        );
        Ok(plan)
    }

    /// Put the allocations of a reverted outflow back on their lots.
    ///
    /// Each allocation is credited to its lot as a `reversal` entry; a failure part-way
    /// debits the completed credits again.
    pub fn reverse(
        &self,
        product_id: ProductId,
        allocations: &[Allocation],
        related: &RelatedDocument,
    ) -> InventoryResult<Vec<LotConsumption>> {
        if allocations.is_empty() {
            return Err(InventoryError::validation("nothing to reverse"));
        }
        for allocation in allocations {
            let lot = self.lots.get_lot(allocation.lot_id)?;
            if lot.product_id() != product_id {
                return Err(InventoryError::validation(format!(
                    "lot {} does not belong to product {product_id}",
                    allocation.lot_id
                )));
            }
        }

        let reversal = RelatedDocument::new(RelatedKind::Reversal, related.id.clone());
        let mut done = Vec::with_capacity(allocations.len());
        let mut entries = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            match self.lots.credit(allocation.lot_id, allocation.quantity, &reversal) {
                Ok(entry) => {
                    done.push(Step {
                        lot_id: allocation.lot_id,
                        quantity: allocation.quantity,
                    });
                    entries.push(entry);
                }
                Err(err) => {
                    self.compensate(product_id, &done, related, Direction::Credited, &err)?;
                    if done.is_empty() {
                        return Err(err);
                    }
                    return Err(InventoryError::PartialConsumptionFailure {
                        product_id,
                        completed_steps: done.len(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            product_id = %product_id,
            lots = entries.len(),
            related_id = %related.id,
            "consumption reversed"
        );
        Ok(entries)
    }

    /// Undo `done` in reverse order.
    fn compensate(
        &self,
        product_id: ProductId,
        done: &[Step],
        related: &RelatedDocument,
        direction: Direction,
        cause: &InventoryError,
    ) -> InventoryResult<()> {
        if done.is_empty() {
            return Ok(());
        }
        warn!(
            product_id = %product_id,
            completed_steps = done.len(),
            error = %cause,
            "saga step failed, compensating"
        );

        let compensation = RelatedDocument::new(RelatedKind::Compensation, related.id.clone());
        for step in done.iter().rev() {
            let undone = match direction {
                Direction::Debited => self.lots.credit(step.lot_id, step.quantity, &compensation),
                Direction::Credited => self.lots.debit(step.lot_id, step.quantity, &compensation),
            };
            if let Err(err) = undone {
                error!(
                    product_id = %product_id,
                    lot_id = %step.lot_id,
                    quantity = %step.quantity,
                    error = %err,
                    cause = %cause,
                    "compensation failed, lot left adjusted"
                );
                return Err(InventoryError::CompensationFailed {
                    product_id,
                    reason: format!("{err} (while undoing: {cause})"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Debited,
    Credited,
}
