use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ConsumptionId, Entity, InventoryError, InventoryResult, LotId, ProductId, UserId};

use crate::actor::Actor;
use crate::consumption::{LotConsumption, RelatedDocument};

/// Lot lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    /// `remaining_quantity > 0`.
    Active,
    /// `remaining_quantity == 0`; a reconciliation credit may reopen it.
    Consumed,
}

impl LotStatus {
    fn for_remaining(remaining: Decimal) -> Self {
        if remaining > Decimal::ZERO {
            LotStatus::Active
        } else {
            LotStatus::Consumed
        }
    }
}

/// Input for creating a lot from purchase intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLot {
    pub product_id: ProductId,
    /// Generated as `{product prefix}-{seq}` when `None` or blank.
    pub lot_number: Option<String>,
    pub initial_quantity: Decimal,
    pub unit_cost: Decimal,
    pub currency: String,
    pub purchase_date: DateTime<Utc>,
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub created_by: Actor,
}

impl NewLot {
    pub fn validate(&self) -> InventoryResult<()> {
        if self.initial_quantity <= Decimal::ZERO {
            return Err(InventoryError::invalid_lot(format!(
                "initial quantity must be positive (got {})",
                self.initial_quantity
            )));
        }
        if self.unit_cost < Decimal::ZERO {
            return Err(InventoryError::invalid_lot(format!(
                "unit cost cannot be negative (got {})",
                self.unit_cost
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(InventoryError::invalid_lot("currency cannot be empty"));
        }
        self.total_cost()?;
        Ok(())
    }

    /// `initial_quantity × unit_cost`, rejected when it does not fit a `Decimal`.
    pub fn total_cost(&self) -> InventoryResult<Decimal> {
        self.initial_quantity.checked_mul(self.unit_cost).ok_or_else(|| {
            InventoryError::invalid_lot(format!(
                "total cost of {} × {} is out of range",
                self.initial_quantity, self.unit_cost
            ))
        })
    }

    /// Caller-supplied lot number, if any (blank counts as absent).
    pub fn requested_lot_number(&self) -> Option<&str> {
        self.lot_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Sequential lot number: `{product prefix}-{seq:03}`.
pub fn sequential_lot_number(product_id: ProductId, seq: usize) -> String {
    format!("{}-{:03}", product_id.short_prefix(), seq)
}

/// Timestamp-based fallback when the sequential number is already taken.
pub fn timestamp_lot_number(product_id: ProductId, now: DateTime<Utc>) -> String {
    format!("{}-{}", product_id.short_prefix(), now.format("%Y%m%d%H%M%S%3f"))
}

/// A quantity movement against one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotMovement {
    Debit(Decimal),
    Credit(Decimal),
}

impl LotMovement {
    pub fn quantity(self) -> Decimal {
        match self {
            LotMovement::Debit(q) | LotMovement::Credit(q) => q,
        }
    }

    /// Signed ledger quantity (negative for debits).
    pub fn signed(self) -> Decimal {
        match self {
            LotMovement::Debit(q) => -q,
            LotMovement::Credit(q) => q,
        }
    }
}

/// One purchased batch of a product at a fixed unit cost.
///
/// The cost basis (`unit_cost`, `total_cost`) and `initial_quantity` are fixed at
/// creation. Quantities move only through [`StockLot::apply_movement`], which keeps
/// `remaining + consumed == initial` with both sides non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLot {
    id: LotId,
    product_id: ProductId,
    lot_number: String,
    initial_quantity: Decimal,
    remaining_quantity: Decimal,
    consumed_quantity: Decimal,
    unit_cost: Decimal,
    currency: String,
    total_cost: Decimal,
    purchase_date: DateTime<Utc>,
    supplier_name: Option<String>,
    invoice_number: Option<String>,
    created_by: UserId,
    created_by_email: String,
    status: LotStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockLot {
    /// Build a fresh `active` lot from a validated spec.
    pub fn create(
        id: LotId,
        spec: NewLot,
        lot_number: String,
        now: DateTime<Utc>,
    ) -> InventoryResult<Self> {
        spec.validate()?;
        let total_cost = spec.total_cost()?;
        if lot_number.trim().is_empty() {
            return Err(InventoryError::invalid_lot("lot number cannot be empty"));
        }

        Ok(Self {
            id,
            product_id: spec.product_id,
            lot_number,
            initial_quantity: spec.initial_quantity,
            remaining_quantity: spec.initial_quantity,
            consumed_quantity: Decimal::ZERO,
            unit_cost: spec.unit_cost,
            currency: spec.currency.trim().to_uppercase(),
            total_cost,
            purchase_date: spec.purchase_date,
            supplier_name: spec.supplier_name,
            invoice_number: spec.invoice_number,
            created_by: spec.created_by.id,
            created_by_email: spec.created_by.email,
            status: LotStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id_typed(&self) -> LotId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn lot_number(&self) -> &str {
        &self.lot_number
    }

    pub fn initial_quantity(&self) -> Decimal {
        self.initial_quantity
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.remaining_quantity
    }

    pub fn consumed_quantity(&self) -> Decimal {
        self.consumed_quantity
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn purchase_date(&self) -> DateTime<Utc> {
        self.purchase_date
    }

    pub fn supplier_name(&self) -> Option<&str> {
        self.supplier_name.as_deref()
    }

    pub fn invoice_number(&self) -> Option<&str> {
        self.invoice_number.as_deref()
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_by_email(&self) -> &str {
        &self.created_by_email
    }

    pub fn status(&self) -> LotStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_available(&self) -> bool {
        self.status == LotStatus::Active && self.remaining_quantity > Decimal::ZERO
    }

    /// Cost value still on hand (`remaining × unit_cost`).
    pub fn remaining_value(&self) -> Decimal {
        self.remaining_quantity * self.unit_cost
    }

    /// Decide a movement against the current state.
    ///
    /// Returns the updated lot plus the ledger entry to append with it; `self` is left
    /// untouched so the caller can commit both in one optimistic write.
    pub fn apply_movement(
        &self,
        movement: LotMovement,
        related: &RelatedDocument,
        entry_id: ConsumptionId,
        now: DateTime<Utc>,
    ) -> InventoryResult<(StockLot, LotConsumption)> {
        let quantity = movement.quantity();
        if quantity <= Decimal::ZERO {
            return Err(InventoryError::validation(format!(
                "movement quantity must be positive (got {quantity})"
            )));
        }

        match movement {
            LotMovement::Debit(q) if q > self.remaining_quantity => {
                if related.is_phantom() {
                    return Err(self.adjustment_error(-q));
                }
                return Err(InventoryError::InsufficientLotQuantity {
                    lot_id: self.id,
                    requested: q,
                    remaining: self.remaining_quantity,
                });
            }
            LotMovement::Credit(q) if q > self.consumed_quantity => {
                return Err(self.adjustment_error(q));
            }
            _ => {}
        }

        let signed = movement.signed();
        let mut next = self.clone();
        next.remaining_quantity += signed;
        next.consumed_quantity -= signed;
        next.status = LotStatus::for_remaining(next.remaining_quantity);
        next.updated_at = now;

        let entry = LotConsumption {
            id: entry_id,
            lot_id: self.id,
            product_id: self.product_id,
            quantity: signed,
            unit_cost_at_consumption: self.unit_cost,
            related_kind: related.kind,
            related_id: related.id.clone(),
            timestamp: now,
            is_phantom: related.is_phantom(),
        };

        Ok((next, entry))
    }

    fn adjustment_error(&self, adjustment: Decimal) -> InventoryError {
        InventoryError::AdjustmentExceedsLotQuantity {
            lot_id: self.id,
            adjustment,
            remaining: self.remaining_quantity,
            consumed: self.consumed_quantity,
        }
    }

    /// Quantity conservation against this lot's full ledger.
    pub fn is_conserved(&self, ledger: &[LotConsumption]) -> bool {
        let posted: Decimal = ledger
            .iter()
            .filter(|e| e.lot_id == self.id)
            .map(|e| e.quantity)
            .sum();

        self.remaining_quantity + self.consumed_quantity == self.initial_quantity
            && self.remaining_quantity >= Decimal::ZERO
            && self.consumed_quantity >= Decimal::ZERO
            && self.initial_quantity + posted == self.remaining_quantity
    }
}

impl Entity for StockLot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
