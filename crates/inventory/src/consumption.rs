//! Lot ledger entries (append-only audit trail).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ConsumptionId, LotId, ProductId};

/// Kind of document a ledger entry was posted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedKind {
    Shipment,
    Order,
    StockCount,
    /// Reconciliation adjustment; the only origin of phantom entries.
    Reconciliation,
    /// Saga compensation for a multi-lot walk that failed mid-way.
    Compensation,
    /// Reversal of a deleted or reverted shipment.
    Reversal,
}

impl RelatedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelatedKind::Shipment => "shipment",
            RelatedKind::Order => "order",
            RelatedKind::StockCount => "stock_count",
            RelatedKind::Reconciliation => "reconciliation",
            RelatedKind::Compensation => "compensation",
            RelatedKind::Reversal => "reversal",
        }
    }
}

impl core::fmt::Display for RelatedKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the document that caused a lot movement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub kind: RelatedKind,
    pub id: String,
}

impl RelatedDocument {
    pub fn new(kind: RelatedKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn shipment(id: impl Into<String>) -> Self {
        Self::new(RelatedKind::Shipment, id)
    }

    pub fn is_phantom(&self) -> bool {
        self.kind == RelatedKind::Reconciliation
    }
}

/// One immutable debit or credit against exactly one lot.
///
/// `quantity` is signed: negative for consumption, positive for credits. For every
/// lot, `initial_quantity + Σ quantity == remaining_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotConsumption {
    pub id: ConsumptionId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    /// Locked at posting time; never recomputed.
    pub unit_cost_at_consumption: Decimal,
    pub related_kind: RelatedKind,
    pub related_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_phantom: bool,
}

