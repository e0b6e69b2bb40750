//! Error model for the costing and reconciliation engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{LotId, ProductId, ReconciliationId};

/// Result type used across the engine.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Engine-level error.
///
/// Business preconditions and invariant violations are always returned as typed
/// errors; nothing here is silently clamped or coerced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Malformed lot creation input (non-positive quantity, negative cost, ...).
    #[error("invalid lot spec: {0}")]
    InvalidLotSpec(String),

    /// Not enough active stock across all lots of a product.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: Decimal,
        available: Decimal,
    },

    /// A single lot no longer holds the quantity a debit asked for.
    #[error("insufficient quantity in lot {lot_id}: requested {requested}, remaining {remaining}")]
    InsufficientLotQuantity {
        lot_id: LotId,
        requested: Decimal,
        remaining: Decimal,
    },

    /// Optimistic transaction retries were exhausted.
    #[error("concurrency conflict in {operation} after {attempts} attempt(s)")]
    ConcurrencyConflict { operation: String, attempts: u32 },

    /// Illegal reconciliation status change.
    #[error("invalid state transition for reconciliation {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: ReconciliationId,
        from: String,
        to: String,
    },

    /// An adjustment would drive a lot's remaining or consumed quantity negative.
    #[error("adjustment of {adjustment} exceeds lot {lot_id} (remaining {remaining}, consumed {consumed})")]
    AdjustmentExceedsLotQuantity {
        lot_id: LotId,
        adjustment: Decimal,
        remaining: Decimal,
        consumed: Decimal,
    },

    /// A multi-lot walk failed mid-way; every partial debit has been reverted.
    #[error("consumption for product {product_id} failed after {completed_steps} lot step(s), all reverted: {reason}")]
    PartialConsumptionFailure {
        product_id: ProductId,
        completed_steps: usize,
        reason: String,
    },

    /// Reverting partial debits failed; lot state needs manual attention.
    #[error("compensation failed for product {product_id}: {reason}")]
    CompensationFailed { product_id: ProductId, reason: String },

    /// Another reconciliation run already holds the lock for this period.
    #[error("reconciliation already running for period {0}")]
    ReconciliationInProgress(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The storage backend failed in a non-retryable way.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl InventoryError {
    pub fn invalid_lot(msg: impl Into<String>) -> Self {
        Self::InvalidLotSpec(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn conflict(operation: impl Into<String>, attempts: u32) -> Self {
        Self::ConcurrencyConflict {
            operation: operation.into(),
            attempts,
        }
    }

    /// Business precondition failures the caller is expected to correct.
    pub fn is_business_precondition(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. }
                | Self::InsufficientLotQuantity { .. }
                | Self::AdjustmentExceedsLotQuantity { .. }
        )
    }
}
