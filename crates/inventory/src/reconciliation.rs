//! Reconciliation records: ledger vs. physical count variance and its review workflow.

use core::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    ConsumptionId, Entity, InventoryError, InventoryResult, LotId, ProductId, ReconciliationId, UserId,
};

use crate::actor::Actor;
use crate::lot::{LotMovement, StockLot};
use crate::product::ProductInfo;

/// Accounting period (calendar year-month), rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> InventoryResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(InventoryError::validation(format!("invalid period month {month}")));
        }
        Ok(Self { year, month })
    }

    /// The period containing `at`.
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl core::fmt::Display for Period {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InventoryError::validation(format!("invalid period '{s}' (expected YYYY-MM)"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Period::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = InventoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

/// Reconciliation lifecycle: `pending → approved → adjusted`, or `→ rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Pending,
    Approved,
    Adjusted,
    Rejected,
}

impl ReconciliationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconciliationStatus::Pending => "pending",
            ReconciliationStatus::Approved => "approved",
            ReconciliationStatus::Adjusted => "adjusted",
            ReconciliationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReconciliationStatus::Adjusted | ReconciliationStatus::Rejected)
    }

    pub fn can_transition_to(self, next: ReconciliationStatus) -> bool {
        use ReconciliationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Adjusted) | (Approved, Adjusted) | (Pending, Rejected) | (Approved, Rejected)
        )
    }
}

impl core::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected variance for one product lot in one period.
///
/// Never deleted; rejected records stay as part of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub id: ReconciliationId,
    pub product_id: ProductId,
    pub product_name: String,
    pub lot_id: LotId,
    pub lot_number: String,
    pub period: Period,
    /// Ledger-derived remaining quantity when the run happened.
    pub accounting_balance: Decimal,
    pub physical_balance: Decimal,
    /// `physical_balance - accounting_balance`.
    pub variance: Decimal,
    pub unit_cost: Decimal,
    /// `variance × unit_cost`.
    pub variance_value: Decimal,
    pub status: ReconciliationStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_by_email: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub adjusted_by: Option<UserId>,
    pub adjusted_by_email: Option<String>,
    pub adjusted_at: Option<DateTime<Utc>>,
    /// Phantom ledger entry posted by the adjustment.
    pub adjustment_entry_id: Option<ConsumptionId>,
}

impl Reconciliation {
    /// Compare a lot against its physical count; `None` when `|variance| <= epsilon`.
    ///
    /// A count whose variance value does not fit a `Decimal` is a validation error.
    pub fn detect(
        id: ReconciliationId,
        product: &ProductInfo,
        lot: &StockLot,
        period: Period,
        physical_balance: Decimal,
        epsilon: Decimal,
        now: DateTime<Utc>,
    ) -> InventoryResult<Option<Self>> {
        let accounting_balance = lot.remaining_quantity();
        let variance = physical_balance - accounting_balance;
        if variance.abs() <= epsilon {
            return Ok(None);
        }
        let variance_value = variance.checked_mul(lot.unit_cost()).ok_or_else(|| {
            InventoryError::validation(format!(
                "physical count {physical_balance} for lot {} is out of range",
                lot.lot_number()
            ))
        })?;

        Ok(Some(Self {
            id,
            product_id: product.id,
            product_name: product.name.clone(),
            lot_id: lot.id_typed(),
            lot_number: lot.lot_number().to_string(),
            period,
            accounting_balance,
            physical_balance,
            variance,
            unit_cost: lot.unit_cost(),
            variance_value,
            status: ReconciliationStatus::Pending,
            created_at: now,
            reviewed_by: None,
            reviewed_by_email: None,
            reviewed_at: None,
            notes: None,
            adjusted_by: None,
            adjusted_by_email: None,
            adjusted_at: None,
            adjustment_entry_id: None,
        }))
    }

    /// Pending or approved: still awaiting a terminal decision.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Same lot, same counted figures.
    pub fn matches_observation(&self, lot_id: LotId, accounting: Decimal, physical: Decimal) -> bool {
        self.lot_id == lot_id && self.accounting_balance == accounting && self.physical_balance == physical
    }

    /// Lot movement that brings the ledger in line with the physical count.
    pub fn adjustment_movement(&self) -> LotMovement {
        if self.variance.is_sign_negative() {
            LotMovement::Debit(-self.variance)
        } else {
            LotMovement::Credit(self.variance)
        }
    }

    pub fn ensure_transition(&self, next: ReconciliationStatus) -> InventoryResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(InventoryError::InvalidStateTransition {
                id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn approve(&self, reviewer: &Actor, now: DateTime<Utc>) -> InventoryResult<Self> {
        self.ensure_transition(ReconciliationStatus::Approved)?;
        let mut next = self.clone();
        next.status = ReconciliationStatus::Approved;
        next.reviewed_by = Some(reviewer.id);
        next.reviewed_by_email = Some(reviewer.email.clone());
        next.reviewed_at = Some(now);
        Ok(next)
    }

    pub fn reject(&self, reviewer: &Actor, reason: Option<String>, now: DateTime<Utc>) -> InventoryResult<Self> {
        self.ensure_transition(ReconciliationStatus::Rejected)?;
        let mut next = self.clone();
        next.status = ReconciliationStatus::Rejected;
        next.reviewed_by = Some(reviewer.id);
        next.reviewed_by_email = Some(reviewer.email.clone());
        next.reviewed_at = Some(now);
        next.notes = reason;
        Ok(next)
    }

    pub fn mark_adjusted(&self, approver: &Actor, entry_id: ConsumptionId, now: DateTime<Utc>) -> InventoryResult<Self> {
        self.ensure_transition(ReconciliationStatus::Adjusted)?;
        let mut next = self.clone();
        next.status = ReconciliationStatus::Adjusted;
        next.adjusted_by = Some(approver.id);
        next.adjusted_by_email = Some(approver.email.clone());
        next.adjusted_at = Some(now);
        next.adjustment_entry_id = Some(entry_id);
        Ok(next)
    }
}

impl Entity for Reconciliation {
    type Id = ReconciliationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Read-side summary of one period's reconciliation records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub period: Period,
    pub total_records: usize,
    pub pending: usize,
    pub approved: usize,
    pub adjusted: usize,
    pub rejected: usize,
    /// Net variance quantity across all records.
    pub total_variance_quantity: Decimal,
    /// Net variance value across all records.
    pub total_variance_value: Decimal,
    /// Value already posted to the ledger.
    pub adjusted_variance_value: Decimal,
    /// Value awaiting a decision (pending + approved).
    pub open_variance_value: Decimal,
}

impl ReconciliationReport {
    pub fn from_records<'a>(period: Period, records: impl IntoIterator<Item = &'a Reconciliation>) -> Self {
        let mut report = Self {
            period,
            total_records: 0,
            pending: 0,
            approved: 0,
            adjusted: 0,
            rejected: 0,
            total_variance_quantity: Decimal::ZERO,
            total_variance_value: Decimal::ZERO,
            adjusted_variance_value: Decimal::ZERO,
            open_variance_value: Decimal::ZERO,
        };

        for r in records.into_iter().filter(|r| r.period == period) {
            report.total_records += 1;
            report.total_variance_quantity += r.variance;
            report.total_variance_value += r.variance_value;
            match r.status {
                ReconciliationStatus::Pending => {
                    report.pending += 1;
                    report.open_variance_value += r.variance_value;
                }
                ReconciliationStatus::Approved => {
                    report.approved += 1;
                    report.open_variance_value += r.variance_value;
                }
                ReconciliationStatus::Adjusted => {
                    report.adjusted += 1;
                    report.adjusted_variance_value += r.variance_value;
                }
                ReconciliationStatus::Rejected => report.rejected += 1,
            }
        }

        report
    }
}
