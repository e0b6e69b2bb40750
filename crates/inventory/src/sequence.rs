//! Year-scoped, gap-free document numbering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::Entity;

/// Kind of document a counter numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterType {
    Order,
    Quote,
    Purchase,
    Shipment,
    Payment,
    Invoice,
}

impl CounterType {
    pub fn prefix(self) -> &'static str {
        match self {
            CounterType::Order => "ORD",
            CounterType::Quote => "QUO",
            CounterType::Purchase => "PUR",
            CounterType::Shipment => "SHP",
            CounterType::Payment => "PAY",
            CounterType::Invoice => "INV",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CounterType::Order => "order",
            CounterType::Quote => "quote",
            CounterType::Purchase => "purchase",
            CounterType::Shipment => "shipment",
            CounterType::Payment => "payment",
            CounterType::Invoice => "invoice",
        }
    }
}

impl core::fmt::Display for CounterType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored counter record (one per counter type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub counter_type: CounterType,
    pub value: u64,
    pub year: i32,
    pub last_updated: DateTime<Utc>,
}

/// An issued number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceNumber {
    pub counter_type: CounterType,
    pub value: u64,
    pub year: i32,
    pub formatted: String,
}

/// `{PREFIX}-{year}-{value:04}`.
pub fn format_sequence(counter_type: CounterType, year: i32, value: u64) -> String {
    format!("{}-{}-{:04}", counter_type.prefix(), year, value)
}

impl CounterState {
    /// A counter that has never issued a number.
    pub fn fresh(counter_type: CounterType, year: i32, now: DateTime<Utc>) -> Self {
        Self {
            counter_type,
            value: 0,
            year,
            last_updated: now,
        }
    }

    /// Next state and the number it issues; resets to 1 when `year` moved forward.
    ///
    /// A clock behind the stored year keeps counting in the stored year so no number
    /// is issued twice.
    pub fn advance(&self, year: i32, now: DateTime<Utc>) -> (CounterState, SequenceNumber) {
        let (year, value) = if year > self.year {
            (year, 1)
        } else {
            (self.year, self.value + 1)
        };
        let next = CounterState {
            counter_type: self.counter_type,
            value,
            year,
            last_updated: now,
        };
        let issued = SequenceNumber {
            counter_type: self.counter_type,
            value,
            year,
            formatted: format_sequence(self.counter_type, year, value),
        };
        (next, issued)
    }
}

impl Entity for CounterState {
    type Id = CounterType;

    fn id(&self) -> &Self::Id {
        &self.counter_type
    }
}
