//! Gap-free, year-scoped document numbers.

use std::sync::Arc;

use chrono::Datelike;
use tracing::debug;

use stockledger_core::{ExpectedVersion, InventoryResult};
use stockledger_inventory::{format_sequence, CounterState, CounterType, SequenceNumber};

use crate::clock::Clock;
use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::store::{InventoryStore, WriteBatch};

#[derive(Clone)]
pub struct SequenceCounter<S> {
    store: S,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> SequenceCounter<S>
where
    S: InventoryStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Issue the next number for `counter_type`.
    ///
    /// Read-modify-write of the single counter record under a version check; a lost race
    /// re-reads and tries again, so no two callers receive the same value. The value
    /// restarts at 1 when the clock's year differs from the stored one.
    pub fn next_number(&self, counter_type: CounterType) -> InventoryResult<SequenceNumber> {
        let issued = retry_on_conflict(&self.retry, "next_number", || {
            let now = self.clock.now();
            let (state, expected) = match self.store.counter(counter_type)? {
                Some(current) => {
                    let expected = current.expected();
                    (current.value, expected)
                }
                None => (CounterState::fresh(counter_type, now.year(), now), ExpectedVersion::Absent),
            };

            let (next, issued) = state.advance(now.year(), now);
            let mut batch = WriteBatch::new();
            batch.put_counter(next, expected);
            self.store.commit(batch)?;
            Ok(issued)
        })?;

        debug!(counter = %counter_type, number = %issued.formatted, "sequence number issued");
        Ok(issued)
    }

    /// The last issued number, without incrementing.
    pub fn peek(&self, counter_type: CounterType) -> InventoryResult<Option<SequenceNumber>> {
        Ok(self
            .store
            .counter(counter_type)?
            .filter(|c| c.value.value > 0)
            .map(|c| SequenceNumber {
                counter_type,
                value: c.value.value,
                year: c.value.year,
                formatted: format_sequence(counter_type, c.value.year, c.value.value),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::store::InMemoryInventoryStore;

    fn counter_at(clock: Arc<ManualClock>) -> SequenceCounter<Arc<InMemoryInventoryStore>> {
        SequenceCounter::new(
            Arc::new(InMemoryInventoryStore::new()),
            clock,
            RetryPolicy::fixed(3, Duration::ZERO),
        )
    }

    #[test]
    fn numbers_increase_and_are_formatted() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        let counter = counter_at(clock);

        assert_eq!(counter.peek(CounterType::Order).unwrap(), None);
        assert_eq!(counter.next_number(CounterType::Order).unwrap().formatted, "ORD-2024-0001");
        assert_eq!(counter.next_number(CounterType::Order).unwrap().formatted, "ORD-2024-0002");
        // Counters are independent per type.
        assert_eq!(counter.next_number(CounterType::Invoice).unwrap().formatted, "INV-2024-0001");
        assert_eq!(counter.peek(CounterType::Order).unwrap().map(|n| n.value), Some(2));
    }

    #[test]
    fn year_rollover_restarts_at_one() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()));
        let counter = counter_at(clock.clone());
        counter.next_number(CounterType::Shipment).unwrap();
        counter.next_number(CounterType::Shipment).unwrap();

        clock.advance(chrono::Duration::seconds(2));
        let issued = counter.next_number(CounterType::Shipment).unwrap();
        assert_eq!((issued.value, issued.year), (1, 2025));
        assert_eq!(issued.formatted, "SHP-2025-0001");
    }
}
