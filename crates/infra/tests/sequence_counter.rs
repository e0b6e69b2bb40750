mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};

use stockledger_inventory::CounterType;

use common::{in_memory_ledger, init_tracing, test_config};

#[test]
fn concurrent_callers_get_distinct_gap_free_numbers() -> anyhow::Result<()> {
    init_tracing();
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    // Every lost race means another caller won, so this many attempts always suffices.
    let (ledger, _) = in_memory_ledger(test_config((THREADS * PER_THREAD) as u32));
    let ledger = Arc::new(ledger);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| ledger.counters.next_number(CounterType::Order).map(|n| n.value))
                    .collect::<Result<Vec<_>, _>>()
            })
        })
        .collect();

    let mut seen = BTreeSet::new();
    for handle in handles {
        for value in handle.join().expect("counter thread panicked")? {
            assert!(seen.insert(value), "value {value} issued twice");
        }
    }

    let expected: BTreeSet<u64> = (1..=(THREADS * PER_THREAD) as u64).collect();
    assert_eq!(seen, expected);
    Ok(())
}

#[test]
fn year_change_restarts_numbering() -> anyhow::Result<()> {
    let (ledger, clock) = in_memory_ledger(test_config(5));
    clock.set(Utc.with_ymd_and_hms(2024, 12, 31, 18, 0, 0).unwrap());

    for _ in 0..3 {
        ledger.counters.next_number(CounterType::Payment)?;
    }
    assert_eq!(
        ledger.counters.peek(CounterType::Payment)?.map(|n| n.formatted),
        Some("PAY-2024-0003".to_string())
    );

    clock.set(Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap());
    let first = ledger.counters.next_number(CounterType::Payment)?;
    let second = ledger.counters.next_number(CounterType::Payment)?;
    assert_eq!(first.formatted, "PAY-2025-0001");
    assert_eq!(second.formatted, "PAY-2025-0002");
    Ok(())
}

#[test]
fn every_counter_type_has_its_own_prefix() -> anyhow::Result<()> {
    let (ledger, _) = in_memory_ledger(test_config(5));
    let issued: Vec<String> = [
        CounterType::Order,
        CounterType::Quote,
        CounterType::Purchase,
        CounterType::Shipment,
        CounterType::Payment,
        CounterType::Invoice,
    ]
    .into_iter()
    .map(|t| ledger.counters.next_number(t).map(|n| n.formatted))
    .collect::<Result<_, _>>()?;

    assert_eq!(
        issued,
        ["ORD-2024-0001", "QUO-2024-0001", "PUR-2024-0001", "SHP-2024-0001", "PAY-2024-0001", "INV-2024-0001"]
    );
    Ok(())
}
