use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::RwLock;

use stockledger_core::{ConsumptionId, Entity, ExpectedVersion, LotId, ProductId, ReconciliationId, Versioned};
use stockledger_inventory::{CounterState, CounterType, LotConsumption, Period, Reconciliation, StockLot};

use super::r#trait::{InventoryStore, StoreError, WriteBatch};

#[derive(Debug, Default)]
struct Tables {
    lots: HashMap<LotId, Versioned<StockLot>>,
    lot_numbers: HashSet<(ProductId, String)>,
    ledger: HashMap<LotId, Vec<LotConsumption>>,
    ledger_ids: HashSet<ConsumptionId>,
    reconciliations: HashMap<ReconciliationId, Versioned<Reconciliation>>,
    counters: HashMap<CounterType, Versioned<CounterState>>,
}

fn current_version<T: Entity>(table: &HashMap<T::Id, Versioned<T>>, id: &T::Id) -> u64 {
    table.get(id).map(|v| v.version).unwrap_or(0)
}

fn check_version<T: Entity>(
    table: &HashMap<T::Id, Versioned<T>>,
    record: &T,
    expected: ExpectedVersion,
    kind: &str,
) -> Result<(), StoreError> {
    let current = current_version(table, record.id());
    if expected.matches(current) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{kind} {:?}: expected {expected:?}, found {current}",
            record.id()
        )))
    }
}

fn ensure_unique_ids<'a, T, I>(records: I, kind: &str) -> Result<(), StoreError>
where
    T: Entity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut seen = HashSet::new();
    for r in records {
        if !seen.insert(r.id().clone()) {
            return Err(StoreError::InvalidBatch(format!("{kind} {:?} written twice", r.id())));
        }
    }
    Ok(())
}

fn upsert<T: Entity>(table: &mut HashMap<T::Id, Versioned<T>>, record: T)
where
    T::Id: Hash + Eq,
{
    let next = current_version(table, record.id()) + 1;
    table.insert(record.id().clone(), Versioned::new(record, next));
}

/// In-memory inventory store.
///
/// Intended for tests/dev. One lock guards all tables, so a batch is validated and
/// applied as a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(tables: &Tables, batch: &WriteBatch) -> Result<(), StoreError> {
        ensure_unique_ids(batch.lots.iter().map(|(l, _)| l), "lot")?;
        ensure_unique_ids(batch.reconciliations.iter().map(|(r, _)| r), "reconciliation")?;
        ensure_unique_ids(batch.counters.iter().map(|(c, _)| c), "counter")?;

        let mut new_numbers = HashSet::new();
        for (lot, expected) in &batch.lots {
            check_version(&tables.lots, lot, *expected, "lot")?;
            match tables.lots.get(lot.id()) {
                Some(existing) if existing.value.lot_number() != lot.lot_number() => {
                    return Err(StoreError::InvalidBatch(format!(
                        "lot {} cannot be renumbered",
                        lot.id_typed()
                    )));
                }
                Some(_) => {}
                None => {
                    let key = (lot.product_id(), lot.lot_number().to_string());
                    if tables.lot_numbers.contains(&key) || !new_numbers.insert(key) {
                        return Err(StoreError::Duplicate(format!(
                            "lot number '{}' already used for product {}",
                            lot.lot_number(),
                            lot.product_id()
                        )));
                    }
                }
            }
        }

        let mut new_entries = HashSet::new();
        for entry in &batch.consumptions {
            if tables.ledger_ids.contains(&entry.id) || !new_entries.insert(entry.id) {
                return Err(StoreError::Duplicate(format!("ledger entry {}", entry.id)));
            }
            let known_lot = tables.lots.contains_key(&entry.lot_id)
                || batch.lots.iter().any(|(l, _)| l.id_typed() == entry.lot_id);
            if !known_lot {
                return Err(StoreError::InvalidBatch(format!(
                    "ledger entry {} targets unknown lot {}",
                    entry.id, entry.lot_id
                )));
            }
        }

        for (record, expected) in &batch.reconciliations {
            check_version(&tables.reconciliations, record, *expected, "reconciliation")?;
        }
        for (counter, expected) in &batch.counters {
            check_version(&tables.counters, counter, *expected, "counter")?;
        }

        Ok(())
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn lot(&self, id: LotId) -> Result<Option<Versioned<StockLot>>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.lots.get(&id).cloned())
    }

    fn lots_for_product(&self, product_id: ProductId) -> Result<Vec<Versioned<StockLot>>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        let mut lots: Vec<_> = tables
            .lots
            .values()
            .filter(|v| v.value.product_id() == product_id)
            .cloned()
            .collect();
        // Stable listing order: creation time, then id.
        lots.sort_by(|a, b| {
            a.value
                .created_at()
                .cmp(&b.value.created_at())
                .then_with(|| a.value.id_typed().cmp(&b.value.id_typed()))
        });
        Ok(lots)
    }

    fn consumptions_for_lot(&self, lot_id: LotId) -> Result<Vec<LotConsumption>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.ledger.get(&lot_id).cloned().unwrap_or_default())
    }

    fn reconciliation(&self, id: ReconciliationId) -> Result<Option<Versioned<Reconciliation>>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.reconciliations.get(&id).cloned())
    }

    fn reconciliations_for_period(&self, period: Period) -> Result<Vec<Versioned<Reconciliation>>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        let mut records: Vec<_> = tables
            .reconciliations
            .values()
            .filter(|v| v.value.period == period)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.value
                .created_at
                .cmp(&b.value.created_at)
                .then_with(|| a.value.id.cmp(&b.value.id))
        });
        Ok(records)
    }

    fn counter(&self, counter_type: CounterType) -> Result<Option<Versioned<CounterState>>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.counters.get(&counter_type).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        Self::validate(&tables, &batch)?;

        for (lot, _) in batch.lots {
            tables
                .lot_numbers
                .insert((lot.product_id(), lot.lot_number().to_string()));
            upsert(&mut tables.lots, lot);
        }
        for entry in batch.consumptions {
            tables.ledger_ids.insert(entry.id);
            tables.ledger.entry(entry.lot_id).or_default().push(entry);
        }
        for (record, _) in batch.reconciliations {
            upsert(&mut tables.reconciliations, record);
        }
        for (counter, _) in batch.counters {
            upsert(&mut tables.counters, counter);
        }

        Ok(())
    }
}
