//! Inputs the engine relies on but does not own: the product catalog and physical counts.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;

use stockledger_core::ProductId;
use stockledger_inventory::{Period, ProductInfo};

pub trait ProductCatalog: Send + Sync {
    fn product(&self, id: ProductId) -> Option<ProductInfo>;

    fn products(&self) -> Vec<ProductInfo>;

    /// Products the engine acts on.
    fn lot_tracked_products(&self) -> Vec<ProductInfo> {
        self.products()
            .into_iter()
            .filter(|p| p.lot_tracking_enabled)
            .collect()
    }
}

/// Physically counted balances, one per product lot and period.
///
/// `None` means the lot was not counted; such lots are skipped by a reconciliation run.
pub trait PhysicalCountSource: Send + Sync {
    fn physical_balance(&self, period: Period, product_id: ProductId, lot_number: &str) -> Option<Decimal>;
}

/// Catalog held in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, ProductInfo>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, product: ProductInfo) {
        let mut guard = self.products.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(product.id, product);
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn product(&self, id: ProductId) -> Option<ProductInfo> {
        let guard = self.products.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&id).cloned()
    }

    fn products(&self) -> Vec<ProductInfo> {
        let guard = self.products.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = guard.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

/// A stock-count sheet: counted quantities keyed by period, product and lot number.
#[derive(Debug, Clone, Default)]
pub struct CountSnapshot {
    counts: HashMap<(Period, ProductId, String), Decimal>,
}

impl CountSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, period: Period, product_id: ProductId, lot_number: impl Into<String>, counted: Decimal) -> &mut Self {
        self.counts.insert((period, product_id, lot_number.into()), counted);
        self
    }
}

impl PhysicalCountSource for CountSnapshot {
    fn physical_balance(&self, period: Period, product_id: ProductId, lot_number: &str) -> Option<Decimal> {
        self.counts
            .get(&(period, product_id, lot_number.to_string()))
            .copied()
    }
}
