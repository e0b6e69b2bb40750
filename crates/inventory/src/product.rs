use serde::{Deserialize, Serialize};

use stockledger_core::ProductId;

/// Catalog entry as supplied by the product catalog collaborator.
///
/// Only products with `lot_tracking_enabled` take part in lot costing and
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: ProductId,
    pub name: String,
    pub unit: String,
    pub lot_tracking_enabled: bool,
}

impl ProductInfo {
    pub fn lot_tracked(id: ProductId, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            unit: unit.into(),
            lot_tracking_enabled: true,
        }
    }
}
