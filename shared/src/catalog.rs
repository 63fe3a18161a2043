use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// A book as published by the upstream catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalBookRecord {
    pub id: i64,
    pub title: String,
    pub price: BigDecimal,
    #[serde(rename = "stock", alias = "stock_quantity", alias = "stockQuantity")]
    pub stock_quantity: i32,
}

/// Outcome of a catalog synchronisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
}
