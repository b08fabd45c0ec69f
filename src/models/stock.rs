//! Per-SKU stock rows

use super::SkuId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stock counter for one SKU. `quantity` never drops below zero.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SkuStock {
    pub sku_id: SkuId,
    pub quantity: i32,
    pub updated_at: NaiveDateTime,
}

impl SkuStock {
    /// Whether `requested` units can be taken from this row
    pub fn covers(&self, requested: i64) -> bool {
        i64::from(self.quantity) >= requested
    }
}

/// New quantity for one locked stock row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockUpdate {
    pub sku_id: SkuId,
    pub new_quantity: i32,
}
