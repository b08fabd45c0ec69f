//! Cart lines and the priced snapshot read at checkout

use super::{CartId, CartLineId, SkuId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A line in a shopper's cart
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub cart_id: CartId,
    pub sku_id: SkuId,
    pub quantity: i32,
}

/// Cart line resolved against the catalog and current stock.
///
/// `unit_price` is the product price plus the SKU's extra price at the time of
/// the read. `available_stock` is read without locking and is only advisory;
/// the reservation re-checks stock under lock.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartLineSnapshot {
    pub cart_line_id: CartLineId,
    pub sku_id: SkuId,
    pub unit_price: Decimal,
    pub requested_quantity: i32,
    pub available_stock: i32,
}

impl CartLineSnapshot {
    /// Price of the line at snapshot time
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.requested_quantity)
    }
}
