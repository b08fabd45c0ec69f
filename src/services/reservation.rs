//! Stock reservation for a checkout attempt

use crate::error::{CheckoutError, CheckoutResult};
use crate::models::{CartLineId, CartLineSnapshot, SkuId, StockUpdate};
use crate::repositories::StockLedger;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Stock taken for one cart line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub cart_line_id: CartLineId,
    pub sku_id: SkuId,
    /// Quantity left on the SKU's stock row after this reservation
    pub new_quantity: i32,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl Reservation {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Verifies and decrements stock for a set of cart lines under row locks
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationEngine;

impl ReservationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Reserve stock for `lines` inside the caller's open transaction.
    ///
    /// Locks are taken once, over the distinct SKUs in ascending id order, so
    /// overlapping checkouts always queue on rows in the same order. Quantities
    /// for a SKU that appears on several lines are summed before the check.
    /// On any error nothing has been written; the caller must roll back.
    pub async fn reserve<L>(
        &self,
        ledger: &L,
        tx: &mut L::Tx,
        lines: &[CartLineSnapshot],
    ) -> CheckoutResult<Vec<Reservation>>
    where
        L: StockLedger + ?Sized,
    {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut requested: BTreeMap<SkuId, i64> = BTreeMap::new();
        for line in lines {
            if line.requested_quantity <= 0 {
                return Err(CheckoutError::InvalidQuantity {
                    sku_id: line.sku_id,
                    quantity: line.requested_quantity,
                });
            }
            *requested.entry(line.sku_id).or_insert(0) += i64::from(line.requested_quantity);
        }

        let sku_ids: BTreeSet<SkuId> = requested.keys().copied().collect();
        let locked = ledger.lock_for_update(tx, &sku_ids).await?;

        let mut updates = Vec::with_capacity(requested.len());
        for (&sku_id, &total) in &requested {
            let row = locked
                .get(&sku_id)
                .filter(|row| row.covers(total))
                .ok_or(CheckoutError::InsufficientStock { sku_id })?;

            // covers() guarantees 0 <= remaining <= row.quantity
            let remaining = i64::from(row.quantity) - total;
            updates.push(StockUpdate {
                sku_id,
                new_quantity: i32::try_from(remaining)
                    .map_err(|_| CheckoutError::InsufficientStock { sku_id })?,
            });
        }

        ledger.apply_decrements(tx, &updates).await?;
        debug!(skus = updates.len(), lines = lines.len(), "Stock reserved");

        let remaining: BTreeMap<SkuId, i32> = updates
            .iter()
            .map(|update| (update.sku_id, update.new_quantity))
            .collect();

        Ok(lines
            .iter()
            .map(|line| Reservation {
                cart_line_id: line.cart_line_id,
                sku_id: line.sku_id,
                new_quantity: remaining.get(&line.sku_id).copied().unwrap_or_default(),
                unit_price: line.unit_price,
                quantity: line.requested_quantity,
            })
            .collect())
    }
}
