//! Order header + line persistence for a successful reservation

use crate::error::{CheckoutError, CheckoutResult};
use crate::models::{NewOrder, NewOrderLine, OrderDetail, OrderStatus, ShippingInfo, UserId};
use crate::repositories::OrderRepository;
use crate::services::reservation::Reservation;
use rust_decimal::Decimal;
use tracing::debug;

/// Sum of `unit_price * quantity` over the reserved lines
pub fn order_total(reservations: &[Reservation]) -> Decimal {
    reservations.iter().map(Reservation::line_total).sum()
}

/// Writes a PENDING order and its lines in the caller's transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderWriter;

impl OrderWriter {
    pub fn new() -> Self {
        Self
    }

    /// Insert the order header and batch-insert one line per reservation.
    ///
    /// Each line's `price_at_order` is the unit price carried by its reservation,
    /// so later catalog price changes never reach the stored order.
    pub async fn write<R>(
        &self,
        orders: &R,
        tx: &mut R::Tx,
        user_id: UserId,
        shipping: &ShippingInfo,
        reservations: &[Reservation],
    ) -> CheckoutResult<OrderDetail>
    where
        R: OrderRepository + ?Sized,
    {
        if reservations.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let new_order = NewOrder {
            user_id,
            status: OrderStatus::Pending,
            total_price: order_total(reservations),
            shipping: shipping.clone(),
        };
        let order = orders.insert_order(tx, &new_order).await?;

        let new_lines: Vec<NewOrderLine> = reservations
            .iter()
            .map(|reservation| NewOrderLine {
                sku_id: reservation.sku_id,
                quantity: reservation.quantity,
                price_at_order: reservation.unit_price,
            })
            .collect();
        let lines = orders.insert_lines(tx, order.id, &new_lines).await?;

        debug!(order_id = order.id, lines = lines.len(), total = %order.total_price, "Order written");

        Ok(OrderDetail { order, lines })
    }
}
