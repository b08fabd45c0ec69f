use crate::error::{CheckoutError, CheckoutResult};
use crate::models::{OrderDetail, OrderId, OrderSummary, UserId};
use crate::repositories::OrderRepository;
use std::sync::Arc;
use tracing::instrument;

/// Read side of orders: history and detail for the owning user
pub struct OrderService<S: OrderRepository> {
    store: Arc<S>,
}

impl<S: OrderRepository> OrderService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// All orders of `user_id`, newest first
    #[instrument(skip(self))]
    pub async fn order_summaries(&self, user_id: UserId) -> CheckoutResult<Vec<OrderSummary>> {
        Ok(self.store.find_orders_by_user(user_id).await?)
    }

    /// Order header and lines, only for the user who placed it
    #[instrument(skip(self))]
    pub async fn order_detail(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> CheckoutResult<OrderDetail> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("Order {}", order_id)))?;

        if order.user_id != user_id {
            return Err(CheckoutError::Forbidden(order_id));
        }

        let lines = self.store.find_lines(order_id).await?;
        Ok(OrderDetail { order, lines })
    }
}
