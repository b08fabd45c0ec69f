//! Checkout orchestration: one transaction from cart snapshot to committed order

use crate::error::{CheckoutError, CheckoutResult};
use crate::models::{CartId, CartLineId, OrderDetail, ShippingInfo, UserId};
use crate::repositories::CheckoutStore;
use crate::services::order_writer::OrderWriter;
use crate::services::reservation::ReservationEngine;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Furthest step a checkout attempt reached, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Start,
    SnapshotRead,
    Reserving,
    OrderWriting,
    CartClearing,
    Committed,
    Aborted,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::Start => "start",
            CheckoutStage::SnapshotRead => "snapshot_read",
            CheckoutStage::Reserving => "reserving",
            CheckoutStage::OrderWriting => "order_writing",
            CheckoutStage::CartClearing => "cart_clearing",
            CheckoutStage::Committed => "committed",
            CheckoutStage::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Places orders from carts
pub struct CheckoutService<S: CheckoutStore> {
    store: Arc<S>,
    engine: ReservationEngine,
    writer: OrderWriter,
}

impl<S: CheckoutStore> CheckoutService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            engine: ReservationEngine::new(),
            writer: OrderWriter::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Turn the user's cart into a PENDING order.
    ///
    /// Snapshot, stock reservation, order write and cart clear all run in one
    /// transaction. Either every effect commits or none does. Errors are
    /// returned as-is after rollback; nothing is retried here.
    #[instrument(
        name = "place_order",
        skip(self, shipping),
        fields(attempt_id = %Uuid::new_v4())
    )]
    pub async fn place_order(
        &self,
        user_id: UserId,
        shipping: &ShippingInfo,
    ) -> CheckoutResult<OrderDetail> {
        let mut stage = CheckoutStage::Start;
        let mut tx = self.store.begin().await?;

        match self.run(&mut tx, user_id, shipping, &mut stage).await {
            Ok(placed) => {
                self.store.commit(tx).await.map_err(|e| {
                    warn!(stage = %stage, error = %e, "Checkout commit failed");
                    CheckoutError::from(e)
                })?;
                stage = CheckoutStage::Committed;

                info!(
                    stage = %stage,
                    order_id = placed.order.id,
                    total = %placed.order.total_price,
                    lines = placed.lines.len(),
                    "Order placed"
                );
                Ok(placed)
            }
            Err(err) => {
                let reached = stage;
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    error!(error = %rollback_err, "Checkout rollback failed");
                }
                stage = CheckoutStage::Aborted;

                warn!(
                    stage = %stage,
                    reached = %reached,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Checkout aborted"
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        shipping: &ShippingInfo,
        stage: &mut CheckoutStage,
    ) -> CheckoutResult<OrderDetail> {
        let cart_id: CartId = self
            .store
            .find_cart_id(tx, user_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("Cart for user {}", user_id)))?;

        let lines = self.store.read_detailed(tx, cart_id).await?;
        *stage = CheckoutStage::SnapshotRead;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        *stage = CheckoutStage::Reserving;
        let reservations = self.engine.reserve(&*self.store, tx, &lines).await?;

        *stage = CheckoutStage::OrderWriting;
        let placed = self
            .writer
            .write(&*self.store, tx, user_id, shipping, &reservations)
            .await?;

        *stage = CheckoutStage::CartClearing;
        let line_ids: Vec<CartLineId> = lines.iter().map(|line| line.cart_line_id).collect();
        self.store.clear(tx, cart_id, &line_ids).await?;

        Ok(placed)
    }
}
