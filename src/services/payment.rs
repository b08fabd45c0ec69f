//! Payment confirmation for PENDING orders.
//!
//! The gateway itself is opaque: anything implementing [`PaymentGateway`] can
//! be plugged in. The order row stays locked for the duration of the charge so
//! two confirmations of the same order cannot both reach the gateway.

use crate::error::{CheckoutError, CheckoutResult};
use crate::models::{Order, OrderId, OrderStatus};
use crate::repositories::OrderRepository;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Charge submitted to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
}

/// Result of a charge the gateway processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded { reference: String },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `Err` means the gateway could not be reached or failed internally
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, String>;
}

pub struct PaymentService<S: OrderRepository, G: PaymentGateway> {
    store: Arc<S>,
    gateway: Arc<G>,
    currency: String,
}

impl<S: OrderRepository, G: PaymentGateway> PaymentService<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>, currency: impl Into<String>) -> Self {
        Self {
            store,
            gateway,
            currency: currency.into(),
        }
    }

    /// Charge a PENDING order and mark it PAID.
    ///
    /// A declined or failed charge leaves the order PENDING and its stock
    /// reserved.
    ///
    /// The order row lock and its connection are held until the gateway
    /// answers. A slow gateway delays other confirmations of the same order,
    /// which then see it PAID and fail with `OrderNotPending`.
    #[instrument(skip(self, payment_method))]
    pub async fn confirm_payment(
        &self,
        order_id: OrderId,
        payment_method: &str,
    ) -> CheckoutResult<Order> {
        let mut tx = self.store.begin().await?;

        match self.charge_locked(&mut tx, order_id, payment_method).await {
            Ok(order) => {
                self.store.commit(tx).await?;
                info!(order_id, total = %order.total_price, "Payment confirmed");
                Ok(order)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    warn!(order_id, error = %rollback_err, "Payment rollback failed");
                }
                warn!(order_id, error = %err, "Payment not confirmed");
                Err(err)
            }
        }
    }

    async fn charge_locked(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        payment_method: &str,
    ) -> CheckoutResult<Order> {
        let order = self
            .store
            .lock_order(tx, order_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("Order {}", order_id)))?;

        let status = order.status().map_err(|_| CheckoutError::OrderNotPending {
            order_id,
            status: order.status.clone(),
        })?;
        if !status.can_transition_to(OrderStatus::Paid) {
            return Err(CheckoutError::OrderNotPending {
                order_id,
                status: order.status,
            });
        }

        let request = ChargeRequest {
            order_id,
            amount: order.total_price,
            currency: self.currency.clone(),
            payment_method: payment_method.to_string(),
        };

        match self.gateway.charge(&request).await {
            Ok(ChargeOutcome::Succeeded { reference }) => {
                info!(order_id, reference = %reference, "Charge succeeded");
                Ok(self
                    .store
                    .update_status(tx, order_id, OrderStatus::Paid)
                    .await?)
            }
            Ok(ChargeOutcome::Declined { reason }) => Err(CheckoutError::PaymentDeclined(reason)),
            Err(reason) => Err(CheckoutError::PaymentGateway(reason)),
        }
    }
}
