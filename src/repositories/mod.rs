//! Storage seams for the checkout path.
//!
//! Every write happens inside a transaction handle obtained from
//! [`UnitOfWork::begin`]; components receive `&mut Self::Tx` and never open
//! transactions of their own. `PgStore` is the production backend and
//! `MemoryStore` an in-process equivalent with the same locking contract.

pub mod cart_repository;
pub mod memory;
pub mod order_repository;
pub mod pg_store;
pub mod stock_repository;

pub use memory::{MemoryStore, MemoryTx};
pub use pg_store::PgStore;

use crate::error::StoreResult;
use crate::models::{
    CartId, CartLineId, CartLineSnapshot, NewOrder, NewOrderLine, Order, OrderId, OrderLine, OrderStatus,
    OrderSummary, SkuId, SkuStock, StockUpdate, UserId,
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Transaction boundary shared by every repository of a store
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Tx: Send;

    /// Open a transaction with the store's bounded lock wait applied
    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;
}

/// Durable per-SKU quantity counters
#[async_trait]
pub trait StockLedger: UnitOfWork {
    /// Take exclusive row locks on exactly `sku_ids`, in ascending id order,
    /// held until `tx` ends. SKUs without a stock row are absent from the result.
    ///
    /// Fails with `StoreError::LockTimeout` when the locks are not granted
    /// within the configured wait.
    async fn lock_for_update(
        &self,
        tx: &mut Self::Tx,
        sku_ids: &BTreeSet<SkuId>,
    ) -> StoreResult<HashMap<SkuId, SkuStock>>;

    /// Write all new quantities in one batched statement and stamp `updated_at`.
    ///
    /// Callers must hold the row lock for every SKU in `updates`.
    async fn apply_decrements(&self, tx: &mut Self::Tx, updates: &[StockUpdate])
        -> StoreResult<()>;
}

/// Cart access needed by checkout
#[async_trait]
pub trait CartRepository: UnitOfWork {
    /// The cart owned by `user_id`, if any
    async fn find_cart_id(&self, tx: &mut Self::Tx, user_id: UserId) -> StoreResult<Option<CartId>>;

    /// Priced snapshot of every line in the cart, ordered by cart line id.
    /// Stock is read without locking. An empty cart yields an empty list.
    async fn read_detailed(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
    ) -> StoreResult<Vec<CartLineSnapshot>>;

    /// Delete the given lines of the cart, returning how many were removed.
    ///
    /// Callers pass the line ids of the snapshot they checked out, so a line
    /// added after that snapshot stays in the cart.
    async fn clear(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
        line_ids: &[CartLineId],
    ) -> StoreResult<u64>;
}

/// Order headers and lines
#[async_trait]
pub trait OrderRepository: UnitOfWork {
    async fn insert_order(&self, tx: &mut Self::Tx, order: &NewOrder) -> StoreResult<Order>;

    /// Insert all lines of an order in one batched statement
    async fn insert_lines(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        lines: &[NewOrderLine],
    ) -> StoreResult<Vec<OrderLine>>;

    /// Read an order and hold its row lock until `tx` ends
    async fn lock_order(&self, tx: &mut Self::Tx, order_id: OrderId) -> StoreResult<Option<Order>>;

    async fn update_status(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        status: OrderStatus,
    ) -> StoreResult<Order>;

    async fn find_order(&self, order_id: OrderId) -> StoreResult<Option<Order>>;

    /// Order history for a user, newest first
    async fn find_orders_by_user(&self, user_id: UserId) -> StoreResult<Vec<OrderSummary>>;

    async fn find_lines(&self, order_id: OrderId) -> StoreResult<Vec<OrderLine>>;
}

/// Everything a checkout needs from one store
pub trait CheckoutStore: StockLedger + CartRepository + OrderRepository {}

impl<T> CheckoutStore for T where T: StockLedger + CartRepository + OrderRepository {}
