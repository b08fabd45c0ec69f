#![allow(dead_code)]

use async_trait::async_trait;
use checkout_backend::error::{StoreError, StoreResult};
use checkout_backend::models::*;
use checkout_backend::repositories::*;
use checkout_backend::services::CheckoutService;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

pub fn shipping() -> ShippingInfo {
    ShippingInfo {
        shipping_address: "2-1-1 Nihonbashi, Chuo-ku".to_string(),
        postal_code: "103-0027".to_string(),
        shipping_name: "Haruto Kobayashi".to_string(),
    }
}

/// In-memory shop with a checkout service wired to it
pub struct TestShop {
    pub store: Arc<MemoryStore>,
    pub checkout: Arc<CheckoutService<MemoryStore>>,
}

impl TestShop {
    pub fn new() -> Self {
        Self::from_store(MemoryStore::new())
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self::from_store(MemoryStore::with_lock_timeout(lock_timeout))
    }

    fn from_store(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            checkout: Arc::new(CheckoutService::new(store.clone())),
            store,
        }
    }

    /// One product with a single SKU at `price`, holding `stock` units
    pub async fn sku(&self, price: Decimal, stock: i32) -> SkuId {
        let product = self.store.add_product(price).await;
        let sku = self.store.add_sku(product, Decimal::ZERO).await;
        self.store.set_stock(sku, stock).await;
        sku
    }

    /// Cart for `user_id` with the given `(sku, quantity)` lines, in order
    pub async fn cart(&self, user_id: UserId, lines: &[(SkuId, i32)]) -> CartId {
        let cart = self.store.create_cart(user_id).await;
        for &(sku, quantity) in lines {
            self.store.add_cart_line(cart, sku, quantity).await;
        }
        cart
    }

    pub async fn stock_of(&self, sku: SkuId) -> i32 {
        self.store
            .stock(sku)
            .await
            .map(|row| row.quantity)
            .expect("stock row should exist")
    }
}

/// Checkout step at which [`FailingStore`] reports a storage error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    InsertLines,
    ClearCart,
}

/// MemoryStore that fails one write after earlier writes are already staged
pub struct FailingStore {
    pub inner: Arc<MemoryStore>,
    fail_at: FailAt,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryStore>, fail_at: FailAt) -> Self {
        Self { inner, fail_at }
    }

    fn injected(&self, step: FailAt) -> StoreResult<()> {
        if self.fail_at == step {
            return Err(StoreError::ConstraintViolation(format!(
                "injected failure at {:?}",
                step
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for FailingStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        self.inner.begin().await
    }

    async fn commit(&self, tx: MemoryTx) -> StoreResult<()> {
        self.inner.commit(tx).await
    }

    async fn rollback(&self, tx: MemoryTx) -> StoreResult<()> {
        self.inner.rollback(tx).await
    }
}

#[async_trait]
impl StockLedger for FailingStore {
    async fn lock_for_update(
        &self,
        tx: &mut MemoryTx,
        sku_ids: &BTreeSet<SkuId>,
    ) -> StoreResult<HashMap<SkuId, SkuStock>> {
        self.inner.lock_for_update(tx, sku_ids).await
    }

    async fn apply_decrements(&self, tx: &mut MemoryTx, updates: &[StockUpdate]) -> StoreResult<()> {
        self.inner.apply_decrements(tx, updates).await
    }
}

#[async_trait]
impl CartRepository for FailingStore {
    async fn find_cart_id(&self, tx: &mut MemoryTx, user_id: UserId) -> StoreResult<Option<CartId>> {
        self.inner.find_cart_id(tx, user_id).await
    }

    async fn read_detailed(
        &self,
        tx: &mut MemoryTx,
        cart_id: CartId,
    ) -> StoreResult<Vec<CartLineSnapshot>> {
        self.inner.read_detailed(tx, cart_id).await
    }

    async fn clear(
        &self,
        tx: &mut MemoryTx,
        cart_id: CartId,
        line_ids: &[CartLineId],
    ) -> StoreResult<u64> {
        self.injected(FailAt::ClearCart)?;
        self.inner.clear(tx, cart_id, line_ids).await
    }
}

#[async_trait]
impl OrderRepository for FailingStore {
    async fn insert_order(&self, tx: &mut MemoryTx, order: &NewOrder) -> StoreResult<Order> {
        self.inner.insert_order(tx, order).await
    }

    async fn insert_lines(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
        lines: &[NewOrderLine],
    ) -> StoreResult<Vec<OrderLine>> {
        self.injected(FailAt::InsertLines)?;
        self.inner.insert_lines(tx, order_id, lines).await
    }

    async fn lock_order(&self, tx: &mut MemoryTx, order_id: OrderId) -> StoreResult<Option<Order>> {
        self.inner.lock_order(tx, order_id).await
    }

    async fn update_status(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
        status: OrderStatus,
    ) -> StoreResult<Order> {
        self.inner.update_status(tx, order_id, status).await
    }

    async fn find_order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        self.inner.find_order(order_id).await
    }

    async fn find_orders_by_user(&self, user_id: UserId) -> StoreResult<Vec<OrderSummary>> {
        self.inner.find_orders_by_user(user_id).await
    }

    async fn find_lines(&self, order_id: OrderId) -> StoreResult<Vec<OrderLine>> {
        self.inner.find_lines(order_id).await
    }
}

/// Postgres-backed store for `#[sqlx::test]` tests
pub struct TestDatabase {
    pub pool: PgPool,
    pub store: Arc<PgStore>,
}

impl TestDatabase {
    /// Create TestDatabase from an existing pool (migrations already applied by sqlx::test)
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            store: Arc::new(PgStore::new(pool.clone(), Duration::from_millis(500))),
            pool,
        }
    }

    pub async fn insert_sku(&self, price: Decimal, stock: i32) -> SkuId {
        let product_id: ProductId =
            sqlx::query_scalar("INSERT INTO products (name, price) VALUES ($1, $2) RETURNING id")
                .bind("Test product")
                .bind(price)
                .fetch_one(&self.pool)
                .await
                .expect("Failed to insert product");

        let sku_id: SkuId = sqlx::query_scalar(
            "INSERT INTO skus (product_id, size, color) VALUES ($1, 'M', 'navy') RETURNING id",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert sku");

        sqlx::query("INSERT INTO sku_stocks (sku_id, quantity) VALUES ($1, $2)")
            .bind(sku_id)
            .bind(stock)
            .execute(&self.pool)
            .await
            .expect("Failed to insert stock");

        sku_id
    }

    pub async fn insert_cart(&self, user_id: UserId, lines: &[(SkuId, i32)]) -> CartId {
        let cart_id: CartId =
            sqlx::query_scalar("INSERT INTO carts (user_id) VALUES ($1) RETURNING id")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .expect("Failed to insert cart");

        for &(sku_id, quantity) in lines {
            sqlx::query("INSERT INTO cart_lines (cart_id, sku_id, quantity) VALUES ($1, $2, $3)")
                .bind(cart_id)
                .bind(sku_id)
                .bind(quantity)
                .execute(&self.pool)
                .await
                .expect("Failed to insert cart line");
        }

        cart_id
    }

    pub async fn insert_cart_line(&self, cart_id: CartId, sku_id: SkuId, quantity: i32) {
        sqlx::query("INSERT INTO cart_lines (cart_id, sku_id, quantity) VALUES ($1, $2, $3)")
            .bind(cart_id)
            .bind(sku_id)
            .bind(quantity)
            .execute(&self.pool)
            .await
            .expect("Failed to insert cart line");
    }

    pub async fn stock_of(&self, sku_id: SkuId) -> i32 {
        sqlx::query_scalar("SELECT quantity FROM sku_stocks WHERE sku_id = $1")
            .bind(sku_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read stock")
    }

    pub async fn cart_line_count(&self, cart_id: CartId) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM cart_lines WHERE cart_id = $1")
            .bind(cart_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count cart lines")
    }

    pub async fn order_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count orders")
    }
}
