//! In-process transactional store.
//!
//! Committed state sits behind one `RwLock`. Row locks are per-key async
//! mutexes held by the transaction until commit or rollback, acquired with the
//! same bounded wait the Postgres store applies through `lock_timeout`.
//! Writes are staged on the transaction and applied in one step at commit,
//! so a rolled-back transaction leaves nothing behind.

use super::{CartRepository, OrderRepository, StockLedger, UnitOfWork};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    CartId, CartLine, CartLineId, CartLineSnapshot, NewOrder, NewOrderLine, Order, OrderId,
    OrderLine, OrderLineId, OrderStatus, OrderSummary, ProductId, SkuId, SkuStock, StockUpdate,
    UserId,
};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Stock(SkuId),
    Order(OrderId),
}

#[derive(Debug, Clone)]
struct ProductRow {
    price: Decimal,
}

#[derive(Debug, Clone)]
struct SkuRow {
    product_id: ProductId,
    extra_price: Decimal,
}

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, ProductRow>,
    skus: HashMap<SkuId, SkuRow>,
    stocks: HashMap<SkuId, SkuStock>,
    carts: HashMap<CartId, UserId>,
    cart_lines: BTreeMap<CartLineId, CartLine>,
    orders: BTreeMap<OrderId, Order>,
    order_lines: BTreeMap<OrderLineId, OrderLine>,
}

#[derive(Debug)]
enum StagedWrite {
    Stock(StockUpdate, NaiveDateTime),
    Order(Order),
    Lines(Vec<OrderLine>),
    ClearLines(CartId, Vec<CartLineId>),
    Status(OrderId, OrderStatus),
}

/// Open transaction against a [`MemoryStore`]
#[derive(Debug, Default)]
pub struct MemoryTx {
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Vec<StagedWrite>,
}

impl MemoryTx {
    fn staged_order(&self, order_id: OrderId) -> Option<&Order> {
        self.staged.iter().rev().find_map(|write| match write {
            StagedWrite::Order(order) if order.id == order_id => Some(order),
            _ => None,
        })
    }
}

/// In-memory store implementing every checkout repository
pub struct MemoryStore {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<Mutex<()>>>>,
    next_id: AtomicI64,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            row_locks: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            lock_timeout,
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    async fn acquire(&self, tx: &mut MemoryTx, key: RowKey) -> StoreResult<()> {
        if tx.held.contains_key(&key) {
            return Ok(());
        }

        let lock = {
            let mut locks = self.row_locks.lock().await;
            locks.entry(key).or_default().clone()
        };

        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;

        tx.held.insert(key, guard);
        Ok(())
    }

    /// Drop the guards, then forget lock entries no transaction holds or waits on.
    /// Waiters clone the entry under the map lock, so a count of one means idle.
    async fn release(&self, held: HashMap<RowKey, OwnedMutexGuard<()>>) {
        if held.is_empty() {
            return;
        }
        drop(held);
        self.row_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    // ------------------------------------------------------------------
    // Seeding and inspection. These bypass row locks and are meant for
    // fixtures, not for concurrent use with open transactions.
    // ------------------------------------------------------------------

    pub async fn add_product(&self, price: Decimal) -> ProductId {
        let id = self.next_id();
        self.tables.write().await.products.insert(id, ProductRow { price });
        id
    }

    /// Change a product's catalog price
    pub async fn set_product_price(&self, product_id: ProductId, price: Decimal) {
        if let Some(product) = self.tables.write().await.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    pub async fn add_sku(&self, product_id: ProductId, extra_price: Decimal) -> SkuId {
        let id = self.next_id();
        self.tables.write().await.skus.insert(
            id,
            SkuRow {
                product_id,
                extra_price,
            },
        );
        id
    }

    /// Create or overwrite the stock row of a SKU
    pub async fn set_stock(&self, sku_id: SkuId, quantity: i32) {
        self.tables.write().await.stocks.insert(
            sku_id,
            SkuStock {
                sku_id,
                quantity,
                updated_at: Self::now(),
            },
        );
    }

    pub async fn remove_stock(&self, sku_id: SkuId) {
        self.tables.write().await.stocks.remove(&sku_id);
    }

    pub async fn stock(&self, sku_id: SkuId) -> Option<SkuStock> {
        self.tables.read().await.stocks.get(&sku_id).cloned()
    }

    pub async fn create_cart(&self, user_id: UserId) -> CartId {
        let id = self.next_id();
        self.tables.write().await.carts.insert(id, user_id);
        id
    }

    pub async fn add_cart_line(&self, cart_id: CartId, sku_id: SkuId, quantity: i32) -> CartLineId {
        let id = self.next_id();
        self.tables.write().await.cart_lines.insert(
            id,
            CartLine {
                id,
                cart_id,
                sku_id,
                quantity,
            },
        );
        id
    }

    pub async fn cart_lines(&self, cart_id: CartId) -> Vec<CartLine> {
        self.tables
            .read()
            .await
            .cart_lines
            .values()
            .filter(|line| line.cart_id == cart_id)
            .cloned()
            .collect()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn order_line_count(&self) -> usize {
        self.tables.read().await.order_lines.len()
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> StoreResult<()> {
        let MemoryTx { held, staged } = tx;
        let mut tables = self.tables.write().await;

        for write in staged {
            match write {
                StagedWrite::Stock(update, updated_at) => {
                    let row = tables
                        .stocks
                        .entry(update.sku_id)
                        .or_insert_with(|| SkuStock {
                            sku_id: update.sku_id,
                            quantity: 0,
                            updated_at,
                        });
                    row.quantity = update.new_quantity;
                    row.updated_at = updated_at;
                }
                StagedWrite::Order(order) => {
                    tables.orders.insert(order.id, order);
                }
                StagedWrite::Lines(lines) => {
                    for line in lines {
                        tables.order_lines.insert(line.id, line);
                    }
                }
                StagedWrite::ClearLines(cart_id, line_ids) => {
                    tables
                        .cart_lines
                        .retain(|id, line| line.cart_id != cart_id || !line_ids.contains(id));
                }
                StagedWrite::Status(order_id, status) => {
                    if let Some(order) = tables.orders.get_mut(&order_id) {
                        order.status = status.as_str().to_string();
                    }
                }
            }
        }

        // Row locks are released only once the new state is visible.
        drop(tables);
        debug!(released = held.len(), "Memory transaction committed");
        self.release(held).await;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> StoreResult<()> {
        debug!(
            released = tx.held.len(),
            discarded = tx.staged.len(),
            "Memory transaction rolled back"
        );
        let MemoryTx { held, .. } = tx;
        self.release(held).await;
        Ok(())
    }
}

#[async_trait]
impl StockLedger for MemoryStore {
    async fn lock_for_update(
        &self,
        tx: &mut MemoryTx,
        sku_ids: &BTreeSet<SkuId>,
    ) -> StoreResult<HashMap<SkuId, SkuStock>> {
        for sku_id in sku_ids {
            self.acquire(tx, RowKey::Stock(*sku_id)).await?;
        }

        let tables = self.tables.read().await;
        Ok(sku_ids
            .iter()
            .filter_map(|sku_id| tables.stocks.get(sku_id).cloned())
            .map(|row| (row.sku_id, row))
            .collect())
    }

    async fn apply_decrements(&self, tx: &mut MemoryTx, updates: &[StockUpdate]) -> StoreResult<()> {
        let tables = self.tables.read().await;
        if let Some(missing) = updates.iter().find(|u| !tables.stocks.contains_key(&u.sku_id)) {
            return Err(StoreError::NotFound(format!(
                "Stock row for SKU {} not found",
                missing.sku_id
            )));
        }
        drop(tables);

        let now = Self::now();
        tx.staged
            .extend(updates.iter().map(|update| StagedWrite::Stock(*update, now)));
        Ok(())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn find_cart_id(&self, _tx: &mut MemoryTx, user_id: UserId) -> StoreResult<Option<CartId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .carts
            .iter()
            .find(|(_, owner)| **owner == user_id)
            .map(|(cart_id, _)| *cart_id))
    }

    async fn read_detailed(
        &self,
        _tx: &mut MemoryTx,
        cart_id: CartId,
    ) -> StoreResult<Vec<CartLineSnapshot>> {
        let tables = self.tables.read().await;

        let snapshots = tables
            .cart_lines
            .values()
            .filter(|line| line.cart_id == cart_id)
            .filter_map(|line| {
                let sku = tables.skus.get(&line.sku_id)?;
                let product = tables.products.get(&sku.product_id)?;
                Some(CartLineSnapshot {
                    cart_line_id: line.id,
                    sku_id: line.sku_id,
                    unit_price: product.price + sku.extra_price,
                    requested_quantity: line.quantity,
                    available_stock: tables
                        .stocks
                        .get(&line.sku_id)
                        .map(|stock| stock.quantity)
                        .unwrap_or(0),
                })
            })
            .collect();

        Ok(snapshots)
    }

    async fn clear(
        &self,
        tx: &mut MemoryTx,
        cart_id: CartId,
        line_ids: &[CartLineId],
    ) -> StoreResult<u64> {
        let removed = self
            .tables
            .read()
            .await
            .cart_lines
            .values()
            .filter(|line| line.cart_id == cart_id && line_ids.contains(&line.id))
            .count();

        tx.staged
            .push(StagedWrite::ClearLines(cart_id, line_ids.to_vec()));
        Ok(removed as u64)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, tx: &mut MemoryTx, order: &NewOrder) -> StoreResult<Order> {
        let created = Order {
            id: self.next_id(),
            user_id: order.user_id,
            status: order.status.as_str().to_string(),
            total_price: order.total_price,
            shipping_address: order.shipping.shipping_address.clone(),
            postal_code: order.shipping.postal_code.clone(),
            shipping_name: order.shipping.shipping_name.clone(),
            ordered_at: Self::now(),
        };

        tx.staged.push(StagedWrite::Order(created.clone()));
        Ok(created)
    }

    async fn insert_lines(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
        lines: &[NewOrderLine],
    ) -> StoreResult<Vec<OrderLine>> {
        let inserted: Vec<OrderLine> = lines
            .iter()
            .map(|line| OrderLine {
                id: self.next_id(),
                order_id,
                sku_id: line.sku_id,
                quantity: line.quantity,
                price_at_order: line.price_at_order,
            })
            .collect();

        tx.staged.push(StagedWrite::Lines(inserted.clone()));
        Ok(inserted)
    }

    async fn lock_order(&self, tx: &mut MemoryTx, order_id: OrderId) -> StoreResult<Option<Order>> {
        self.acquire(tx, RowKey::Order(order_id)).await?;
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn update_status(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
        status: OrderStatus,
    ) -> StoreResult<Order> {
        let current = match tx.staged_order(order_id) {
            Some(order) => Some(order.clone()),
            None => self.tables.read().await.orders.get(&order_id).cloned(),
        };

        let mut order =
            current.ok_or_else(|| StoreError::NotFound(format!("Order {} not found", order_id)))?;
        order.status = status.as_str().to_string();

        tx.staged.push(StagedWrite::Status(order_id, status));
        Ok(order)
    }

    async fn find_order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn find_orders_by_user(&self, user_id: UserId) -> StoreResult<Vec<OrderSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<OrderSummary> = tables
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .map(OrderSummary::from)
            .collect();

        summaries.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn find_lines(&self, order_id: OrderId) -> StoreResult<Vec<OrderLine>> {
        Ok(self
            .tables
            .read()
            .await
            .order_lines
            .values()
            .filter(|line| line.order_id == order_id)
            .cloned()
            .collect())
    }
}
