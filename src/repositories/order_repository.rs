//! Order persistence over `orders` / `order_lines`

use super::{OrderRepository, PgStore, UnitOfWork};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    NewOrder, NewOrderLine, Order, OrderId, OrderLine, OrderStatus, OrderSummary, UserId,
};
use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

const ORDER_COLUMNS: &str =
    "id, user_id, status, total_price, shipping_address, postal_code, shipping_name, ordered_at";

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        order: &NewOrder,
    ) -> StoreResult<Order> {
        let sql = format!(
            r#"
            INSERT INTO orders (user_id, status, total_price, shipping_address, postal_code, shipping_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let created = sqlx::query_as::<_, Order>(&sql)
            .bind(order.user_id)
            .bind(order.status.as_str())
            .bind(order.total_price)
            .bind(order.shipping.shipping_address.as_str())
            .bind(order.shipping.postal_code.as_str())
            .bind(order.shipping.shipping_name.as_str())
            .fetch_one(&mut **tx)
            .await?;

        Ok(created)
    }

    async fn insert_lines(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        order_id: OrderId,
        lines: &[NewOrderLine],
    ) -> StoreResult<Vec<OrderLine>> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO order_lines (order_id, sku_id, quantity, price_at_order) ");
        builder.push_values(lines, |mut row, line| {
            row.push_bind(order_id)
                .push_bind(line.sku_id)
                .push_bind(line.quantity)
                .push_bind(line.price_at_order);
        });
        builder.push(" RETURNING id, order_id, sku_id, quantity, price_at_order");

        let inserted = builder
            .build_query_as::<OrderLine>()
            .fetch_all(&mut **tx)
            .await?;

        Ok(inserted)
    }

    async fn lock_order(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        order_id: OrderId,
    ) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);

        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(order)
    }

    async fn update_status(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        order_id: OrderId,
        status: OrderStatus,
    ) -> StoreResult<Order> {
        let sql = format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        );

        sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .bind(status.as_str())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn find_order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);

        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn find_orders_by_user(&self, user_id: UserId) -> StoreResult<Vec<OrderSummary>> {
        let summaries = sqlx::query_as::<_, OrderSummary>(
            r#"
            SELECT id, ordered_at, total_price, status
            FROM orders
            WHERE user_id = $1
            ORDER BY ordered_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(summaries)
    }

    async fn find_lines(&self, order_id: OrderId) -> StoreResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT id, order_id, sku_id, quantity, price_at_order
            FROM order_lines
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }
}
