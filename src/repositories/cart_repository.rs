//! Cart reads and clearing over `carts` / `cart_lines`

use super::{CartRepository, PgStore, UnitOfWork};
use crate::error::StoreResult;
use crate::models::{CartId, CartLineId, CartLineSnapshot, UserId};
use async_trait::async_trait;

#[async_trait]
impl CartRepository for PgStore {
    async fn find_cart_id(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        user_id: UserId,
    ) -> StoreResult<Option<CartId>> {
        let cart_id = sqlx::query_scalar::<_, CartId>("SELECT id FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(cart_id)
    }

    async fn read_detailed(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        cart_id: CartId,
    ) -> StoreResult<Vec<CartLineSnapshot>> {
        // LEFT JOIN: a SKU that lost its stock row still shows up (with 0
        // available) so the reservation reports it instead of silently dropping it.
        let lines = sqlx::query_as::<_, CartLineSnapshot>(
            r#"
            SELECT
                cl.id AS cart_line_id,
                s.id AS sku_id,
                (p.price + s.extra_price) AS unit_price,
                cl.quantity AS requested_quantity,
                COALESCE(st.quantity, 0) AS available_stock
            FROM cart_lines cl
            JOIN skus s ON cl.sku_id = s.id
            JOIN products p ON s.product_id = p.id
            LEFT JOIN sku_stocks st ON st.sku_id = s.id
            WHERE cl.cart_id = $1
            ORDER BY cl.id
            "#,
        )
        .bind(cart_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(lines)
    }

    async fn clear(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        cart_id: CartId,
        line_ids: &[CartLineId],
    ) -> StoreResult<u64> {
        if line_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND id = ANY($2)")
            .bind(cart_id)
            .bind(line_ids.to_vec())
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }
}
