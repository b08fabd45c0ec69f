//! Stock ledger over the `sku_stocks` table

use super::{PgStore, StockLedger, UnitOfWork};
use crate::error::{StoreError, StoreResult};
use crate::models::{SkuId, SkuStock, StockUpdate};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[async_trait]
impl StockLedger for PgStore {
    async fn lock_for_update(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        sku_ids: &BTreeSet<SkuId>,
    ) -> StoreResult<HashMap<SkuId, SkuStock>> {
        if sku_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<SkuId> = sku_ids.iter().copied().collect();

        // ORDER BY makes Postgres take the row locks in ascending sku_id order.
        let rows = sqlx::query_as::<_, SkuStock>(
            r#"
            SELECT sku_id, quantity, updated_at
            FROM sku_stocks
            WHERE sku_id = ANY($1)
            ORDER BY sku_id
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;

        debug!(requested = sku_ids.len(), locked = rows.len(), "Stock rows locked");

        Ok(rows.into_iter().map(|row| (row.sku_id, row)).collect())
    }

    async fn apply_decrements(
        &self,
        tx: &mut <Self as UnitOfWork>::Tx,
        updates: &[StockUpdate],
    ) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let sku_ids: Vec<SkuId> = updates.iter().map(|u| u.sku_id).collect();
        let quantities: Vec<i32> = updates.iter().map(|u| u.new_quantity).collect();

        let result = sqlx::query(
            r#"
            UPDATE sku_stocks AS s
            SET quantity = u.quantity, updated_at = NOW()
            FROM UNNEST($1::BIGINT[], $2::INTEGER[]) AS u(sku_id, quantity)
            WHERE s.sku_id = u.sku_id
            "#,
        )
        .bind(sku_ids)
        .bind(quantities)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() != updates.len() as u64 {
            return Err(StoreError::NotFound(format!(
                "Stock rows updated: {} of {}",
                result.rows_affected(),
                updates.len()
            )));
        }

        debug!(rows = updates.len(), "Stock decrements applied");
        Ok(())
    }
}
