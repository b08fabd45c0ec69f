//! Postgres-backed store

use super::UnitOfWork;
use crate::config::DatabaseConfig;
use crate::error::StoreResult;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

/// Postgres implementation of every checkout repository.
///
/// Repository impls live next to their SQL in `stock_repository`,
/// `cart_repository` and `order_repository`.
#[derive(Clone)]
pub struct PgStore {
    pub(crate) pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn from_config(pool: PgPool, config: &DatabaseConfig) -> Self {
        Self::new(pool, config.lock_timeout())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UnitOfWork for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; the value is a plain integer.
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;

        debug!(lock_timeout_ms = self.lock_timeout.as_millis() as u64, "Transaction started");
        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.rollback().await?;
        Ok(())
    }
}
