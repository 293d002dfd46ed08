// gateway/src/database.rs
//! SQLite persistence for dispatched bridge transactions

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::bridge::{EvmTransaction, TxStatus};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create new database connection
    pub async fn new(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        Self::create_tables(&pool).await?;

        info!("Database initialized at {}", url);

        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS evm_transactions (
                nonce INTEGER PRIMARY KEY,
                target_chain_id INTEGER NOT NULL,
                selector INTEGER NOT NULL,
                params BLOB NOT NULL,
                gas_limit INTEGER NOT NULL,
                gas_price INTEGER NOT NULL,
                value TEXT NOT NULL,
                status TEXT NOT NULL,
                confirmations INTEGER NOT NULL DEFAULT 0,
                tx_hash TEXT,
                replaces_nonce INTEGER,
                attempt INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_evm_transactions_status
             ON evm_transactions(status)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // ============ Transaction Operations ============

    pub async fn store_transaction(&self, tx: &EvmTransaction) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO evm_transactions
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx.nonce as i64)
        .bind(tx.target_chain_id as i64)
        .bind(tx.selector as i64)
        .bind(&tx.params)
        .bind(tx.gas_limit as i64)
        .bind(tx.gas_price as i64)
        .bind(tx.value.to_string())
        .bind(tx.status.as_str())
        .bind(tx.confirmations as i64)
        .bind(&tx.tx_hash)
        .bind(tx.replaces_nonce.map(|n| n as i64))
        .bind(tx.attempt as i64)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_status(
        &self,
        nonce: u64,
        status: TxStatus,
        confirmations: u32,
        tx_hash: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE evm_transactions
             SET status = ?, confirmations = ?, tx_hash = COALESCE(?, tx_hash)
             WHERE nonce = ?",
        )
        .bind(status.as_str())
        .bind(confirmations as i64)
        .bind(tx_hash)
        .bind(nonce as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Nonces of transactions in the given state, oldest first
    pub async fn nonces_with_status(&self, status: TxStatus) -> Result<Vec<u64>> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "SELECT nonce FROM evm_transactions WHERE status = ? ORDER BY nonce",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(n,)| n as u64).collect())
    }

    pub async fn get_transaction(
        &self,
        nonce: u64,
    ) -> Result<Option<(u64, String, u32, Option<String>)>> {
        let row = sqlx::query_as::<_, (i64, String, i64, Option<String>)>(
            "SELECT target_chain_id, status, confirmations, tx_hash
             FROM evm_transactions WHERE nonce = ?",
        )
        .bind(nonce as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(chain, status, conf, hash)| (chain as u64, status, conf as u32, hash)))
    }
}
