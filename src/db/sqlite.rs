//! SQLite-backed `Database` implementation, behind the optional `sqlite`
//! feature (`Cargo.toml`: `sqlite = ["dep:sqlx"]`).
//! Monetary columns are stored as `TEXT` and parsed through
//! [`crate::decimal`], since `BigDecimal` has no native SQLite mapping and
//! floating point must never enter monetary arithmetic.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::chain::ChainId;
use crate::decimal::parse_decimal;
use crate::epoch::Epoch;

use super::models::{Distribution, GasRefundTransaction, Participation, TransactionStatus};
use super::traits::{Database, RowUpdate};

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gas_refund_transaction (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chain_id INTEGER NOT NULL,
                epoch INTEGER NOT NULL,
                hash TEXT NOT NULL,
                address TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                block_number INTEGER NOT NULL,
                gas_used INTEGER NOT NULL,
                gas_used_chain_currency TEXT NOT NULL,
                psp_chain_currency TEXT NOT NULL,
                psp_usd TEXT NOT NULL,
                chain_currency_usd TEXT NOT NULL,
                total_stake_amount_psp TEXT NOT NULL,
                refunded_amount_psp TEXT NOT NULL,
                refunded_amount_usd TEXT NOT NULL,
                status TEXT NOT NULL,
                UNIQUE(chain_id, hash)
            );
            CREATE INDEX IF NOT EXISTS idx_grt_epoch_ts_hash
                ON gas_refund_transaction(epoch, timestamp, hash);
            CREATE INDEX IF NOT EXISTS idx_grt_status ON gas_refund_transaction(status);

            CREATE TABLE IF NOT EXISTS gas_refund_participation (
                chain_id INTEGER NOT NULL,
                epoch INTEGER NOT NULL,
                address TEXT NOT NULL,
                refunded_amount_psp TEXT NOT NULL,
                merkle_proofs TEXT NOT NULL,
                is_completed INTEGER NOT NULL,
                UNIQUE(epoch, address, chain_id)
            );

            CREATE TABLE IF NOT EXISTS gas_refund_distribution (
                chain_id INTEGER NOT NULL,
                epoch INTEGER NOT NULL,
                merkle_root TEXT NOT NULL,
                total_psp_amount_to_refund TEXT NOT NULL,
                is_completed INTEGER NOT NULL,
                UNIQUE(chain_id, epoch)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<GasRefundTransaction> {
        let status_str: String = row.try_get("status")?;
        let status = match status_str.as_str() {
            "IDLE" => TransactionStatus::Idle,
            "VALIDATED" => TransactionStatus::Validated,
            "REJECTED" => TransactionStatus::Rejected,
            other => anyhow::bail!("unknown status {other}"),
        };
        let chain_id: i64 = row.try_get("chain_id")?;
        Ok(GasRefundTransaction {
            id: row.try_get("id")?,
            chain_id: ChainId::try_from(chain_id as u64)?,
            epoch: Epoch::new(row.try_get::<i64, _>("epoch")? as u32),
            hash: row.try_get("hash")?,
            address: row.try_get("address")?,
            timestamp: row.try_get("timestamp")?,
            block_number: row.try_get::<i64, _>("block_number")? as u64,
            gas_used: row.try_get::<i64, _>("gas_used")? as u64,
            gas_used_chain_currency: parse_decimal(&row.try_get::<String, _>("gas_used_chain_currency")?)?,
            psp_chain_currency: parse_decimal(&row.try_get::<String, _>("psp_chain_currency")?)?,
            psp_usd: parse_decimal(&row.try_get::<String, _>("psp_usd")?)?,
            chain_currency_usd: parse_decimal(&row.try_get::<String, _>("chain_currency_usd")?)?,
            total_stake_amount_psp: parse_decimal(&row.try_get::<String, _>("total_stake_amount_psp")?)?,
            refunded_amount_psp: parse_decimal(&row.try_get::<String, _>("refunded_amount_psp")?)?,
            refunded_amount_usd: parse_decimal(&row.try_get::<String, _>("refunded_amount_usd")?)?,
            status,
        })
    }

    fn status_str(status: TransactionStatus) -> &'static str {
        match status {
            TransactionStatus::Idle => "IDLE",
            TransactionStatus::Validated => "VALIDATED",
            TransactionStatus::Rejected => "REJECTED",
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn insert_pending_batch(&self, rows: Vec<GasRefundTransaction>) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"INSERT INTO gas_refund_transaction
                   (chain_id, epoch, hash, address, timestamp, block_number, gas_used,
                    gas_used_chain_currency, psp_chain_currency, psp_usd, chain_currency_usd,
                    total_stake_amount_psp, refunded_amount_psp, refunded_amount_usd, status)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(row.chain_id.as_u64() as i64)
            .bind(row.epoch.0 as i64)
            .bind(row.hash)
            .bind(row.address)
            .bind(row.timestamp)
            .bind(row.block_number as i64)
            .bind(row.gas_used as i64)
            .bind(row.gas_used_chain_currency.to_string())
            .bind(row.psp_chain_currency.to_string())
            .bind(row.psp_usd.to_string())
            .bind(row.chain_currency_usd.to_string())
            .bind(row.total_stake_amount_psp.to_string())
            .bind(row.refunded_amount_psp.to_string())
            .bind(row.refunded_amount_usd.to_string())
            .bind(Self::status_str(row.status))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn last_processed_timestamp(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT MAX(timestamp) as m FROM gas_refund_transaction WHERE chain_id = ? AND epoch = ?",
        )
        .bind(chain.as_u64() as i64)
        .bind(epoch.0 as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<Option<i64>, _>("m")?)
    }

    async fn last_refunded_epoch(&self) -> anyhow::Result<Option<Epoch>> {
        let row = sqlx::query(
            "SELECT MAX(epoch) as m FROM gas_refund_transaction WHERE status IN ('VALIDATED', 'REJECTED')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row
            .try_get::<Option<i64>, _>("m")?
            .map(|e| Epoch::new(e as u32)))
    }

    async fn page_rows_from_epoch(
        &self,
        start_epoch: Epoch,
        page_size: u32,
        offset: u64,
    ) -> anyhow::Result<Vec<GasRefundTransaction>> {
        let rows = sqlx::query(
            r#"SELECT * FROM gas_refund_transaction WHERE epoch >= ?
               ORDER BY timestamp ASC, hash ASC LIMIT ? OFFSET ?"#,
        )
        .bind(start_epoch.0 as i64)
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn validated_rows_before(
        &self,
        up_to_epoch_exclusive: Epoch,
    ) -> anyhow::Result<Vec<GasRefundTransaction>> {
        let rows = sqlx::query(
            "SELECT * FROM gas_refund_transaction WHERE epoch < ? AND status = 'VALIDATED'",
        )
        .bind(up_to_epoch_exclusive.0 as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn apply_updates(&self, updates: Vec<RowUpdate>) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for update in updates {
            sqlx::query(
                "UPDATE gas_refund_transaction SET status = ?, refunded_amount_psp = ?, refunded_amount_usd = ? WHERE id = ?",
            )
            .bind(Self::status_str(update.status))
            .bind(update.refunded_amount_psp.to_string())
            .bind(update.refunded_amount_usd.to_string())
            .bind(update.id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn validated_rows_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Vec<GasRefundTransaction>> {
        let rows = sqlx::query(
            "SELECT * FROM gas_refund_transaction WHERE chain_id = ? AND epoch = ? AND status = 'VALIDATED'",
        )
        .bind(chain.as_u64() as i64)
        .bind(epoch.0 as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn epoch_fully_classified(&self, chain: ChainId, epoch: Epoch) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM gas_refund_transaction WHERE chain_id = ? AND epoch = ? AND status = 'IDLE'",
        )
        .bind(chain.as_u64() as i64)
        .bind(epoch.0 as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("c")? == 0)
    }

    async fn distribution_exists(&self, chain: ChainId, epoch: Epoch) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM gas_refund_distribution WHERE chain_id = ? AND epoch = ?",
        )
        .bind(chain.as_u64() as i64)
        .bind(epoch.0 as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("c")? > 0)
    }

    async fn seal_epoch(
        &self,
        distribution: Distribution,
        participations: Vec<Participation>,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO gas_refund_distribution (chain_id, epoch, merkle_root, total_psp_amount_to_refund, is_completed) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(distribution.chain_id.as_u64() as i64)
        .bind(distribution.epoch.0 as i64)
        .bind(distribution.merkle_root)
        .bind(distribution.total_psp_amount_to_refund.to_string())
        .execute(&mut *tx)
        .await?;

        for p in participations {
            sqlx::query(
                "INSERT INTO gas_refund_participation (chain_id, epoch, address, refunded_amount_psp, merkle_proofs, is_completed) VALUES (?, ?, ?, ?, ?, 1)",
            )
            .bind(p.chain_id.as_u64() as i64)
            .bind(p.epoch.0 as i64)
            .bind(p.address)
            .bind(p.refunded_amount_psp.to_string())
            .bind(serde_json::to_string(&p.merkle_proofs)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn distribution_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Option<Distribution>> {
        let row = sqlx::query(
            "SELECT * FROM gas_refund_distribution WHERE chain_id = ? AND epoch = ?",
        )
        .bind(chain.as_u64() as i64)
        .bind(epoch.0 as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            Ok(Distribution {
                chain_id: ChainId::try_from(r.try_get::<i64, _>("chain_id")? as u64)?,
                epoch: Epoch::new(r.try_get::<i64, _>("epoch")? as u32),
                merkle_root: r.try_get("merkle_root")?,
                total_psp_amount_to_refund: parse_decimal(
                    &r.try_get::<String, _>("total_psp_amount_to_refund")?,
                )?,
                is_completed: r.try_get::<i64, _>("is_completed")? != 0,
            })
        })
        .transpose()
    }

    async fn participations_for_address(
        &self,
        chain: ChainId,
        address: &str,
    ) -> anyhow::Result<Vec<Participation>> {
        let rows = sqlx::query(
            "SELECT * FROM gas_refund_participation WHERE chain_id = ? AND address = ?",
        )
        .bind(chain.as_u64() as i64)
        .bind(address)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_participation).collect()
    }

    async fn participations_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Vec<Participation>> {
        let rows = sqlx::query(
            "SELECT * FROM gas_refund_participation WHERE chain_id = ? AND epoch = ?",
        )
        .bind(chain.as_u64() as i64)
        .bind(epoch.0 as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_participation).collect()
    }
}

impl SqliteDatabase {
    fn row_to_participation(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Participation> {
        Ok(Participation {
            chain_id: ChainId::try_from(row.try_get::<i64, _>("chain_id")? as u64)?,
            epoch: Epoch::new(row.try_get::<i64, _>("epoch")? as u32),
            address: row.try_get("address")?,
            refunded_amount_psp: parse_decimal(&row.try_get::<String, _>("refunded_amount_psp")?)?,
            merkle_proofs: serde_json::from_str(&row.try_get::<String, _>("merkle_proofs")?)?,
            is_completed: row.try_get::<i64, _>("is_completed")? != 0,
        })
    }
}
