use alloy_primitives::{Address, TxHash};
use nexus_types::chain::ChainId;
use nexus_types::proto::{TransactionKind, TransactionRecord, TransactionStatus};
use nexus_types::timestamp::UnixTimestamp;
use nexus_types::util::{WalletAddress, WeiAmount};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgExecutor, PgPool, Row};
use std::str::FromStr;
use std::time::Duration;

use super::{BalanceSnapshot, Deposit, LedgerError, LedgerStore, TransactionQuery};

/// Ledger persisted in PostgreSQL.
///
/// Balances are `NUMERIC(78,0)` constrained to the `uint256` range. Debits
/// are a single conditional `UPDATE`, so the check and the decrement happen
/// in one statement under the row lock. A deposit claims its hash, credits
/// and journals inside one database transaction.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS nexus_balances (
        wallet TEXT NOT NULL,
        chain_id BIGINT NOT NULL,
        virtual_balance NUMERIC(78, 0) NOT NULL DEFAULT 0
            CHECK (virtual_balance >= 0)
            CHECK (virtual_balance <= 115792089237316195423570985008687907853269984665640564039457584007913129639935),
        last_updated BIGINT NOT NULL,
        PRIMARY KEY (wallet, chain_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS nexus_deposits (
        tx_hash TEXT PRIMARY KEY,
        wallet TEXT NOT NULL,
        chain_id BIGINT NOT NULL,
        amount NUMERIC(78, 0) NOT NULL,
        processed_at BIGINT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS nexus_transactions (
        id BIGSERIAL PRIMARY KEY,
        wallet TEXT NOT NULL,
        kind TEXT NOT NULL,
        chain_id BIGINT NOT NULL,
        amount NUMERIC(78, 0) NOT NULL,
        counterparty TEXT,
        tx_hash TEXT,
        timestamp BIGINT NOT NULL,
        status TEXT NOT NULL
    );
    "#,
    r#"CREATE INDEX IF NOT EXISTS nexus_transactions_wallet ON nexus_transactions(wallet, id DESC);"#,
];

const SCHEMA_LOCK_KEY: i64 = 0x6e65_7875_735f_6c67;

fn backend(error: impl std::fmt::Display) -> LedgerError {
    LedgerError::Backend(error.to_string())
}

fn chain_id_param(chain_id: ChainId) -> Result<i64, LedgerError> {
    i64::try_from(chain_id.inner()).map_err(|_| backend(format!("chain id {chain_id} out of range")))
}

fn millis_param(timestamp: UnixTimestamp) -> Result<i64, LedgerError> {
    i64::try_from(timestamp.as_millis()).map_err(backend)
}

fn parse_amount(row: &PgRow, column: &str) -> Result<WeiAmount, LedgerError> {
    let text: String = row.try_get(column).map_err(backend)?;
    WeiAmount::from_str(&text).map_err(backend)
}

fn parse_chain_id(row: &PgRow) -> Result<ChainId, LedgerError> {
    let chain_id: i64 = row.try_get("chain_id").map_err(backend)?;
    u64::try_from(chain_id).map(ChainId::new).map_err(backend)
}

fn parse_millis(row: &PgRow, column: &str) -> Result<UnixTimestamp, LedgerError> {
    let millis: i64 = row.try_get(column).map_err(backend)?;
    Ok(UnixTimestamp::from_millis(u64::try_from(millis).unwrap_or_default()))
}

async fn credit_with<'e, E: PgExecutor<'e>>(
    executor: E,
    wallet: WalletAddress,
    chain_id: ChainId,
    amount: WeiAmount,
    now: UnixTimestamp,
) -> Result<WeiAmount, LedgerError> {
    let row = sqlx::query(
        r#"
        INSERT INTO nexus_balances (wallet, chain_id, virtual_balance, last_updated)
        VALUES ($1, $2, $3::numeric, $4)
        ON CONFLICT (wallet, chain_id) DO UPDATE
        SET virtual_balance = nexus_balances.virtual_balance + EXCLUDED.virtual_balance,
            last_updated = EXCLUDED.last_updated
        RETURNING virtual_balance::text AS balance
        "#,
    )
    .bind(wallet.to_string())
    .bind(chain_id_param(chain_id)?)
    .bind(amount.to_string())
    .bind(millis_param(now)?)
    .fetch_one(executor)
    .await
    .map_err(|e| match e.as_database_error().and_then(|d| d.code()) {
        // check_violation: the sum left the uint256 range
        Some(code) if code == "23514" => LedgerError::Overflow,
        _ => backend(e),
    })?;
    parse_amount(&row, "balance")
}

async fn append_with<'e, E: PgExecutor<'e>>(
    executor: E,
    record: &TransactionRecord,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO nexus_transactions
            (wallet, kind, chain_id, amount, counterparty, tx_hash, timestamp, status)
        VALUES ($1, $2, $3, $4::numeric, $5, $6, $7, $8)
        "#,
    )
    .bind(record.wallet.to_string())
    .bind(record.kind.as_str())
    .bind(chain_id_param(record.chain_id)?)
    .bind(record.amount.to_string())
    .bind(record.counterparty.map(|a| a.to_string()))
    .bind(record.tx_hash.map(|h| h.to_string()))
    .bind(millis_param(record.timestamp)?)
    .bind(record.status.as_str())
    .execute(executor)
    .await
    .map_err(backend)?;
    Ok(())
}

fn record_from_row(row: &PgRow) -> Result<TransactionRecord, LedgerError> {
    let wallet: String = row.try_get("wallet").map_err(backend)?;
    let kind: String = row.try_get("kind").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    let counterparty: Option<String> = row.try_get("counterparty").map_err(backend)?;
    let tx_hash: Option<String> = row.try_get("tx_hash").map_err(backend)?;
    Ok(TransactionRecord {
        wallet: WalletAddress::from_str(&wallet).map_err(backend)?,
        kind: match kind.as_str() {
            "deposit" => TransactionKind::Deposit,
            "payment" => TransactionKind::Payment,
            other => return Err(backend(format!("unknown transaction kind {other}"))),
        },
        chain_id: parse_chain_id(row)?,
        amount: parse_amount(row, "amount")?,
        counterparty: counterparty
            .map(|a| Address::from_str(&a))
            .transpose()
            .map_err(backend)?,
        tx_hash: tx_hash
            .map(|h| TxHash::from_str(&h))
            .transpose()
            .map_err(backend)?,
        timestamp: parse_millis(row, "timestamp")?,
        status: match status.as_str() {
            "completed" => TransactionStatus::Completed,
            "failed" => TransactionStatus::Failed,
            other => return Err(backend(format!("unknown transaction status {other}"))),
        },
    })
}

impl PostgresLedger {
    /// Connects to `url` and creates the schema if it does not exist.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(backend)?;
        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Concurrent `CREATE TABLE IF NOT EXISTS` can still collide in the
    /// catalog, so instances starting together take an advisory lock first.
    async fn init_schema(&self) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedger {
    async fn balance(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
    ) -> Result<WeiAmount, LedgerError> {
        let row = sqlx::query(
            "SELECT virtual_balance::text AS balance FROM nexus_balances WHERE wallet = $1 AND chain_id = $2",
        )
        .bind(wallet.to_string())
        .bind(chain_id_param(chain_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            Some(row) => parse_amount(&row, "balance"),
            None => Ok(WeiAmount::ZERO),
        }
    }

    async fn balances(&self, wallet: WalletAddress) -> Result<Vec<BalanceSnapshot>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT chain_id, virtual_balance::text AS balance, last_updated
            FROM nexus_balances WHERE wallet = $1 ORDER BY chain_id
            "#,
        )
        .bind(wallet.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter()
            .map(|row| {
                Ok(BalanceSnapshot {
                    chain_id: parse_chain_id(row)?,
                    balance: parse_amount(row, "balance")?,
                    last_updated: parse_millis(row, "last_updated")?,
                })
            })
            .collect()
    }

    async fn credit(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
    ) -> Result<WeiAmount, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        credit_with(&self.pool, wallet, chain_id, amount, UnixTimestamp::now()).await
    }

    async fn try_debit(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
    ) -> Result<WeiAmount, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let row = sqlx::query(
            r#"
            UPDATE nexus_balances
            SET virtual_balance = virtual_balance - $3::numeric, last_updated = $4
            WHERE wallet = $1 AND chain_id = $2 AND virtual_balance >= $3::numeric
            RETURNING virtual_balance::text AS balance
            "#,
        )
        .bind(wallet.to_string())
        .bind(chain_id_param(chain_id)?)
        .bind(amount.to_string())
        .bind(millis_param(UnixTimestamp::now())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            Some(row) => parse_amount(&row, "balance"),
            None => {
                // Reporting only; the debit was already refused atomically.
                let available = self.balance(wallet, chain_id).await?;
                Err(LedgerError::InsufficientBalance {
                    required: amount,
                    available,
                })
            }
        }
    }

    async fn record_deposit(&self, deposit: &Deposit) -> Result<WeiAmount, LedgerError> {
        if deposit.amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let claimed = sqlx::query(
            r#"
            INSERT INTO nexus_deposits (tx_hash, wallet, chain_id, amount, processed_at)
            VALUES ($1, $2, $3, $4::numeric, $5)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
        )
        .bind(deposit.tx_hash.to_string())
        .bind(deposit.wallet.to_string())
        .bind(chain_id_param(deposit.chain_id)?)
        .bind(deposit.amount.to_string())
        .bind(millis_param(deposit.processed_at)?)
        .execute(&mut *tx)
        .await
        .map_err(backend)?
        .rows_affected();
        if claimed == 0 {
            tx.rollback().await.map_err(backend)?;
            return Err(LedgerError::DuplicateDeposit(deposit.tx_hash));
        }
        let new_balance = credit_with(
            &mut *tx,
            deposit.wallet,
            deposit.chain_id,
            deposit.amount,
            deposit.processed_at,
        )
        .await?;
        append_with(
            &mut *tx,
            &TransactionRecord {
                wallet: deposit.wallet,
                kind: TransactionKind::Deposit,
                chain_id: deposit.chain_id,
                amount: deposit.amount,
                counterparty: None,
                tx_hash: Some(deposit.tx_hash),
                timestamp: deposit.processed_at,
                status: TransactionStatus::Completed,
            },
        )
        .await?;
        tx.commit().await.map_err(backend)?;
        Ok(new_balance)
    }

    async fn append(&self, record: &TransactionRecord) -> Result<(), LedgerError> {
        append_with(&self.pool, record).await
    }

    async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let chain_id = query.chain_id.map(chain_id_param).transpose()?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT wallet, kind, chain_id, amount::text AS amount, counterparty, tx_hash, timestamp, status
            FROM nexus_transactions
            WHERE wallet = $1 AND ($2::bigint IS NULL OR chain_id = $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(query.wallet.to_string())
        .bind(chain_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(record_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    //! Run against a live database with
    //! `DATABASE_URL=postgres://... cargo test --features postgres`.
    //! Without `DATABASE_URL` these tests return early.

    use super::*;
    use alloy_primitives::U256;
    use rand::Rng;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    const CRONOS: ChainId = ChainId::new(240);
    const BASE: ChainId = ChainId::new(84532);

    async fn ledger() -> Option<PostgresLedger> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(PostgresLedger::connect(&url, 8).await.unwrap())
    }

    /// A wallet no other run has touched.
    fn fresh_wallet() -> WalletAddress {
        WalletAddress::new(Address::from(rand::rng().random::<[u8; 20]>()))
    }

    fn fresh_hash() -> TxHash {
        TxHash::from(rand::rng().random::<[u8; 32]>())
    }

    fn deposit(wallet: WalletAddress, tx_hash: TxHash, amount: u64, at: u64) -> Deposit {
        Deposit {
            wallet,
            chain_id: CRONOS,
            amount: WeiAmount::from(amount),
            tx_hash,
            processed_at: UnixTimestamp::from_millis(at),
        }
    }

    #[tokio::test]
    async fn test_credit_and_conditional_debit() {
        let Some(ledger) = ledger().await else {
            return;
        };
        let wallet = fresh_wallet();
        assert_eq!(ledger.balance(wallet, CRONOS).await.unwrap(), WeiAmount::ZERO);
        assert_eq!(
            ledger.credit(wallet, CRONOS, WeiAmount::from(100)).await.unwrap(),
            WeiAmount::from(100)
        );
        assert_eq!(
            ledger.try_debit(wallet, CRONOS, WeiAmount::from(40)).await.unwrap(),
            WeiAmount::from(60)
        );
        let err = ledger
            .try_debit(wallet, CRONOS, WeiAmount::from(61))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { required, available }
                if required == WeiAmount::from(61) && available == WeiAmount::from(60)
        ));
        // No row yet on this chain
        assert!(matches!(
            ledger.try_debit(wallet, BASE, WeiAmount::from(1)).await,
            Err(LedgerError::InsufficientBalance { available, .. }) if available.is_zero()
        ));
        let balances = ledger.balances(wallet).await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].balance, WeiAmount::from(60));
    }

    #[tokio::test]
    async fn test_credit_past_uint256_is_overflow() {
        let Some(ledger) = ledger().await else {
            return;
        };
        let wallet = fresh_wallet();
        ledger
            .credit(wallet, CRONOS, WeiAmount::from(U256::MAX))
            .await
            .unwrap();
        let err = ledger
            .credit(wallet, CRONOS, WeiAmount::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Overflow), "{err}");
        assert_eq!(
            ledger.balance(wallet, CRONOS).await.unwrap(),
            WeiAmount::from(U256::MAX)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let Some(ledger) = ledger().await else {
            return;
        };
        let ledger = Arc::new(ledger);
        let wallet = fresh_wallet();
        ledger
            .credit(wallet, CRONOS, WeiAmount::from(1_000))
            .await
            .unwrap();
        let mut tasks = JoinSet::new();
        for _ in 0..25 {
            let ledger = ledger.clone();
            tasks.spawn(async move {
                ledger
                    .try_debit(wallet, CRONOS, WeiAmount::from(70))
                    .await
            });
        }
        let mut succeeded = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientBalance { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(succeeded, 1_000 / 70);
        assert_eq!(
            ledger.balance(wallet, CRONOS).await.unwrap(),
            WeiAmount::from(1_000 - (1_000 / 70) * 70)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_deposits_with_same_hash_credit_once() {
        let Some(ledger) = ledger().await else {
            return;
        };
        let ledger = Arc::new(ledger);
        let wallet = fresh_wallet();
        let tx_hash = fresh_hash();
        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            tasks.spawn(async move {
                ledger
                    .record_deposit(&deposit(wallet, tx_hash, 1_000, 1_000))
                    .await
            });
        }
        let mut accepted = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => accepted += 1,
                Err(LedgerError::DuplicateDeposit(hash)) => assert_eq!(hash, tx_hash),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(
            ledger.balance(wallet, CRONOS).await.unwrap(),
            WeiAmount::from(1_000)
        );
        let journal = ledger
            .transactions(&TransactionQuery {
                wallet,
                chain_id: None,
                limit: 50,
            })
            .await
            .unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].tx_hash, Some(tx_hash));
    }

    #[tokio::test]
    async fn test_journal_filters_and_orders_newest_first() {
        let Some(ledger) = ledger().await else {
            return;
        };
        let wallet = fresh_wallet();
        ledger
            .record_deposit(&deposit(wallet, fresh_hash(), 10, 1_001))
            .await
            .unwrap();
        ledger
            .record_deposit(&deposit(wallet, fresh_hash(), 20, 1_002))
            .await
            .unwrap();
        let payee = Address::repeat_byte(0xee);
        ledger
            .append(&TransactionRecord {
                wallet,
                kind: TransactionKind::Payment,
                chain_id: BASE,
                amount: WeiAmount::from(5),
                counterparty: Some(payee),
                tx_hash: None,
                timestamp: UnixTimestamp::from_millis(5_000),
                status: TransactionStatus::Failed,
            })
            .await
            .unwrap();

        let all = ledger
            .transactions(&TransactionQuery {
                wallet,
                chain_id: None,
                limit: 50,
            })
            .await
            .unwrap();
        let amounts: Vec<_> = all.iter().map(|r| r.amount).collect();
        assert_eq!(
            amounts,
            vec![WeiAmount::from(5), WeiAmount::from(20), WeiAmount::from(10)]
        );
        assert_eq!(all[0].counterparty, Some(payee));
        assert_eq!(all[0].status, TransactionStatus::Failed);
        assert_eq!(all[2].timestamp, UnixTimestamp::from_millis(1_001));

        let cronos_only = ledger
            .transactions(&TransactionQuery {
                wallet,
                chain_id: Some(CRONOS),
                limit: 1,
            })
            .await
            .unwrap();
        assert_eq!(cronos_only.len(), 1);
        assert_eq!(cronos_only[0].amount, WeiAmount::from(20));
    }
}
