use super::models::{LedgerRecord, NewLedgerEntry, SnapshotRecord};
use sqlx::sqlite::SqlitePool;
use sqlx::Error as SqlxError;

/// 수집 체크포인트 저장소
///
/// (거래소, 계정, 피드 종류)별 진행 커서. 페이지의 행이 모두 저장된 뒤에만 갱신됩니다.
#[derive(Clone)]
pub struct CheckpointRepository {
    pool: SqlitePool,
}

impl CheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 커서 조회 (epoch millis)
    pub async fn get(
        &self,
        exchange: &str,
        account_ref: &str,
        kind: &str,
    ) -> Result<Option<i64>, SqlxError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT cursor_ts FROM ingest_checkpoint
             WHERE exchange = ? AND account_ref = ? AND kind = ?",
        )
        .bind(exchange)
        .bind(account_ref)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(ts,)| ts))
    }

    /// 커서 저장 (없으면 생성)
    pub async fn put(
        &self,
        exchange: &str,
        account_ref: &str,
        kind: &str,
        cursor_ts: i64,
        cursor_str: Option<&str>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "INSERT INTO ingest_checkpoint (exchange, account_ref, kind, cursor_ts, cursor_str)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(exchange, account_ref, kind) DO UPDATE SET
                cursor_ts = excluded.cursor_ts,
                cursor_str = excluded.cursor_str,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(exchange)
        .bind(account_ref)
        .bind(kind)
        .bind(cursor_ts)
        .bind(cursor_str)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// 원장 저장소
///
/// (exchange, external_id) 기준 멱등 upsert. 같은 external_id 재제출은 no-op이며
/// 기존 행을 덮어쓰지 않습니다.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 원장 항목 저장. 신규 삽입이면 1, 중복이면 0을 반환합니다.
    pub async fn upsert(&self, entry: &NewLedgerEntry) -> Result<u64, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO ledger_tx
             (exchange, account_ref, base, quote, type, quantity, price, fee, fee_asset, ts, external_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(exchange, external_id) DO NOTHING",
        )
        .bind(&entry.exchange)
        .bind(&entry.account_ref)
        .bind(&entry.base)
        .bind(&entry.quote)
        .bind(entry.entry_type.as_str())
        .bind(entry.quantity.to_string())
        .bind(entry.price.map(|p| p.to_string()))
        .bind(entry.fee.map(|f| f.to_string()))
        .bind(entry.fee_asset.as_deref())
        .bind(entry.ts_ms)
        .bind(&entry.external_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// 계정별 원장 행 수 조회
    pub async fn count(&self, exchange: &str, account_ref: &str) -> Result<i64, SqlxError> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM ledger_tx WHERE exchange = ? AND account_ref = ?",
        )
        .bind(exchange)
        .bind(account_ref)
        .fetch_one(&self.pool)
        .await?;

        Ok(n)
    }

    /// 계정의 전체 원장 조회 (대사용)
    pub async fn entries_for(
        &self,
        exchange: &str,
        account_ref: &str,
    ) -> Result<Vec<LedgerRecord>, SqlxError> {
        let rows = sqlx::query_as::<_, LedgerRecord>(
            "SELECT id, exchange, account_ref, base, quote, type, quantity, price, fee, fee_asset, ts, external_id
             FROM ledger_tx
             WHERE exchange = ? AND account_ref = ?
             ORDER BY ts ASC",
        )
        .bind(exchange)
        .bind(account_ref)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// 원장에 등장한 기초 자산 목록
    pub async fn base_assets(
        &self,
        exchange: &str,
        account_ref: &str,
    ) -> Result<Vec<String>, SqlxError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT base FROM ledger_tx WHERE exchange = ? AND account_ref = ?",
        )
        .bind(exchange)
        .bind(account_ref)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(a,)| a).collect())
    }
}

/// 잔고 스냅샷 저장소 (append-only 시계열)
#[derive(Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 스냅샷 행 추가
    pub async fn append(
        &self,
        exchange: &str,
        account_ref: &str,
        asset: &str,
        free_amt: &str,
        locked_amt: &str,
        as_of: i64,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "INSERT INTO balance_snapshot (exchange, account_ref, asset, free_amt, locked_amt, as_of)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(exchange)
        .bind(account_ref)
        .bind(asset)
        .bind(free_amt)
        .bind(locked_amt)
        .bind(as_of)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 자산별 최신 스냅샷 조회 (as_of 최대 행)
    pub async fn latest(
        &self,
        exchange: Option<&str>,
        account_ref: &str,
    ) -> Result<Vec<SnapshotRecord>, SqlxError> {
        let rows = sqlx::query_as::<_, SnapshotRecord>(
            "SELECT s.exchange, s.account_ref, s.asset, s.free_amt, s.locked_amt, s.as_of
             FROM balance_snapshot s
             JOIN (
                 SELECT exchange, account_ref, asset, MAX(as_of) AS max_as_of
                 FROM balance_snapshot
                 WHERE account_ref = ? AND (? IS NULL OR exchange = ?)
                 GROUP BY exchange, account_ref, asset
             ) m ON s.exchange = m.exchange
                AND s.account_ref = m.account_ref
                AND s.asset = m.asset
                AND s.as_of = m.max_as_of
             ORDER BY s.exchange, s.asset",
        )
        .bind(account_ref)
        .bind(exchange)
        .bind(exchange)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// 스냅샷에 등장한 자산 목록 (거래 수집 대상 심볼 결정용)
    pub async fn assets_for_account(
        &self,
        exchange: &str,
        account_ref: &str,
    ) -> Result<Vec<String>, SqlxError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT asset FROM balance_snapshot
             WHERE exchange = ? AND account_ref = ?
             ORDER BY asset",
        )
        .bind(exchange)
        .bind(account_ref)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(a,)| a).collect())
    }
}
