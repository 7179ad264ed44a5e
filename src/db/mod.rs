pub mod models;
pub mod repository;

use log::info;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Error as SqlxError;

pub use repository::{CheckpointRepository, LedgerRepository, SnapshotRepository};

/// SQLite 데이터베이스 초기화 및 연결
pub async fn init_database(database_url: &str) -> Result<SqlitePool, SqlxError> {
    info!("SQLite 데이터베이스 초기화 중: {}", database_url);

    // 연결 풀 생성
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    // 테이블 생성
    create_tables(&pool).await?;

    info!("데이터베이스 초기화 완료");

    Ok(pool)
}

/// 필요한 테이블 생성
pub async fn create_tables(pool: &SqlitePool) -> Result<(), SqlxError> {
    // 수집 체크포인트 테이블: (거래소, 계정, 피드 종류)별 커서
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ingest_checkpoint (
            exchange TEXT NOT NULL,
            account_ref TEXT NOT NULL,
            kind TEXT NOT NULL,
            cursor_ts INTEGER NOT NULL,
            cursor_str TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (exchange, account_ref, kind)
        )",
    )
    .execute(pool)
    .await?;

    // 원장 테이블: 경제적 이벤트 1건 = 1행, (exchange, external_id) 전역 유일
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ledger_tx (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange TEXT NOT NULL,
            account_ref TEXT NOT NULL,
            base TEXT NOT NULL,
            quote TEXT NOT NULL,
            type TEXT NOT NULL,
            quantity TEXT NOT NULL,
            price TEXT,
            fee TEXT,
            fee_asset TEXT,
            ts INTEGER NOT NULL,
            external_id TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (exchange, external_id)
        )",
    )
    .execute(pool)
    .await?;

    // 잔고 스냅샷 테이블: 거래소가 보고한 잔고의 시계열 (append-only)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS balance_snapshot (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange TEXT NOT NULL,
            account_ref TEXT NOT NULL,
            asset TEXT NOT NULL,
            free_amt TEXT NOT NULL,
            locked_amt TEXT NOT NULL,
            as_of INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
