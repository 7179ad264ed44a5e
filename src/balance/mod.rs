//! 잔고 스냅샷 수집
//!
//! 거래소가 보고하는 현물 잔고를 조회해 append-only 시계열로 적재합니다.
//! 스냅샷은 대사(reconcile)의 기준값이자 체결 수집 대상 심볼의 출처입니다.

use chrono::Utc;
use log::info;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;

use crate::client::{param, ApiError, Params, SignedApiClient};
use crate::db::SnapshotRepository;
use crate::ingest::EXCHANGE;

/// 자산별 현물 잔고
#[derive(Debug, Clone, PartialEq)]
pub struct SpotPosition {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl SpotPosition {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// 현물 계정 잔고 조회 서비스
pub struct SpotPositionsService<'a, C> {
    client: &'a C,
}

impl<'a, C: SignedApiClient> SpotPositionsService<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// /api/v3/account에서 0이 아닌 잔고를 조회
    pub async fn fetch_spot_balances(&self) -> Result<Vec<SpotPosition>, ApiError> {
        let mut params: Params = Vec::new();
        param(&mut params, "omitZeroBalances", "true");

        let body = self.client.get("/api/v3/account", &params).await?;
        let balances = body["balances"].as_array().cloned().unwrap_or_default();

        let mut positions = Vec::with_capacity(balances.len());
        for b in &balances {
            let position = SpotPosition {
                asset: text(b, "asset"),
                free: decimal(b, "free"),
                locked: decimal(b, "locked"),
            };
            // omitZeroBalances를 무시하는 응답 대비
            if !position.total().is_zero() {
                positions.push(position);
            }
        }
        Ok(positions)
    }
}

/// 잔고 스냅샷 적재 서비스
pub struct BalanceIngestService<'a, C> {
    positions: SpotPositionsService<'a, C>,
    snapshots: SnapshotRepository,
}

impl<'a, C: SignedApiClient> BalanceIngestService<'a, C> {
    pub fn new(client: &'a C, pool: SqlitePool) -> Self {
        Self {
            positions: SpotPositionsService::new(client),
            snapshots: SnapshotRepository::new(pool),
        }
    }

    /// 현재 잔고를 조회해 스냅샷 행으로 추가. 적재한 자산 수를 반환합니다.
    pub async fn ingest(&self, account_ref: &str) -> Result<usize, BalanceError> {
        let positions = self.positions.fetch_spot_balances().await?;
        let as_of = Utc::now().timestamp_millis();

        for p in &positions {
            self.snapshots
                .append(
                    EXCHANGE,
                    account_ref,
                    &p.asset,
                    &p.free.to_string(),
                    &p.locked.to_string(),
                    as_of,
                )
                .await?;
        }

        info!("잔고 스냅샷 적재: {}개 자산 (as_of={})", positions.len(), as_of);
        Ok(positions.len())
    }
}

/// 잔고 수집 오류
#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("API 호출 실패: {0}")]
    Api(#[from] ApiError),
    #[error("DB 오류: {0}")]
    Db(#[from] sqlx::Error),
}

fn text(row: &Value, key: &str) -> String {
    row[key].as_str().unwrap_or_default().to_string()
}

fn decimal(row: &Value, key: &str) -> Decimal {
    match &row[key] {
        Value::String(s) => s.parse().unwrap_or(Decimal::ZERO),
        Value::Number(n) => n.to_string().parse().unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}
