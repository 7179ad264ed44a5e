//! 수집 오케스트레이션
//!
//! 계정 하나에 대해 구성된 모든 피드를 실행합니다. 피드 간 실패는 격리되며
//! (인증 오류 제외), 페이지 처리 → 체크포인트 전진 순서를 지켜 at-least-once
//! 재전달이 항상 안전합니다.

pub mod feeds;
pub mod id_cursor;
pub mod rate_limit;
pub mod row;
pub mod symbol;
pub mod time_window;

use std::collections::BTreeSet;

use log::{error, info, warn};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::client::{ApiError, SignedApiClient};
use crate::db::{CheckpointRepository, LedgerRepository, SnapshotRepository};

pub use id_cursor::{IdCursorFeed, IdCursorIngest};
pub use rate_limit::{BackoffConfig, RateLimitPolicy, Sleeper, TokioSleeper};
pub use row::RowOutcome;
pub use symbol::SymbolMapper;
pub use time_window::{TimeWindowFeed, TimeWindowIngest};

use feeds::{ConvertFeed, DepositsFeed, DustFeed, RewardsFeed, TradeFeed, WithdrawalsFeed};

/// 대상 거래소 코드
pub const EXCHANGE: &str = "binance";

/// 피드 역사상 가장 이른 시작 시각: 2017-10-01T00:00:00Z
pub const HISTORY_FLOOR_MS: i64 = 1_506_816_000_000;

/// 페이지 루프 안전 상한
pub const MAX_PAGES: u32 = 10_000;

/// 수집 파이프라인 오류
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("API 호출 실패: {0}")]
    Api(#[from] ApiError),
    #[error("DB 오류: {0}")]
    Db(#[from] sqlx::Error),
}

/// 피드별 삽입 건수 요약
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestReport {
    pub trades: u64,
    pub deposits: u64,
    pub withdrawals: u64,
    pub converts: u64,
    pub dust: u64,
    pub rewards: u64,
}

impl IngestReport {
    pub fn total(&self) -> u64 {
        self.trades + self.deposits + self.withdrawals + self.converts + self.dust + self.rewards
    }
}

/// 시작 커서 계산: max(명시적 since, 체크포인트)
pub(crate) async fn start_ms(
    ckpt: &CheckpointRepository,
    exchange: &str,
    account_ref: &str,
    kind: &str,
    since: Option<i64>,
) -> Result<i64, sqlx::Error> {
    let checkpoint = ckpt.get(exchange, account_ref, kind).await?.unwrap_or(0);
    Ok(checkpoint.max(since.unwrap_or(0)))
}

/// 통합 수집 서비스
///
/// 호출자가 개별 피드에 의존하지 않도록 하는 얇은 오케스트레이터. 모든 피드는
/// external_id + 체크포인트로 멱등하므로 반복 호출이 안전합니다.
pub struct CompositeIngestService<C, S: Sleeper = TokioSleeper> {
    client: C,
    ckpt: CheckpointRepository,
    ledger: LedgerRepository,
    snapshots: SnapshotRepository,
    limiter: RateLimitPolicy<S>,
    mapper: SymbolMapper,
    skip_failed_windows: bool,
}

impl<C: SignedApiClient> CompositeIngestService<C, TokioSleeper> {
    pub fn new(client: C, pool: SqlitePool) -> Self {
        Self::with_limiter(client, pool, RateLimitPolicy::new(), true)
    }
}

impl<C: SignedApiClient, S: Sleeper> CompositeIngestService<C, S> {
    pub fn with_limiter(
        client: C,
        pool: SqlitePool,
        limiter: RateLimitPolicy<S>,
        skip_failed_windows: bool,
    ) -> Self {
        Self {
            client,
            ckpt: CheckpointRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            snapshots: SnapshotRepository::new(pool),
            limiter,
            mapper: SymbolMapper::default(),
            skip_failed_windows,
        }
    }

    fn window_ingest(&self) -> TimeWindowIngest<'_, C, S> {
        TimeWindowIngest::new(
            &self.client,
            &self.ckpt,
            &self.ledger,
            &self.limiter,
            self.skip_failed_windows,
        )
    }

    /// 모든 피드 실행. 피드 단위 실패는 0으로 보고하고 나머지는 계속 진행,
    /// 인증 오류만 실행 전체를 중단합니다.
    pub async fn ingest_all(
        &self,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<IngestReport, IngestError> {
        let report = IngestReport {
            trades: checked("trades", self.ingest_trades(account_ref, since).await)?,
            deposits: checked("deposits", self.ingest_deposits(account_ref, since).await)?,
            withdrawals: checked(
                "withdrawals",
                self.ingest_withdrawals(account_ref, since).await,
            )?,
            converts: checked("converts", self.ingest_converts(account_ref, since).await)?,
            dust: checked("dust", self.ingest_dust(account_ref, since).await)?,
            rewards: checked("rewards", self.ingest_rewards(account_ref, since).await)?,
        };
        info!(
            "수집 완료: 총 {}건 (trades={}, deposits={}, withdrawals={}, converts={}, dust={}, rewards={})",
            report.total(),
            report.trades,
            report.deposits,
            report.withdrawals,
            report.converts,
            report.dust,
            report.rewards
        );
        Ok(report)
    }

    /// 계정의 자산 universe(스냅샷 ∪ 원장)에 대해 심볼별 체결 내역 수집.
    /// 유효하지 않은 심볼은 건너뛰고 다음 심볼로 계속합니다.
    pub async fn ingest_trades(
        &self,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<u64, IngestError> {
        let mut assets: BTreeSet<String> = self
            .snapshots
            .assets_for_account(EXCHANGE, account_ref)
            .await?
            .into_iter()
            .collect();
        assets.extend(self.ledger.base_assets(EXCHANGE, account_ref).await?);

        let seed = since.unwrap_or(0);
        let mut total = 0u64;
        for asset in assets {
            let symbol = match self.mapper.to_market(&asset) {
                Some(s) => s,
                None => continue,
            };
            let feed = TradeFeed::new(&symbol, seed);
            let pager =
                IdCursorIngest::new(&self.client, &self.ckpt, &self.ledger, &self.limiter);
            match pager.ingest(&feed, account_ref).await {
                Ok(n) => total += n,
                Err(IngestError::Api(ApiError::InvalidSymbol(msg))) => {
                    warn!("유효하지 않은 심볼 {} 건너뜀: {}", symbol, msg);
                }
                Err(IngestError::Api(ApiError::Auth(msg))) => {
                    return Err(IngestError::Api(ApiError::Auth(msg)));
                }
                Err(e) => {
                    error!("{} 체결 수집 실패: {}", symbol, e);
                }
            }
        }
        Ok(total)
    }

    pub async fn ingest_deposits(
        &self,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<u64, IngestError> {
        self.window_ingest()
            .ingest(&DepositsFeed, account_ref, since)
            .await
    }

    pub async fn ingest_withdrawals(
        &self,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<u64, IngestError> {
        self.window_ingest()
            .ingest(&WithdrawalsFeed, account_ref, since)
            .await
    }

    pub async fn ingest_converts(
        &self,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<u64, IngestError> {
        self.window_ingest()
            .ingest(&ConvertFeed, account_ref, since)
            .await
    }

    pub async fn ingest_dust(
        &self,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<u64, IngestError> {
        self.window_ingest().ingest(&DustFeed, account_ref, since).await
    }

    pub async fn ingest_rewards(
        &self,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<u64, IngestError> {
        self.window_ingest()
            .ingest(&RewardsFeed, account_ref, since)
            .await
    }
}

/// 피드 단위 실패 격리: 인증 오류만 전파, 나머지는 경고 후 0으로 보고
fn checked(label: &str, result: Result<u64, IngestError>) -> Result<u64, IngestError> {
    match result {
        Ok(n) => Ok(n),
        Err(IngestError::Api(ApiError::Auth(msg))) => {
            error!("'{}' 수집 중 인증 오류, 실행 중단: {}", label, msg);
            Err(IngestError::Api(ApiError::Auth(msg)))
        }
        Err(e) => {
            warn!("'{}' 수집 실패 (0으로 보고하고 계속): {}", label, e);
            Ok(0)
        }
    }
}
