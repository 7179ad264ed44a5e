use log::debug;
use serde_json::Value;

use super::rate_limit::{RateLimitPolicy, Sleeper};
use super::row::RowOutcome;
use super::{IngestError, EXCHANGE, HISTORY_FLOOR_MS, MAX_PAGES};
use crate::client::{param, Params, SignedApiClient};
use crate::db::{CheckpointRepository, LedgerRepository};

/// 증가하는 행 id 기반 피드 정의 (심볼별 체결 내역)
#[allow(async_fn_in_trait)]
pub trait IdCursorFeed {
    /// 체크포인트 키 구성 요소, 예: "trades:BTCUSDT"
    fn kind(&self) -> String;

    /// 엔드포인트 경로, 예: /api/v3/myTrades
    fn path(&self) -> &str;

    /// 이 실행에 사용할 거래소 심볼
    fn symbol(&self) -> &str;

    /// 첫 페이지의 시작 시각 시드 (체크포인트가 없을 때)
    fn seed_start_ms(&self) -> i64;

    fn page_limit(&self) -> u32 {
        1_000
    }

    fn pre_call_pause_ms(&self) -> u64 {
        100
    }

    /// 행에서 증가 id 추출
    fn extract_id(&self, row: &Value) -> Option<i64>;

    async fn handle_row(
        &self,
        row: &Value,
        account_ref: &str,
        ledger: &LedgerRepository,
    ) -> Result<RowOutcome, IngestError>;
}

/// id 커서 페이저
///
/// 첫 요청만 startTime을 싣고, 이후 요청은 fromId = 직전 최대 id + 1만 싣습니다.
/// 두 파라미터는 상호 배타적이며 절대 함께 보내지 않습니다.
pub struct IdCursorIngest<'a, C, S: Sleeper> {
    client: &'a C,
    ckpt: &'a CheckpointRepository,
    ledger: &'a LedgerRepository,
    limiter: &'a RateLimitPolicy<S>,
}

impl<'a, C: SignedApiClient, S: Sleeper> IdCursorIngest<'a, C, S> {
    pub fn new(
        client: &'a C,
        ckpt: &'a CheckpointRepository,
        ledger: &'a LedgerRepository,
        limiter: &'a RateLimitPolicy<S>,
    ) -> Self {
        Self {
            client,
            ckpt,
            ledger,
            limiter,
        }
    }

    /// 체크포인트 이후의 행을 수집하고 삽입된 원장 행 수를 반환
    pub async fn ingest<F: IdCursorFeed>(
        &self,
        feed: &F,
        account_ref: &str,
    ) -> Result<u64, IngestError> {
        let kind = feed.kind();
        let mut start_ms = self
            .ckpt
            .get(EXCHANGE, account_ref, &kind)
            .await?
            .unwrap_or_else(|| feed.seed_start_ms());
        start_ms = start_ms.max(HISTORY_FLOOR_MS); // 피드 역사 시작 이전으로는 가지 않음

        let limit = feed.page_limit();
        let mut from_id: Option<i64> = None;
        let mut inserted = 0u64;

        for _page in 0..MAX_PAGES {
            let mut params: Params = Vec::new();
            param(&mut params, "symbol", feed.symbol());
            param(&mut params, "limit", limit);
            match from_id {
                // 두 번째 페이지부터는 fromId만, startTime은 절대 함께 싣지 않음
                Some(id) => param(&mut params, "fromId", id),
                None if start_ms > 0 => param(&mut params, "startTime", start_ms),
                None => {}
            }

            debug!("'{}' 페이지 수집 (fromId={:?})", kind, from_id);

            let body = self
                .limiter
                .execute(feed.pre_call_pause_ms(), || {
                    self.client.get(feed.path(), &params)
                })
                .await?;

            let rows = match body.as_array() {
                Some(rows) if !rows.is_empty() => rows.clone(),
                _ => break,
            };

            let mut max_ts = start_ms;
            let mut max_id: i64 = -1;
            for row in &rows {
                let outcome = feed.handle_row(row, account_ref, self.ledger).await?;
                inserted += outcome.inserted;
                if outcome.event_ts_ms > 0 {
                    max_ts = max_ts.max(outcome.event_ts_ms);
                }
                if let Some(id) = feed.extract_id(row) {
                    max_id = max_id.max(id);
                }
            }

            if max_ts > start_ms {
                self.ckpt
                    .put(EXCHANGE, account_ref, &kind, max_ts, None)
                    .await?;
                start_ms = max_ts;
            }

            // 페이지가 limit 미만이거나 id를 얻지 못하면 끝까지 읽은 것
            if rows.len() < limit as usize || max_id < 0 {
                break;
            }
            from_id = Some(max_id + 1);
        }

        Ok(inserted)
    }
}
