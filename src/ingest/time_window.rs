use chrono::{Duration, Utc};
use log::{debug, warn};
use serde_json::Value;

use super::rate_limit::{RateLimitPolicy, Sleeper};
use super::row::RowOutcome;
use super::{start_ms, IngestError, EXCHANGE, HISTORY_FLOOR_MS, MAX_PAGES};
use crate::client::{param, ApiError, Params, SignedApiClient};
use crate::db::{CheckpointRepository, LedgerRepository};

/// 재시도 소진 후 윈도우를 건너뛰기 전 완충 지연
const FALLBACK_DELAY_MS: u64 = 2_000;

/// 날짜 구간 필터 기반 피드 정의
///
/// 피드별 차이(경로, 윈도우 폭, 페이싱, 행 추출, 행 → 원장 매핑)만 기술하면
/// 페이지네이션 자체는 TimeWindowIngest가 공통으로 수행합니다.
#[allow(async_fn_in_trait)]
pub trait TimeWindowFeed {
    /// 체크포인트 키 구성 요소, 예: "convert", "dust", "rewards"
    fn kind(&self) -> &str;

    /// 엔드포인트 경로, 예: /sapi/v1/convert/tradeFlow
    fn path(&self) -> &str;

    /// 윈도우 1개의 최대 폭
    fn window_size(&self) -> Duration {
        Duration::days(90)
    }

    /// 호출 전 페이싱 지연
    fn pre_call_pause_ms(&self) -> u64 {
        250
    }

    /// 고정 파라미터 추가 (limit 등)
    fn constant_params(&self, _params: &mut Params) {}

    /// 응답 본문에서 행 배열 추출
    fn rows(&self, body: Value) -> Vec<Value>;

    /// 행 1건을 0..N개의 원장 upsert로 매핑
    async fn handle_row(
        &self,
        row: &Value,
        account_ref: &str,
        ledger: &LedgerRepository,
    ) -> Result<RowOutcome, IngestError>;
}

/// 시간 윈도우 페이저
///
/// [window_start, window_end) 반개구간을 현재 시각까지 전진시키며 수집합니다.
/// 빈 윈도우도 커서를 윈도우 경계 너머로 전진시켜 피드 공백에서 멈추지 않습니다.
pub struct TimeWindowIngest<'a, C, S: Sleeper> {
    client: &'a C,
    ckpt: &'a CheckpointRepository,
    ledger: &'a LedgerRepository,
    limiter: &'a RateLimitPolicy<S>,
    /// false면 재시도 소진 시 피드를 중단하고 오류 전파
    skip_failed_windows: bool,
}

impl<'a, C: SignedApiClient, S: Sleeper> TimeWindowIngest<'a, C, S> {
    pub fn new(
        client: &'a C,
        ckpt: &'a CheckpointRepository,
        ledger: &'a LedgerRepository,
        limiter: &'a RateLimitPolicy<S>,
        skip_failed_windows: bool,
    ) -> Self {
        Self {
            client,
            ckpt,
            ledger,
            limiter,
            skip_failed_windows,
        }
    }

    /// 체크포인트 이후의 데이터를 수집하고 삽입된 원장 행 수를 반환
    pub async fn ingest<F: TimeWindowFeed>(
        &self,
        feed: &F,
        account_ref: &str,
        since: Option<i64>,
    ) -> Result<u64, IngestError> {
        let seed = start_ms(self.ckpt, EXCHANGE, account_ref, feed.kind(), since).await?;
        let seed = seed.max(HISTORY_FLOOR_MS); // 피드 역사 시작 이전으로는 가지 않음
        let now = Utc::now().timestamp_millis();
        let window_ms = self.window_size_ms(feed);

        let mut inserted = 0u64;
        let mut window_start = seed;

        let mut page = 0;
        while page < MAX_PAGES && window_start <= now {
            page += 1;
            let window_end = now.min(window_start + window_ms - 1);

            let mut params: Params = Vec::new();
            param(&mut params, "startTime", window_start);
            param(&mut params, "endTime", window_end);
            feed.constant_params(&mut params);

            debug!(
                "'{}' 윈도우 수집 [{}, {}]",
                feed.kind(),
                window_start,
                window_end
            );

            let body = match self
                .limiter
                .execute(feed.pre_call_pause_ms(), || {
                    self.client.get(feed.path(), &params)
                })
                .await
            {
                Ok(body) => body,
                Err(e) => {
                    warn!(
                        "'{}' 윈도우 [{}, {}] 수집 실패: {}",
                        feed.kind(),
                        window_start,
                        window_end,
                        e
                    );
                    // 인증 오류는 건너뛰기 대상이 아니라 실행 중단 사유
                    if matches!(e, ApiError::Auth(_)) || !self.skip_failed_windows {
                        return Err(e.into());
                    }
                    // 명시적 손실 허용 정책: 완충 지연 후 해당 윈도우를 건너뜀
                    self.limiter
                        .after_error(e.retry_after(), FALLBACK_DELAY_MS)
                        .await;
                    window_start = window_end + 1;
                    continue;
                }
            };

            let rows = feed.rows(body);
            if rows.is_empty() {
                // 빈 윈도우도 커서는 전진
                window_start = window_end + 1;
                continue;
            }

            let mut max_ts = window_start;
            for row in &rows {
                let outcome = feed.handle_row(row, account_ref, self.ledger).await?;
                inserted += outcome.inserted;
                if outcome.event_ts_ms > 0 {
                    max_ts = max_ts.max(outcome.event_ts_ms);
                }
            }

            // 행이 모두 저장된 뒤에만, 그리고 전진한 경우에만 체크포인트 기록
            if max_ts > window_start {
                self.ckpt
                    .put(EXCHANGE, account_ref, feed.kind(), max_ts, None)
                    .await?;
            }
            window_start = max_ts.max(window_end) + 1;
        }

        Ok(inserted)
    }

    fn window_size_ms<F: TimeWindowFeed>(&self, feed: &F) -> i64 {
        feed.window_size().num_milliseconds().max(1)
    }
}
