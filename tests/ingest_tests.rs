//! 수집 파이프라인 통합 테스트
//!
//! 고정 응답을 돌려주는 가짜 API 클라이언트와 인메모리 SQLite로
//! 페이저 → 행 핸들러 → 원장 → 체크포인트 전체 경로를 검증합니다.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use coinledger::balance::BalanceIngestService;
use coinledger::client::{ApiError, Params, SignedApiClient};
use coinledger::db::{create_tables, CheckpointRepository, LedgerRepository};
use coinledger::ingest::feeds::{DepositsFeed, DustFeed, TradeFeed};
use coinledger::ingest::{
    BackoffConfig, CompositeIngestService, IdCursorIngest, IngestError, RateLimitPolicy, Sleeper,
    TimeWindowIngest, EXCHANGE, HISTORY_FLOOR_MS,
};

const ACCOUNT: &str = "acct";

/// 대기하지 않는 테스트용 Sleeper
struct NoopSleeper;

impl Sleeper for NoopSleeper {
    async fn sleep_ms(&self, _ms: u64) {}
}

/// 경로별 고정 응답 큐를 돌려주는 가짜 클라이언트. 큐가 비면 빈 배열을 반환하고,
/// 모든 호출을 파라미터와 함께 기록합니다.
#[derive(Default)]
struct FakeClient {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
    calls: Mutex<Vec<(String, Params)>>,
}

impl FakeClient {
    fn push(&self, path: &str, response: Result<Value, ApiError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    fn calls_for(&self, path: &str) -> Vec<Params> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

impl SignedApiClient for &FakeClient {
    async fn get(&self, path: &str, params: &Params) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), params.clone()));
        match self
            .responses
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|q| q.pop_front())
        {
            Some(r) => r,
            None => Ok(Value::Array(Vec::new())),
        }
    }

    async fn post(&self, _path: &str, _params: &Params) -> Result<Value, ApiError> {
        Ok(Value::Null)
    }

    async fn get_public(&self, path: &str, params: &Params) -> Result<Value, ApiError> {
        self.get(path, params).await
    }
}

async fn test_pool() -> SqlitePool {
    // 인메모리 DB는 연결마다 분리되므로 연결 1개로 제한
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_tables(&pool).await.unwrap();
    pool
}

fn fast_policy() -> RateLimitPolicy<NoopSleeper> {
    RateLimitPolicy::with_sleeper(
        BackoffConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            multiplier: 1.0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        },
        NoopSleeper,
    )
}

fn param_value(params: &Params, key: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

fn trade_row(id: i64, time: i64, qty: &str, is_buyer: bool) -> Value {
    json!({
        "id": id,
        "time": time,
        "qty": qty,
        "price": "42000",
        "commission": "0.000001",
        "commissionAsset": "BTC",
        "isBuyer": is_buyer,
    })
}

/// 더스트 2건 → 다리 4개, 체크포인트는 최대 행 시각
#[tokio::test]
async fn test_dust_two_rows_make_four_legs() {
    let now = Utc::now().timestamp_millis();
    let (t1, t2) = (now - 120_000, now - 60_000);

    let fake = FakeClient::default();
    let payload = json!({
        "userAssetDribblets": [
            {
                "operateTime": t1,
                "userAssetDribbletDetails": [{
                    "transId": 101,
                    "fromAsset": "LTC",
                    "amount": "0.01",
                    "transferedAmount": "0.0021",
                    "serviceChargeAmount": "0.00004",
                }],
            },
            {
                "operateTime": t2,
                "userAssetDribbletDetails": [{
                    "transId": 102,
                    "fromAsset": "DOGE",
                    "amount": "12",
                    "transferedAmount": "0.0009",
                    "serviceChargeAmount": "0.00002",
                }],
            },
        ],
    });
    fake.push("/sapi/v1/asset/dribblet", Ok(payload.clone()));

    let pool = test_pool().await;
    let ckpt = CheckpointRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    let policy = fast_policy();
    let fc = &fake;
    let pager = TimeWindowIngest::new(&fc, &ckpt, &ledger, &policy, true);

    let inserted = pager
        .ingest(&DustFeed, ACCOUNT, Some(now - 3_600_000))
        .await
        .unwrap();

    assert_eq!(inserted, 4);
    assert_eq!(ledger.count(EXCHANGE, ACCOUNT).await.unwrap(), 4);
    assert_eq!(
        ckpt.get(EXCHANGE, ACCOUNT, "dust").await.unwrap(),
        Some(t2)
    );

    // 같은 응답 재수집은 멱등: 0건 삽입, 체크포인트 유지
    fake.push("/sapi/v1/asset/dribblet", Ok(payload));
    let rerun = pager
        .ingest(&DustFeed, ACCOUNT, Some(now - 3_600_000))
        .await
        .unwrap();
    assert_eq!(rerun, 0);
    assert_eq!(ledger.count(EXCHANGE, ACCOUNT).await.unwrap(), 4);
    assert_eq!(
        ckpt.get(EXCHANGE, ACCOUNT, "dust").await.unwrap(),
        Some(t2)
    );
}

/// 체결 id 10, 11 → 첫 실행 2건, 재실행 0건
#[tokio::test]
async fn test_trades_rerun_inserts_zero() {
    let t0 = 1_700_000_000_000i64;
    let page = json!([trade_row(10, t0, "0.002", true), trade_row(11, t0 + 1_000, "0.003", false)]);

    let fake = FakeClient::default();
    fake.push("/api/v3/myTrades", Ok(page.clone()));

    let pool = test_pool().await;
    let ckpt = CheckpointRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    let policy = fast_policy();
    let fc = &fake;
    let pager = IdCursorIngest::new(&fc, &ckpt, &ledger, &policy);
    let feed = TradeFeed::new("BTCUSDT", t0 - 1);

    assert_eq!(pager.ingest(&feed, ACCOUNT).await.unwrap(), 2);
    assert_eq!(
        ckpt.get(EXCHANGE, ACCOUNT, "trades:BTCUSDT").await.unwrap(),
        Some(t0 + 1_000)
    );

    fake.push("/api/v3/myTrades", Ok(page));
    assert_eq!(pager.ingest(&feed, ACCOUNT).await.unwrap(), 0);
    assert_eq!(ledger.count(EXCHANGE, ACCOUNT).await.unwrap(), 2);
}

/// 첫 페이지는 startTime만, 이후 페이지는 fromId만 싣는다
#[tokio::test]
async fn test_from_id_and_start_time_are_exclusive() {
    let t0 = 1_700_000_000_000i64;
    let full_page: Vec<Value> = (0..1_000)
        .map(|i| trade_row(i, t0 + i, "0.001", true))
        .collect();

    let fake = FakeClient::default();
    fake.push("/api/v3/myTrades", Ok(Value::Array(full_page)));
    fake.push(
        "/api/v3/myTrades",
        Ok(json!([trade_row(1_000, t0 + 1_000, "0.001", true)])),
    );

    let pool = test_pool().await;
    let ckpt = CheckpointRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    let policy = fast_policy();
    let fc = &fake;
    let pager = IdCursorIngest::new(&fc, &ckpt, &ledger, &policy);
    let feed = TradeFeed::new("BTCUSDT", t0);

    assert_eq!(pager.ingest(&feed, ACCOUNT).await.unwrap(), 1_001);

    let calls = fake.calls_for("/api/v3/myTrades");
    assert_eq!(calls.len(), 2);
    assert_eq!(param_value(&calls[0], "startTime"), Some(t0.to_string()));
    assert_eq!(param_value(&calls[0], "fromId"), None);
    // 다음 페이지 fromId = 직전 최대 id + 1
    assert_eq!(param_value(&calls[1], "fromId"), Some("1000".to_string()));
    assert_eq!(param_value(&calls[1], "startTime"), None);
}

/// 오류 없는 실행에서 발급된 윈도우들은 [floor, now)를 빈틈없이 타일링한다
#[tokio::test]
async fn test_window_coverage_without_gaps() {
    let fake = FakeClient::default(); // 모든 호출이 빈 배열
    let pool = test_pool().await;
    let ckpt = CheckpointRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    let policy = fast_policy();
    let fc = &fake;
    let pager = TimeWindowIngest::new(&fc, &ckpt, &ledger, &policy, true);

    let now_before = Utc::now().timestamp_millis();
    assert_eq!(pager.ingest(&DepositsFeed, ACCOUNT, None).await.unwrap(), 0);

    let calls = fake.calls_for("/sapi/v1/capital/deposit/hisrec");
    assert!(!calls.is_empty());

    let window_ms = 90 * 24 * 3_600 * 1_000i64;
    let mut expected_start = HISTORY_FLOOR_MS;
    for params in &calls {
        let start: i64 = param_value(params, "startTime").unwrap().parse().unwrap();
        let end: i64 = param_value(params, "endTime").unwrap().parse().unwrap();
        assert_eq!(start, expected_start);
        assert!(end >= start);
        assert!(end - start < window_ms);
        expected_start = end + 1;
    }
    assert!(expected_start > now_before);
}

/// 체크포인트보다 오래된 행은 커서를 되돌리지 않는다
#[tokio::test]
async fn test_stale_rows_do_not_regress_checkpoint() {
    let now = Utc::now().timestamp_millis();
    let cursor = now - 60_000;

    let pool = test_pool().await;
    let ckpt = CheckpointRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    ckpt.put(EXCHANGE, ACCOUNT, "deposits", cursor, None)
        .await
        .unwrap();

    let fake = FakeClient::default();
    fake.push(
        "/sapi/v1/capital/deposit/hisrec",
        Ok(json!([{
            "coin": "BTC",
            "amount": "0.1",
            "insertTime": cursor - 500_000,
            "txId": "late-arrival",
        }])),
    );

    let policy = fast_policy();
    let fc = &fake;
    let pager = TimeWindowIngest::new(&fc, &ckpt, &ledger, &policy, true);

    let inserted = pager.ingest(&DepositsFeed, ACCOUNT, None).await.unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(
        ckpt.get(EXCHANGE, ACCOUNT, "deposits").await.unwrap(),
        Some(cursor)
    );
}

/// 피드 하나의 실패는 0으로 보고되고 나머지 피드는 계속 수집된다
#[tokio::test]
async fn test_feed_failure_is_isolated() {
    let now = Utc::now().timestamp_millis();
    let fake = FakeClient::default();
    fake.push(
        "/sapi/v1/convert/tradeFlow",
        Err(ApiError::Api {
            code: -1100,
            msg: "illegal parameter".to_string(),
        }),
    );
    fake.push(
        "/sapi/v1/capital/deposit/hisrec",
        Ok(json!([{
            "coin": "ETH",
            "amount": "1.0",
            "insertTime": now - 60_000,
            "txId": "0xabc",
        }])),
    );

    let pool = test_pool().await;
    let fc = &fake;
    // skip_failed_windows=false: 수집 불가 윈도우는 피드 실패로 전파되고
    // 오케스트레이터가 격리한다
    let svc = CompositeIngestService::with_limiter(fc, pool.clone(), fast_policy(), false);

    let report = svc.ingest_all(ACCOUNT, Some(now - 3_600_000)).await.unwrap();
    assert_eq!(report.converts, 0);
    assert_eq!(report.deposits, 1);
}

/// 인증 오류는 격리되지 않고 실행 전체를 중단한다
#[tokio::test]
async fn test_auth_error_aborts_run() {
    let now = Utc::now().timestamp_millis();
    let fake = FakeClient::default();
    fake.push(
        "/sapi/v1/capital/deposit/hisrec",
        Err(ApiError::Auth("invalid signature".to_string())),
    );

    let pool = test_pool().await;
    let fc = &fake;
    let svc = CompositeIngestService::with_limiter(fc, pool.clone(), fast_policy(), true);

    let result = svc.ingest_all(ACCOUNT, Some(now - 3_600_000)).await;
    assert!(matches!(
        result,
        Err(IngestError::Api(ApiError::Auth(_)))
    ));
}

/// 잔고 스냅샷의 자산이 체결 수집 대상 심볼이 된다
#[tokio::test]
async fn test_snapshot_assets_drive_trade_symbols() {
    let t0 = 1_700_000_000_000i64;
    let fake = FakeClient::default();
    fake.push(
        "/api/v3/account",
        Ok(json!({
            "balances": [
                { "asset": "BTC", "free": "0.5", "locked": "0" },
                { "asset": "USDT", "free": "100", "locked": "0" },
            ],
        })),
    );
    fake.push("/api/v3/myTrades", Ok(json!([trade_row(7, t0, "0.002", true)])));

    let pool = test_pool().await;
    let fc = &fake;

    let balances = BalanceIngestService::new(&fc, pool.clone());
    assert_eq!(balances.ingest(ACCOUNT).await.unwrap(), 2);

    let svc = CompositeIngestService::with_limiter(fc, pool.clone(), fast_policy(), true);
    assert_eq!(svc.ingest_trades(ACCOUNT, Some(t0 - 1)).await.unwrap(), 1);

    // USDT는 결제 통화라 마켓이 없고, BTC만 BTCUSDT로 조회된다
    let calls = fake.calls_for("/api/v3/myTrades");
    assert_eq!(calls.len(), 1);
    assert_eq!(param_value(&calls[0], "symbol"), Some("BTCUSDT".to_string()));
}
