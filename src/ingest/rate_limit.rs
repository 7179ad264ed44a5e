use std::future::Future;

use chrono::{DateTime, Utc};
use log::warn;
use rand::Rng;

use crate::client::ApiError;

/// 대기 추상화
///
/// 테스트에서 실제 시계 대기 없이 백오프 로직을 검증할 수 있도록 분리합니다.
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep_ms(&self, ms: u64);
}

/// tokio 타이머 기반 기본 구현
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

/// 백오프 설정
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 1_000, // 1초에서 시작
            max_backoff_ms: 15_000,    // 최대 15초
            multiplier: 1.8,
            jitter_min_ms: 250,
            jitter_max_ms: 750,
        }
    }
}

/// 요청 페이싱 및 429 백오프 정책
///
/// 모든 요청 전에 설정된 사전 지연을 적용하고, 한도 초과/네트워크 오류 시
/// Retry-After를 반영한 지수 백오프로 동일 요청을 재시도합니다.
pub struct RateLimitPolicy<S: Sleeper = TokioSleeper> {
    config: BackoffConfig,
    sleeper: S,
}

impl RateLimitPolicy<TokioSleeper> {
    pub fn new() -> Self {
        Self {
            config: BackoffConfig::default(),
            sleeper: TokioSleeper,
        }
    }
}

impl Default for RateLimitPolicy<TokioSleeper> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sleeper> RateLimitPolicy<S> {
    pub fn with_sleeper(config: BackoffConfig, sleeper: S) -> Self {
        Self { config, sleeper }
    }

    /// 요청 전 페이싱 지연
    pub async fn before_call(&self, pause_ms: u64) {
        if pause_ms > 0 {
            self.sleeper.sleep_ms(pause_ms).await;
        }
    }

    /// 재시도 소진 후 윈도우를 건너뛰기 전의 완충 지연
    pub async fn after_error(&self, retry_after: Option<&str>, fallback_ms: u64) {
        let mut sleep_ms = fallback_ms;
        if let Some(ra) = retry_after.and_then(parse_retry_after) {
            sleep_ms = sleep_ms.max(ra);
        }
        self.sleeper.sleep_ms(sleep_ms).await;
    }

    fn jitter_ms(&self) -> u64 {
        if self.config.jitter_max_ms <= self.config.jitter_min_ms {
            return self.config.jitter_min_ms;
        }
        rand::thread_rng().gen_range(self.config.jitter_min_ms..self.config.jitter_max_ms)
    }

    /// 사전 지연 후 호출을 실행하고, 재시도 가능한 오류는 백오프와 함께
    /// 동일 요청을 최대 max_retries회 재시도합니다. 소진 시 오류를 전파합니다.
    pub async fn execute<T, F, Fut>(&self, pause_ms: u64, op: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.before_call(pause_ms).await;

        let mut backoff_ms = self.config.initial_backoff_ms;
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let mut sleep_ms = backoff_ms + self.jitter_ms();
                    if let Some(ra) = e.retry_after().and_then(parse_retry_after) {
                        sleep_ms = sleep_ms.max(ra);
                    }
                    warn!(
                        "재시도 {}/{} ({}ms 대기): {}",
                        attempt + 1,
                        self.config.max_retries,
                        sleep_ms,
                        e
                    );
                    self.sleeper.sleep_ms(sleep_ms).await;
                    backoff_ms = ((backoff_ms as f64 * self.config.multiplier) as u64)
                        .min(self.config.max_backoff_ms);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Retry-After 값 파싱 (초 단위 숫자 또는 HTTP-date) → 밀리초
pub fn parse_retry_after(v: &str) -> Option<u64> {
    let v = v.trim();
    if v.is_empty() {
        return None;
    }
    if let Ok(secs) = v.parse::<u64>() {
        return Some(secs * 1_000);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(v) {
        let delta = dt.timestamp_millis() - Utc::now().timestamp_millis();
        return Some(delta.max(0) as u64);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// 대기 시간을 기록만 하는 테스트용 Sleeper
    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<u64>>,
    }

    impl Sleeper for &RecordingSleeper {
        async fn sleep_ms(&self, ms: u64) {
            self.slept.lock().unwrap().push(ms);
        }
    }

    fn test_policy(sleeper: &RecordingSleeper) -> RateLimitPolicy<&RecordingSleeper> {
        RateLimitPolicy::with_sleeper(
            BackoffConfig {
                max_retries: 3,
                initial_backoff_ms: 100,
                max_backoff_ms: 400,
                multiplier: 2.0,
                jitter_min_ms: 0,
                jitter_max_ms: 0,
            },
            sleeper,
        )
    }

    #[tokio::test]
    async fn test_retry_rate_limited_then_succeed() {
        let sleeper = RecordingSleeper::default();
        let policy = test_policy(&sleeper);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(0, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::RateLimited { retry_after: None })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 지수 백오프: 100ms, 200ms
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![100, 200]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_propagate() {
        let sleeper = RecordingSleeper::default();
        let policy = test_policy(&sleeper);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute(0, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::RateLimited { retry_after: None }) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::RateLimited { .. })));
        // 최초 1회 + 재시도 3회
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 백오프 상한 적용: 100, 200, 400
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![100, 200, 400]);
    }

    #[tokio::test]
    async fn test_retry_after_overrides_backoff() {
        let sleeper = RecordingSleeper::default();
        let policy = test_policy(&sleeper);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(0, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ApiError::RateLimited {
                            retry_after: Some("2".to_string()),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        // Retry-After 2초가 백오프 100ms보다 크므로 우선
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![2_000]);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let sleeper = RecordingSleeper::default();
        let policy = test_policy(&sleeper);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute(0, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::InvalidSymbol("BADUSDT".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::InvalidSymbol(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("7"), Some(7_000));
        assert_eq!(parse_retry_after(" 0 "), Some(0));
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("not-a-date"), None);
    }

    #[test]
    fn test_parse_retry_after_http_date_clamps() {
        // 과거 날짜는 0으로 수렴해야 함
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), Some(0));
    }
}
