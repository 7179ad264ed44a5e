use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// 단조 증가 논스 카운터
///
/// 요청 서명에 쓰이는 타임스탬프가 같은 밀리초 안에서도 엄격히 증가하도록
/// 보장합니다. CAS 루프로 갱신하며 전역 상태 없이 클라이언트가 소유합니다.
#[derive(Debug)]
pub struct NonceCounter {
    last: AtomicI64,
}

impl NonceCounter {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// 다음 논스 값. max(현재 시각, 직전 값 + 1).
    pub fn next(&self) -> i64 {
        loop {
            let now = Utc::now().timestamp_millis();
            let prev = self.last.load(Ordering::SeqCst);
            let next = now.max(prev + 1);
            if self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }
}

impl Default for NonceCounter {
    fn default() -> Self {
        Self::new()
    }
}
