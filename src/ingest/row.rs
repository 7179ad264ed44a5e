/// 업스트림 행 1건 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowOutcome {
    /// 실제 삽입된 원장 행 수 (중복은 0)
    pub inserted: u64,
    /// 체크포인트 계산에 쓰이는 이벤트 시각 (epoch millis, 0이면 무시)
    pub event_ts_ms: i64,
}

impl RowOutcome {
    /// 삽입 없음 (중복 등)
    pub fn skip(event_ts_ms: i64) -> Self {
        Self {
            inserted: 0,
            event_ts_ms,
        }
    }

    /// 1행 삽입
    pub fn one(event_ts_ms: i64) -> Self {
        Self {
            inserted: 1,
            event_ts_ms,
        }
    }

    /// n행 삽입
    pub fn many(inserted: u64, event_ts_ms: i64) -> Self {
        Self {
            inserted,
            event_ts_ms,
        }
    }
}
