//! 피드별 행 핸들러
//!
//! 업스트림 API 행 1건을 0..N개의 원장 항목으로 매핑합니다. 다리(leg)가 여러 개인
//! 이벤트(전환, 소액 정리)는 공유 주문 id를 external_id에 포함한 독립 항목 2개로
//! 저장되어 각 다리가 개별적으로 멱등합니다.

pub mod convert;
pub mod deposits;
pub mod dust;
pub mod rewards;
pub mod trades;
pub mod withdrawals;

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

pub use convert::ConvertFeed;
pub use deposits::DepositsFeed;
pub use dust::DustFeed;
pub use rewards::RewardsFeed;
pub use trades::TradeFeed;
pub use withdrawals::WithdrawalsFeed;

/// 문자열 필드 (없으면 빈 문자열, 숫자는 문자열화)
pub(crate) fn text(row: &Value, key: &str) -> String {
    match row.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}

/// 정수 필드 (숫자 또는 숫자 문자열, 없으면 0)
pub(crate) fn as_i64(row: &Value, key: &str) -> i64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// 수량 필드 (숫자 또는 숫자 문자열, 없으면 0)
pub(crate) fn as_decimal(row: &Value, key: &str) -> Decimal {
    match row.get(key) {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).unwrap_or_default(),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// 불리언 필드
pub(crate) fn as_bool(row: &Value, key: &str) -> bool {
    row.get(key).and_then(Value::as_bool).unwrap_or(false)
}
