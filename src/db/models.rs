use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 원장 이벤트 타입
///
/// 수량은 항상 양의 크기로 저장하며 방향은 타입으로만 구분합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    Buy,
    Sell,
    Deposit,
    Withdraw,
    ConvertIn,
    ConvertOut,
    Reward,
    Fee,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Buy => "BUY",
            EntryType::Sell => "SELL",
            EntryType::Deposit => "DEPOSIT",
            EntryType::Withdraw => "WITHDRAW",
            EntryType::ConvertIn => "CONVERT_IN",
            EntryType::ConvertOut => "CONVERT_OUT",
            EntryType::Reward => "REWARD",
            EntryType::Fee => "FEE",
        }
    }

    /// 대사 시 부호: 유입 +1, 유출 -1, 그 외 0
    pub fn sign(type_str: &str) -> i32 {
        match type_str {
            "BUY" | "DEPOSIT" | "CONVERT_IN" | "REWARD" => 1,
            "SELL" | "WITHDRAW" | "CONVERT_OUT" => -1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 새 원장 항목 (upsert 입력)
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub exchange: String,
    pub account_ref: String,
    pub base: String,
    pub quote: String,
    pub entry_type: EntryType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub fee_asset: Option<String>,
    pub ts_ms: i64,
    /// 업스트림 이벤트를 유일하게 지칭하는 멱등성 키
    pub external_id: String,
}

/// 원장 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerRecord {
    pub id: Option<i64>,
    pub exchange: String,
    pub account_ref: String,
    pub base: String,
    pub quote: String,
    #[sqlx(rename = "type")]
    pub entry_type: String,
    pub quantity: String,
    pub price: Option<String>,
    pub fee: Option<String>,
    pub fee_asset: Option<String>,
    pub ts: i64,
    pub external_id: String,
}

/// 체크포인트 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckpointRecord {
    pub exchange: String,
    pub account_ref: String,
    pub kind: String,
    pub cursor_ts: i64,
    pub cursor_str: Option<String>,
}

/// 잔고 스냅샷 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotRecord {
    pub exchange: String,
    pub account_ref: String,
    pub asset: String,
    pub free_amt: String,
    pub locked_amt: String,
    pub as_of: i64,
}
