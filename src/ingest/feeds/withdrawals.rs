use chrono::{NaiveDateTime, Utc};
use serde_json::Value;

use super::{as_decimal, text};
use crate::client::{param, Params};
use crate::db::models::{EntryType, NewLedgerEntry};
use crate::db::LedgerRepository;
use crate::ingest::row::RowOutcome;
use crate::ingest::time_window::TimeWindowFeed;
use crate::ingest::{IngestError, EXCHANGE};

/// 출금 내역 피드 (응답이 최상위 배열)
pub struct WithdrawalsFeed;

impl TimeWindowFeed for WithdrawalsFeed {
    fn kind(&self) -> &str {
        "withdrawals"
    }

    fn path(&self) -> &str {
        "/sapi/v1/capital/withdraw/history"
    }

    fn constant_params(&self, params: &mut Params) {
        param(params, "limit", 1_000);
    }

    fn rows(&self, body: Value) -> Vec<Value> {
        body.as_array().cloned().unwrap_or_default()
    }

    async fn handle_row(
        &self,
        row: &Value,
        account_ref: &str,
        ledger: &LedgerRepository,
    ) -> Result<RowOutcome, IngestError> {
        let id = text(row, "id");
        let coin = text(row, "coin");
        let amount = as_decimal(row, "amount");
        let fee = as_decimal(row, "transactionFee");
        let apply_time = parse_apply_time(&text(row, "applyTime"));

        let inserted = ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base: coin.clone(),
                quote: "N/A".to_string(),
                entry_type: EntryType::Withdraw,
                quantity: amount,
                price: None,
                fee: Some(fee),
                fee_asset: Some(coin),
                ts_ms: apply_time,
                external_id: format!("withdraw:{}", id),
            })
            .await?;

        Ok(RowOutcome::many(inserted, apply_time))
    }
}

/// applyTime 파싱: "yyyy-MM-dd HH:mm:ss"(UTC) 또는 epoch millis, 실패 시 현재 시각
fn parse_apply_time(s: &str) -> i64 {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return dt.and_utc().timestamp_millis();
    }
    if let Ok(ms) = s.parse::<i64>() {
        return ms;
    }
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_form() {
        assert_eq!(parse_apply_time("2023-11-14 22:13:20"), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_epoch_millis_form() {
        assert_eq!(parse_apply_time("1700000000000"), 1_700_000_000_000);
    }

    #[test]
    fn test_fallback_to_now() {
        let before = Utc::now().timestamp_millis();
        let parsed = parse_apply_time("garbage");
        assert!(parsed >= before);
    }
}
