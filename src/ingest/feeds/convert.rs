use chrono::Duration;
use serde_json::Value;

use super::{as_decimal, as_i64, text};
use crate::client::{param, Params};
use crate::db::models::{EntryType, NewLedgerEntry};
use crate::db::LedgerRepository;
use crate::ingest::row::RowOutcome;
use crate::ingest::time_window::TimeWindowFeed;
use crate::ingest::{IngestError, EXCHANGE};

/// 전환(Convert) 내역 피드
///
/// 전환 1건 = CONVERT_OUT/CONVERT_IN 다리 2개. 두 다리 모두 주문 id를
/// external_id에 포함하여 독립적으로 멱등합니다.
pub struct ConvertFeed;

impl TimeWindowFeed for ConvertFeed {
    fn kind(&self) -> &str {
        "convert"
    }

    fn path(&self) -> &str {
        "/sapi/v1/convert/tradeFlow"
    }

    // 이 엔드포인트의 최대 조회 구간은 45일
    fn window_size(&self) -> Duration {
        Duration::days(45)
    }

    fn pre_call_pause_ms(&self) -> u64 {
        2_000
    }

    fn constant_params(&self, params: &mut Params) {
        param(params, "limit", 1_000);
    }

    fn rows(&self, body: Value) -> Vec<Value> {
        body.get("rows")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    }

    async fn handle_row(
        &self,
        row: &Value,
        account_ref: &str,
        ledger: &LedgerRepository,
    ) -> Result<RowOutcome, IngestError> {
        let order_id = text(row, "orderId");
        let create_time = as_i64(row, "createTime");
        let from_asset = text(row, "fromAsset");
        let to_asset = text(row, "toAsset");
        let from_amount = as_decimal(row, "fromAmount");
        let to_amount = as_decimal(row, "toAmount");

        let mut inserted = 0u64;
        inserted += ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base: from_asset,
                quote: "N/A".to_string(),
                entry_type: EntryType::ConvertOut,
                quantity: from_amount,
                price: None,
                fee: None,
                fee_asset: None,
                ts_ms: create_time,
                external_id: format!("convert:out:{}", order_id),
            })
            .await?;
        inserted += ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base: to_asset,
                quote: "N/A".to_string(),
                entry_type: EntryType::ConvertIn,
                quantity: to_amount,
                price: None,
                fee: None,
                fee_asset: None,
                ts_ms: create_time,
                external_id: format!("convert:in:{}", order_id),
            })
            .await?;

        Ok(RowOutcome::many(inserted, create_time))
    }
}
