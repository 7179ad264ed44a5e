use rust_decimal::Decimal;
use serde_json::Value;

use super::{as_decimal, as_i64, text};
use crate::client::{param, Params};
use crate::db::models::{EntryType, NewLedgerEntry};
use crate::db::LedgerRepository;
use crate::ingest::row::RowOutcome;
use crate::ingest::time_window::TimeWindowFeed;
use crate::ingest::{IngestError, EXCHANGE};

/// 배당/리워드 피드
pub struct RewardsFeed;

impl TimeWindowFeed for RewardsFeed {
    fn kind(&self) -> &str {
        "rewards"
    }

    fn path(&self) -> &str {
        "/sapi/v1/asset/assetDividend"
    }

    fn constant_params(&self, params: &mut Params) {
        param(params, "limit", 500);
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
        let asset = text(row, "asset");
        let amount = as_decimal(row, "amount");
        let div_time = as_i64(row, "divTime");

        // 식별자 우선순위: tranId > id > asset:divTime
        let id = match (text(row, "tranId"), text(row, "id")) {
            (tran_id, _) if !tran_id.is_empty() => tran_id,
            (_, id) if !id.is_empty() => id,
            _ => format!("{}:{}", asset, div_time),
        };

        let inserted = ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base: asset.clone(),
                quote: "N/A".to_string(),
                entry_type: EntryType::Reward,
                quantity: amount,
                price: None,
                fee: Some(Decimal::ZERO),
                fee_asset: None,
                ts_ms: div_time,
                external_id: format!("reward:{}:{}", asset, id),
            })
            .await?;

        Ok(RowOutcome::many(inserted, div_time))
    }
}
