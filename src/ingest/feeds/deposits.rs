use rust_decimal::Decimal;
use serde_json::Value;

use super::{as_decimal, as_i64, text};
use crate::client::{param, Params};
use crate::db::models::{EntryType, NewLedgerEntry};
use crate::db::LedgerRepository;
use crate::ingest::row::RowOutcome;
use crate::ingest::time_window::TimeWindowFeed;
use crate::ingest::{IngestError, EXCHANGE};

/// 입금 내역 피드 (응답이 최상위 배열)
pub struct DepositsFeed;

impl TimeWindowFeed for DepositsFeed {
    fn kind(&self) -> &str {
        "deposits"
    }

    fn path(&self) -> &str {
        "/sapi/v1/capital/deposit/hisrec"
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
        let coin = text(row, "coin");
        let amount = as_decimal(row, "amount");
        let insert_time = as_i64(row, "insertTime");
        let tx_id = text(row, "txId");

        let inserted = ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base: coin.clone(),
                quote: "N/A".to_string(),
                entry_type: EntryType::Deposit,
                quantity: amount,
                price: None,
                fee: Some(Decimal::ZERO),
                fee_asset: Some(coin.clone()),
                ts_ms: insert_time,
                external_id: format!("deposit:{}:{}:{}", coin, tx_id, insert_time),
            })
            .await?;

        Ok(RowOutcome::many(inserted, insert_time))
    }
}
