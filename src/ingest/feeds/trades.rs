use serde_json::Value;

use super::{as_bool, as_decimal, as_i64, text};
use crate::db::models::{EntryType, NewLedgerEntry};
use crate::db::LedgerRepository;
use crate::ingest::id_cursor::IdCursorFeed;
use crate::ingest::row::RowOutcome;
use crate::ingest::symbol::split_symbol;
use crate::ingest::{IngestError, EXCHANGE};

/// 심볼별 체결 내역 피드 (id 커서 기반)
pub struct TradeFeed {
    symbol: String,
    seed_start_ms: i64,
}

impl TradeFeed {
    pub fn new(symbol: &str, seed_start_ms: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            seed_start_ms,
        }
    }
}

impl IdCursorFeed for TradeFeed {
    fn kind(&self) -> String {
        format!("trades:{}", self.symbol)
    }

    fn path(&self) -> &str {
        "/api/v3/myTrades"
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn seed_start_ms(&self) -> i64 {
        self.seed_start_ms
    }

    fn extract_id(&self, row: &Value) -> Option<i64> {
        row.get("id").and_then(Value::as_i64)
    }

    async fn handle_row(
        &self,
        row: &Value,
        account_ref: &str,
        ledger: &LedgerRepository,
    ) -> Result<RowOutcome, IngestError> {
        let id = as_i64(row, "id");
        let time = as_i64(row, "time");
        let qty = as_decimal(row, "qty");
        let price = as_decimal(row, "price");
        let commission = as_decimal(row, "commission");
        let commission_asset = text(row, "commissionAsset");
        let is_buyer = as_bool(row, "isBuyer");

        let (base, quote) = split_symbol(&self.symbol);

        let inserted = ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base,
                quote,
                entry_type: if is_buyer {
                    EntryType::Buy
                } else {
                    EntryType::Sell
                },
                quantity: qty,
                price: Some(price),
                fee: Some(commission),
                fee_asset: if commission_asset.is_empty() {
                    None
                } else {
                    Some(commission_asset)
                },
                ts_ms: time,
                external_id: format!("trade:{}:{}", self.symbol, id),
            })
            .await?;

        Ok(RowOutcome::many(inserted, time))
    }
}
