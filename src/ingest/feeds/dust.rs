use serde_json::Value;

use super::{as_decimal, as_i64, text};
use crate::db::models::{EntryType, NewLedgerEntry};
use crate::db::LedgerRepository;
use crate::ingest::row::RowOutcome;
use crate::ingest::time_window::TimeWindowFeed;
use crate::ingest::{IngestError, EXCHANGE};

/// 소액 자산 정리(dust sweep) 피드
///
/// 응답은 정리 묶음(userAssetDribblets) 아래 상세 항목이 중첩된 구조라
/// rows()에서 상세 항목을 평탄화하며 묶음의 operateTime을 주입합니다.
/// 상세 1건 = OUT(원자산) + IN(BNB, 수수료 BNB) 다리 2개.
pub struct DustFeed;

impl TimeWindowFeed for DustFeed {
    fn kind(&self) -> &str {
        "dust"
    }

    fn path(&self) -> &str {
        "/sapi/v1/asset/dribblet"
    }

    fn rows(&self, body: Value) -> Vec<Value> {
        let mut out = Vec::new();
        let dribblets = match body.get("userAssetDribblets").and_then(|v| v.as_array()) {
            Some(list) => list,
            None => return out,
        };
        for dribblet in dribblets {
            let operate_time = dribblet.get("operateTime").cloned().unwrap_or(Value::Null);
            let details = match dribblet
                .get("userAssetDribbletDetails")
                .and_then(|v| v.as_array())
            {
                Some(list) => list,
                None => continue,
            };
            for detail in details {
                let mut row = detail.clone();
                if let Some(obj) = row.as_object_mut() {
                    obj.insert("operateTime".to_string(), operate_time.clone());
                }
                out.push(row);
            }
        }
        out
    }

    async fn handle_row(
        &self,
        row: &Value,
        account_ref: &str,
        ledger: &LedgerRepository,
    ) -> Result<RowOutcome, IngestError> {
        let trans_id = text(row, "transId");
        let from_asset = text(row, "fromAsset");
        let amount = as_decimal(row, "amount");
        // Binance 오탈자 그대로: "transferedAmount"
        let bnb_received = as_decimal(row, "transferedAmount");
        let bnb_fee = as_decimal(row, "serviceChargeAmount");
        let operate_time = as_i64(row, "operateTime");

        let mut inserted = 0u64;
        // OUT: 원자산 감소
        inserted += ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base: from_asset.clone(),
                quote: "N/A".to_string(),
                entry_type: EntryType::ConvertOut,
                quantity: amount,
                price: None,
                fee: None,
                fee_asset: None,
                ts_ms: operate_time,
                external_id: format!("dust:out:{}:{}", from_asset, trans_id),
            })
            .await?;
        // IN: BNB 증가, 수수료는 BNB
        inserted += ledger
            .upsert(&NewLedgerEntry {
                exchange: EXCHANGE.to_string(),
                account_ref: account_ref.to_string(),
                base: "BNB".to_string(),
                quote: "N/A".to_string(),
                entry_type: EntryType::ConvertIn,
                quantity: bnb_received,
                price: None,
                fee: Some(bnb_fee),
                fee_asset: Some("BNB".to_string()),
                ts_ms: operate_time,
                external_id: format!("dust:in:BNB:{}", trans_id),
            })
            .await?;

        Ok(RowOutcome::many(inserted, operate_time))
    }
}
