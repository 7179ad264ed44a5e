//! 잔고 대사 엔진
//!
//! 원장으로부터 재구성한 자산별 잔고(ledger-implied)를 거래소가 보고한 최신
//! 스냅샷과 비교합니다. delta가 0이 아니면 수집 누락이나 중복을 의미합니다.
//!
//! 자산별 계산:
//!   netQty  = Σ ±quantity  (BUY/DEPOSIT/CONVERT_IN/REWARD는 +, SELL/WITHDRAW/CONVERT_OUT은 −)
//!   feeTotal = Σ fee       (fee_asset 기준 집계)
//!   implied = netQty − feeTotal
//!   delta   = snapshot(free+locked) − implied

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::db::models::EntryType;
use crate::db::{LedgerRepository, SnapshotRepository};

/// 자산 하나의 대사 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileLine {
    pub asset: String,
    pub net_qty: Decimal,
    pub fee_total: Decimal,
    pub implied: Decimal,
    pub snapshot: Decimal,
    pub delta: Decimal,
}

/// 대사 결과 합계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileTotals {
    pub snapshot_total: Decimal,
    pub implied_total: Decimal,
    pub abs_delta_total: Decimal,
}

/// 대사 라인 정렬 기준
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileSort {
    /// |delta| 내림차순, 동률이면 자산명 오름차순
    DeltaDesc,
    /// 자산명 오름차순
    AssetAsc,
}

/// 대사 오류
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("DB 오류: {0}")]
    Db(#[from] sqlx::Error),
    #[error("수량 파싱 실패: '{0}'")]
    BadAmount(String),
}

/// 잔고 대사 서비스
pub struct ReconcileService {
    ledger: LedgerRepository,
    snapshots: SnapshotRepository,
}

impl ReconcileService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            ledger: LedgerRepository::new(pool.clone()),
            snapshots: SnapshotRepository::new(pool),
        }
    }

    /// (거래소, 계정)의 자산별 대사 라인 계산
    ///
    /// 원장 활동, 수수료, 스냅샷 중 하나라도 있는 자산마다 라인을 만들고
    /// 없는 값은 0으로 채웁니다. |delta| < min_abs_delta인 라인은 제외합니다.
    pub async fn lines(
        &self,
        exchange: &str,
        account_ref: &str,
        min_abs_delta: Decimal,
        sort: ReconcileSort,
    ) -> Result<Vec<ReconcileLine>, ReconcileError> {
        let mut net_qty: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut fee_total: BTreeMap<String, Decimal> = BTreeMap::new();

        // 정밀도 손실 없이 집계하기 위해 SQL SUM 대신 Decimal로 합산
        for entry in self.ledger.entries_for(exchange, account_ref).await? {
            let qty = parse_amount(&entry.quantity)?;
            let sign = EntryType::sign(&entry.entry_type);
            if sign != 0 {
                let slot = net_qty.entry(entry.base.clone()).or_default();
                *slot += qty * Decimal::from(sign);
            }
            if let (Some(fee), Some(fee_asset)) = (&entry.fee, &entry.fee_asset) {
                let fee = parse_amount(fee)?;
                *fee_total.entry(fee_asset.clone()).or_default() += fee;
            }
        }

        let mut snapshot: BTreeMap<String, Decimal> = BTreeMap::new();
        for rec in self.snapshots.latest(Some(exchange), account_ref).await? {
            let total = parse_amount(&rec.free_amt)? + parse_amount(&rec.locked_amt)?;
            snapshot.insert(rec.asset, total);
        }

        // 자산 합집합: 원장 활동 ∪ 수수료 ∪ 스냅샷 (수수료만 있는 자산도 포함)
        let mut assets: Vec<String> = net_qty
            .keys()
            .chain(fee_total.keys())
            .chain(snapshot.keys())
            .cloned()
            .collect();
        assets.sort();
        assets.dedup();

        let mut lines: Vec<ReconcileLine> = assets
            .into_iter()
            .map(|asset| {
                let net = net_qty.get(&asset).copied().unwrap_or_default();
                let fee = fee_total.get(&asset).copied().unwrap_or_default();
                let snap = snapshot.get(&asset).copied().unwrap_or_default();
                let implied = net - fee;
                ReconcileLine {
                    delta: snap - implied,
                    asset,
                    net_qty: net,
                    fee_total: fee,
                    implied,
                    snapshot: snap,
                }
            })
            .filter(|l| l.delta.abs() >= min_abs_delta)
            .collect();

        match sort {
            ReconcileSort::AssetAsc => lines.sort_by(|a, b| a.asset.cmp(&b.asset)),
            ReconcileSort::DeltaDesc => lines.sort_by(|a, b| {
                b.delta
                    .abs()
                    .cmp(&a.delta.abs())
                    .then_with(|| a.asset.cmp(&b.asset))
            }),
        }

        Ok(lines)
    }

    /// 라인 집합의 합계 계산
    pub fn totals(lines: &[ReconcileLine]) -> ReconcileTotals {
        let mut totals = ReconcileTotals {
            snapshot_total: Decimal::ZERO,
            implied_total: Decimal::ZERO,
            abs_delta_total: Decimal::ZERO,
        };
        for l in lines {
            totals.snapshot_total += l.snapshot;
            totals.implied_total += l.implied;
            totals.abs_delta_total += l.delta.abs();
        }
        totals
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, ReconcileError> {
    raw.parse()
        .map_err(|_| ReconcileError::BadAmount(raw.to_string()))
}
