use log::info;
use rust_decimal::Decimal;

use coinledger::balance::BalanceIngestService;
use coinledger::client::BinanceSignedClient;
use coinledger::config::Config;
use coinledger::db::init_database;
use coinledger::ingest::{CompositeIngestService, RateLimitPolicy, EXCHANGE};
use coinledger::reconcile::{ReconcileService, ReconcileSort};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 로깅 초기화
    env_logger::init();

    println!("거래소 원장 수집 시스템 시작");

    // 설정 로드
    let config = Config::from_env();
    info!("계정: {} / API: {}", config.account_ref, config.api_base);

    // 데이터베이스 초기화
    let pool = init_database(&config.database_url).await?;

    // 서명 클라이언트 생성
    let client = BinanceSignedClient::new(&config.api_base, &config.api_key, &config.api_secret);

    // 1. 잔고 스냅샷 수집 (체결 수집의 심볼 목록으로도 쓰임)
    let balances = BalanceIngestService::new(&client, pool.clone());
    let snapshot_count = balances.ingest(&config.account_ref).await?;
    println!("잔고 스냅샷: {}개 자산", snapshot_count);

    // 2. 전체 피드 수집
    let ingest = CompositeIngestService::with_limiter(
        client,
        pool.clone(),
        RateLimitPolicy::new(),
        config.skip_failed_windows,
    );
    let report = ingest.ingest_all(&config.account_ref, None).await?;

    println!("수집 결과: 총 {}건", report.total());
    println!("  체결:   {}", report.trades);
    println!("  입금:   {}", report.deposits);
    println!("  출금:   {}", report.withdrawals);
    println!("  전환:   {}", report.converts);
    println!("  더스트: {}", report.dust);
    println!("  리워드: {}", report.rewards);

    // 3. 잔고 대사
    let reconciler = ReconcileService::new(pool);
    let lines = reconciler
        .lines(
            EXCHANGE,
            &config.account_ref,
            Decimal::ZERO,
            ReconcileSort::DeltaDesc,
        )
        .await?;
    let totals = ReconcileService::totals(&lines);

    println!("\n잔고 대사 ({}개 자산):", lines.len());
    for line in &lines {
        println!(
            "  {:<8} 원장기준 {} / 스냅샷 {} / 차이 {}",
            line.asset, line.implied, line.snapshot, line.delta
        );
    }
    println!(
        "합계: 스냅샷 {} / 원장기준 {} / |차이| {}",
        totals.snapshot_total, totals.implied_total, totals.abs_delta_total
    );

    Ok(())
}
