//! End-to-end runs through the library with a simulated provider.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use promobatch::adapters::simulated::{ManualClock, SimulatedPayments};
use promobatch::campaign::{CampaignSpec, Discount, DurationPolicy, TargetRestriction};
use promobatch::commands::generate::execute;
use promobatch::config::{CodeMode, Provider, RunConfig};
use promobatch::context::ServiceContext;
use promobatch::issuer::RetryPolicy;
use promobatch::scheduler::ScheduleConfig;
use promobatch::sink::SinkConfig;
use tokio_util::sync::CancellationToken;

fn config(dir: &Path, total: u64, capacity: u64) -> RunConfig {
    RunConfig {
        provider: Provider::Simulated,
        campaign: CampaignSpec {
            name: "Everyday Business".into(),
            discount: Discount::AmountOff { minor_units: 1_500, currency: "gbp".into() },
            duration: DurationPolicy::Repeating { months: 3 },
            expires_at: Utc.with_ymd_and_hms(2025, 8, 30, 23, 59, 59).unwrap(),
            target: TargetRestriction {
                price_id: Some("price_123".into()),
                product_id: Some("prod_456".into()),
            },
        },
        coupon_id: None,
        code_mode: CodeMode::Auto,
        schedule: ScheduleConfig {
            total,
            workers: 5,
            batch_size: 20,
            cooldown: Duration::from_millis(500),
        },
        retry: RetryPolicy { max_attempts: 3, backoff_unit: Duration::from_millis(10) },
        output: SinkConfig { dir: dir.to_path_buf(), capacity, header: false },
        milestone_every: 25,
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::starting_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()))
}

fn data_rows(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path).unwrap().lines().map(String::from).collect()
}

#[tokio::test]
async fn rejected_codes_are_counted_and_files_respect_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let payments = Arc::new(SimulatedPayments::rejecting_every(7));
    let clock = clock();
    let ctx = ServiceContext::new(clock.clone(), payments.clone(), None);

    let stats = execute(&ctx, &config(dir.path(), 100, 30), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.attempted, 100);
    assert_eq!(stats.failures.rejected, 14);
    assert_eq!(stats.successful, 86);
    assert_eq!(stats.successful + stats.failures.total(), stats.attempted);
    assert_eq!(stats.written, stats.successful);
    assert_eq!(stats.batches, 5);
    assert_eq!(clock.slept(), vec![Duration::from_millis(500); 4]);

    let counts: Vec<usize> = stats.files.iter().map(|p| data_rows(p).len()).collect();
    assert_eq!(counts, vec![30, 30, 26]);
    for row in stats.files.iter().flat_map(|p| data_rows(p)) {
        assert!(row.ends_with(",30/08/2025,15.00 GBP off for 3 months"), "{row}");
    }
}

#[tokio::test]
async fn every_request_carries_campaign_terms() {
    let dir = tempfile::tempdir().unwrap();
    let payments = Arc::new(SimulatedPayments::new());
    let ctx = ServiceContext::new(clock(), payments.clone(), None);

    execute(&ctx, &config(dir.path(), 10, 100), &CancellationToken::new()).await.unwrap();

    let requests = payments.requests();
    assert_eq!(requests.len(), 10);
    for request in &requests {
        assert_eq!(request.coupon_id, "co_sim_1");
        assert_eq!(request.max_redemptions, 1);
        assert_eq!(request.metadata.get("intended_price").map(String::as_str), Some("price_123"));
        assert_eq!(request.metadata.get("intended_product").map(String::as_str), Some("prod_456"));
    }
    let mut keys: Vec<&str> = requests.iter().map(|r| r.idempotency_key.as_str()).collect();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), 10);
}

#[tokio::test]
async fn cancelled_run_still_finalizes_output() {
    let dir = tempfile::tempdir().unwrap();
    let payments = Arc::new(SimulatedPayments::new());
    let ctx = ServiceContext::new(clock(), payments.clone(), None);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = execute(&ctx, &config(dir.path(), 50, 10), &cancel).await.unwrap();

    assert!(stats.interrupted);
    assert_eq!(stats.attempted, 0);
    assert_eq!(payments.promotion_calls(), 0);
    assert_eq!(stats.files, vec![dir.path().join("everyday_business_001.csv")]);
}
