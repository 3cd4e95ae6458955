//! Background polling against a scripted transfer source

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use transfer_monitor::{
    ApiError, FilterUpdate, MonitorConfig, NormalizedRecord, PollerState, QueryParams, StopOutcome,
    TransferMonitor, TransferSource,
};

const TICK: Duration = Duration::from_millis(10);

enum Step {
    Batch(Vec<&'static str>),
    Fail,
    Slow(Duration),
}

/// Replays its script one step per fetch, then returns empty batches
struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn batch(ids: &[&str]) -> Value {
    let transfers: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "txid": id,
                "chain": "bitcoin",
                "tokenId": "BITCOIN",
                "tokenSymbol": "BTC",
                "unitValue": "1",
                "historicalUSD": 150000.0
            })
        })
        .collect();
    json!({"count": transfers.len(), "transfers": transfers})
}

#[async_trait]
impl TransferSource for ScriptedSource {
    async fn fetch(&self, _params: &QueryParams) -> Result<Value, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Batch(ids)) => Ok(batch(&ids)),
            Some(Step::Fail) => Err(ApiError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Some(Step::Slow(delay)) => {
                sleep(delay).await;
                Ok(batch(&[]))
            }
            None => Ok(batch(&[])),
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

type Seen = Arc<Mutex<Vec<String>>>;

fn recorder() -> (Seen, impl Fn(&NormalizedRecord) -> anyhow::Result<()> + Send + Sync + 'static) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback = move |record: &NormalizedRecord| -> anyhow::Result<()> {
        sink.lock().push(record.tx_id.clone());
        Ok(())
    };
    (seen, callback)
}

#[tokio::test]
async fn test_only_ids_missing_from_previous_batch_are_reported() {
    let source = ScriptedSource::new(vec![
        Step::Batch(vec!["a", "b"]),
        Step::Batch(vec!["b", "c"]),
        Step::Batch(vec!["c"]),
    ]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());
    let (seen, callback) = recorder();

    assert!(monitor.start_polling(TICK, callback));
    assert_eq!(monitor.poller_state(), PollerState::Running);
    wait_until(|| source.calls() >= 4).await;

    assert_eq!(monitor.stop_polling(Duration::from_secs(2)).await, StopOutcome::Stopped);
    assert_eq!(monitor.poller_state(), PollerState::Idle);
    assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
}

// One-step diff: a transfer that drops out and comes back is reported again
#[tokio::test]
async fn test_reappearing_transfer_is_reported_again() {
    let source = ScriptedSource::new(vec![
        Step::Batch(vec!["a"]),
        Step::Batch(vec![]),
        Step::Batch(vec!["a"]),
    ]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());
    let (seen, callback) = recorder();

    monitor.start_polling(TICK, callback);
    wait_until(|| source.calls() >= 4).await;
    monitor.stop_polling(Duration::from_secs(2)).await;

    assert_eq!(*seen.lock(), vec!["a", "a"]);
}

#[tokio::test]
async fn test_fetch_failure_is_an_empty_cycle() {
    let source = ScriptedSource::new(vec![
        Step::Batch(vec!["a"]),
        Step::Fail,
        Step::Batch(vec!["a", "b"]),
    ]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());
    let (seen, callback) = recorder();

    monitor.start_polling(TICK, callback);
    wait_until(|| source.calls() >= 4).await;
    monitor.stop_polling(Duration::from_secs(2)).await;

    assert_eq!(*seen.lock(), vec!["a", "a", "b"]);
}

#[tokio::test]
async fn test_callback_errors_and_panics_do_not_stop_the_loop() {
    let source = ScriptedSource::new(vec![
        Step::Batch(vec!["err"]),
        Step::Batch(vec!["panic"]),
        Step::Batch(vec!["ok"]),
    ]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    monitor.start_polling(TICK, move |record| {
        sink.lock().push(record.tx_id.clone());
        match record.tx_id.as_str() {
            "err" => anyhow::bail!("downstream rejected {}", record.tx_id),
            "panic" => panic!("callback blew up"),
            _ => Ok(()),
        }
    });

    wait_until(|| seen.lock().len() >= 3).await;
    assert_eq!(monitor.poller_state(), PollerState::Running);
    assert_eq!(monitor.stop_polling(Duration::from_secs(2)).await, StopOutcome::Stopped);
    assert_eq!(*seen.lock(), vec!["err", "panic", "ok"]);
}

#[tokio::test]
async fn test_second_start_is_rejected_and_restart_works() {
    let source = ScriptedSource::new(vec![Step::Batch(vec!["a"])]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());
    let (first_seen, first) = recorder();
    let (second_seen, second) = recorder();

    assert!(monitor.start_polling(TICK, first));
    assert!(!monitor.start_polling(TICK, second));
    wait_until(|| source.calls() >= 2).await;
    monitor.stop_polling(Duration::from_secs(2)).await;

    assert_eq!(*first_seen.lock(), vec!["a"]);
    assert!(second_seen.lock().is_empty());

    let (_, again) = recorder();
    assert!(monitor.start_polling(TICK, again));
    assert_eq!(monitor.stop_polling(Duration::from_secs(2)).await, StopOutcome::Stopped);
}

#[tokio::test]
async fn test_stop_wakes_a_sleeping_poller() {
    let source = ScriptedSource::new(vec![]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());
    let (_, callback) = recorder();

    monitor.start_polling(Duration::from_secs(3600), callback);
    wait_until(|| source.calls() >= 1).await;

    let outcome = tokio::time::timeout(Duration::from_secs(2), monitor.stop_polling(Duration::from_secs(1)))
        .await
        .expect("stop must not wait for the interval");
    assert_eq!(outcome, StopOutcome::Stopped);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_stop_timeout_leaves_worker_to_finish() {
    let source = ScriptedSource::new(vec![Step::Slow(Duration::from_millis(300))]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());
    let (_, callback) = recorder();

    monitor.start_polling(TICK, callback);
    wait_until(|| source.calls() >= 1).await;

    assert_eq!(
        monitor.stop_polling(Duration::from_millis(20)).await,
        StopOutcome::TimedOut
    );
    assert_eq!(monitor.poller_state(), PollerState::Stopping);

    let (_, rejected) = recorder();
    assert!(!monitor.start_polling(TICK, rejected));

    wait_until(|| monitor.poller_state() == PollerState::Idle).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_client_side_filtering_applies_to_polling() {
    let source = ScriptedSource::new(vec![Step::Batch(vec!["a", "b"])]);
    let config = MonitorConfig {
        client_side_filtering: true,
        ..Default::default()
    };
    let monitor = TransferMonitor::with_source(source.clone(), config);
    monitor.set_filters(FilterUpdate {
        min_usd: Some(200000.0),
        ..Default::default()
    });
    let (seen, callback) = recorder();

    monitor.start_polling(TICK, callback);
    wait_until(|| source.calls() >= 2).await;
    monitor.stop_polling(Duration::from_secs(2)).await;

    assert!(seen.lock().is_empty());
}
