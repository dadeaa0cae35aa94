//! End-to-end behaviour of the exporter: monitors, registry and endpoint
//! wired together the way the binary wires them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use beacon_monitor::{
    BalanceSource, ClientError, ExporterConfig, MetricsRegistry, Supervisor, ValidatorIndex,
    ValidatorInfo, ValidatorResponse, serve_metrics,
};
use tokio::sync::oneshot;

const PUBKEY: &str = "0x933ad9491b62059dd065b560d256d8957a8c402cc6e8d8ee7290ae11e8f7329267a8811c397529dac52ae1342ba58c95";

fn body(index: u64, balance: u64) -> String {
    format!(
        r#"{{"data":{{"balance":"{balance}","pubkey":"{PUBKEY}","validator_index":{index},
        "validator":{{"activation_eligibility_epoch":"0","activation_epoch":"0",
        "effective_balance":"32000000000","exit_epoch":"18446744073709551615",
        "pubkey":"{PUBKEY}","slashed":false,"withdrawable_epoch":"18446744073709551615",
        "withdrawal_credentials":"0x00f50428677c60f997aadeab24aabf7fceaef491c96a52b463ae91f95611cf71"}}}}}}"#
    )
}

fn info(index: u64, balance: u64) -> ValidatorInfo {
    serde_json::from_str::<ValidatorResponse>(&body(index, balance))
        .unwrap()
        .data
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Per-index queue of outcomes; `None` is a network failure. The last
/// outcome of each queue repeats.
struct FakeBeacon {
    outcomes: Mutex<HashMap<u64, Vec<Option<u64>>>>,
    delay: Mutex<HashMap<u64, Duration>>,
    calls: AtomicUsize,
}

impl FakeBeacon {
    fn new(outcomes: &[(u64, &[Option<u64>])]) -> Self {
        Self {
            outcomes: Mutex::new(
                outcomes
                    .iter()
                    .map(|(i, o)| (*i, o.to_vec()))
                    .collect(),
            ),
            delay: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn slow_after_first(self, index: u64, delay: Duration) -> Self {
        self.delay.lock().unwrap().insert(index, delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BalanceSource for FakeBeacon {
    fn fetch(&self, index: ValidatorIndex) -> Result<ValidatorInfo, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if call > 0 {
            let delay = self.delay.lock().unwrap().get(&index.get()).copied();
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
        }

        let outcome = {
            let mut outcomes = self.outcomes.lock().unwrap();
            let queue = outcomes.get_mut(&index.get()).expect("unknown index");
            if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0]
            }
        };

        match outcome {
            Some(balance) => Ok(info(index.get(), balance)),
            None => Err(ClientError::Transport("operation timed out".to_string())),
        }
    }
}

#[test]
fn failing_validator_is_absent_until_its_first_success() {
    let source = Arc::new(FakeBeacon::new(&[
        (1, &[Some(32_000_000_000)]),
        (2, &[None, Some(32_000_000_001)]),
    ]));
    let registry = MetricsRegistry::new().unwrap();
    let mut supervisor = Supervisor::new(
        registry.clone(),
        Arc::clone(&source),
        Duration::from_secs(1),
        &[ValidatorIndex(1), ValidatorIndex(2)],
    )
    .unwrap();
    supervisor.start().unwrap();

    // After the first tick: 1 is published, 2 failed and has no series.
    assert!(wait_until(Duration::from_secs(5), || {
        registry.balance(ValidatorIndex(1)).is_some() && source.calls() >= 2
    }));
    assert_eq!(registry.balance(ValidatorIndex(1)), Some(32_000_000_000.0));
    assert_eq!(registry.balance(ValidatorIndex(2)), None);

    let text = registry.gather_text();
    assert!(text.contains(r#"eth2_validator_balance_gwei{validator_index="1"} 32000000000"#));
    assert!(!text.contains(r#"validator_index="2""#));

    // The second tick recovers.
    assert!(wait_until(Duration::from_secs(5), || {
        registry.balance(ValidatorIndex(2)).is_some()
    }));
    assert_eq!(registry.balance(ValidatorIndex(2)), Some(32_000_000_001.0));
    assert_eq!(registry.balance(ValidatorIndex(1)), Some(32_000_000_000.0));

    supervisor.shutdown();
}

#[test]
fn scrape_is_not_blocked_by_a_slow_poll() {
    let source = Arc::new(
        FakeBeacon::new(&[(5, &[Some(100), Some(200)])])
            .slow_after_first(5, Duration::from_secs(2)),
    );
    let registry = MetricsRegistry::new().unwrap();
    let mut supervisor = Supervisor::new(
        registry.clone(),
        Arc::clone(&source),
        Duration::from_millis(50),
        &[ValidatorIndex(5)],
    )
    .unwrap();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = runtime.spawn(serve_metrics(registry.clone(), listener, async {
        let _ = stop_rx.await;
    }));

    supervisor.start().unwrap();

    // First poll committed 100, second poll is now sleeping.
    assert!(wait_until(Duration::from_secs(5), || source.calls() >= 2));
    assert_eq!(registry.balance(ValidatorIndex(5)), Some(100.0));

    let started = Instant::now();
    let text = reqwest::blocking::get(format!("http://{addr}/metrics"))
        .unwrap()
        .text()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(text.contains(r#"eth2_validator_balance_gwei{validator_index="5"} 100"#));

    let _ = stop_tx.send(());
    runtime.block_on(server).unwrap().unwrap();
    supervisor.shutdown();
}

#[test]
fn beacon_node_round_trip() {
    let mut server = mockito::Server::new();
    let ok = server
        .mock("GET", "/eth/v1/beacon/states/head/validators/1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body(1, 32_000_000_000))
        .expect_at_least(1)
        .create();
    let truncated = server
        .mock("GET", "/eth/v1/beacon/states/head/validators/4")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"balance":"3200"#)
        .expect_at_least(3)
        .create();

    let mut cfg = ExporterConfig::default();
    cfg.beacon.base_address = server.url();
    cfg.monitor.refresh_interval = Duration::from_millis(25);
    cfg.monitor.validator_indices = vec![ValidatorIndex(1), ValidatorIndex(4)];

    let mut supervisor = Supervisor::from_config(&cfg).unwrap();
    let registry = supervisor.registry().clone();
    supervisor.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        ok.matched() && truncated.matched()
    }));
    assert_eq!(registry.balance(ValidatorIndex(1)), Some(32_000_000_000.0));
    assert_eq!(registry.balance(ValidatorIndex(4)), None);

    let text = registry.gather_text();
    assert!(text.contains("# HELP eth2_validator_balance_gwei The balance of a given validator."));
    assert!(text.contains("# TYPE eth2_validator_balance_gwei gauge"));
    assert!(!text.contains(r#"validator_index="4""#));

    supervisor.shutdown();
}
