//! End-to-end behaviour of `MockProvider` as a stand-in for a real node:
//! concurrent callers, simulated latency, and a caller-side retry loop
//! driven by injected failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::json;

use ethrpc_core::{JsonRpcResponse, RpcProvider, TransportError};
use ethrpc_mock::{MockProvider, MockResponse};

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Minimal caller-side retry loop of the kind the mock exists to exercise.
async fn request_with_retries(
    provider: &dyn RpcProvider,
    method: &str,
    attempts: u32,
) -> (Result<JsonRpcResponse, TransportError>, u32) {
    let mut tries = 0;
    loop {
        tries += 1;
        match provider.request(method, json!([]), u64::from(tries)).await {
            Err(e) if e.is_retryable() && tries < attempts => {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            other => return (other, tries),
        }
    }
}

// ─── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_tasks_ten_requests_each() {
    let mock = MockProvider::new();
    mock.set_response("eth_blockNumber", MockResponse::success("0x10"));

    let tasks: Vec<_> = (0..2)
        .map(|t| {
            let mock = mock.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    mock.request("eth_blockNumber", json!([]), t * 100 + i).await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(mock.call_count("eth_blockNumber"), 20);
}

#[test]
fn os_threads_lose_no_updates() {
    let mock = MockProvider::new();
    mock.set_response("eth_getBalance", MockResponse::success("0x0"));
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 250;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let mock = mock.clone();
            std::thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    for i in 0..PER_THREAD {
                        mock.request("eth_getBalance", json!([]), t * PER_THREAD + i)
                            .await
                            .unwrap();
                    }
                });
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(mock.call_count("eth_getBalance"), THREADS * PER_THREAD);
    assert_eq!(mock.total_calls(), THREADS * PER_THREAD);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delayed_call_does_not_block_others() {
    let mock = MockProvider::new();
    mock.set_response("eth_call", MockResponse::success("0x").with_delay(300));
    mock.set_response("eth_chainId", MockResponse::success("0x1"));

    let slow = {
        let mock = mock.clone();
        tokio::spawn(async move { mock.request("eth_call", json!([]), 1).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(mock.in_flight(), 1);

    let start = Instant::now();
    for id in 2..12 {
        mock.request("eth_chainId", json!([]), id).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(150), "fast calls were blocked");
    assert_eq!(mock.call_count("eth_chainId"), 10);

    assert!(slow.await.unwrap().unwrap().is_ok());
    assert_eq!(mock.in_flight(), 0);
}

#[tokio::test]
async fn concurrent_delays_overlap() {
    let mock = MockProvider::new();
    mock.set_response("eth_estimateGas", MockResponse::success("0x5208").with_delay(100));

    let start = Instant::now();
    let results = join_all((0..5).map(|id| mock.request("eth_estimateGas", json!([]), id))).await;
    let elapsed = start.elapsed();

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(elapsed >= Duration::from_millis(95));
    assert!(elapsed < Duration::from_millis(400), "delays were serialized: {elapsed:?}");
}

// ─── Fault injection ──────────────────────────────────────────────────────────

#[tokio::test]
async fn endpoint_goes_down_after_three_calls() {
    let mock = MockProvider::new();
    mock.set_response("eth_getTransactionReceipt", MockResponse::success(serde_json::Value::Null));
    mock.set_fail_after_calls(3);

    for id in 1..=3 {
        let resp = mock.request("eth_getTransactionReceipt", json!(["0xhash"]), id).await.unwrap();
        assert_eq!(resp.result(), Some(&serde_json::Value::Null));
    }
    let err = mock.request("eth_getTransactionReceipt", json!(["0xhash"]), 4).await.unwrap_err();
    assert!(err.is_network());
    assert!(err.is_retryable());
}

#[tokio::test]
async fn retry_loop_gives_up_when_endpoint_stays_down() {
    let mock = MockProvider::new();
    mock.set_response("eth_getBlockByNumber", MockResponse::success(json!({"number": "0x1"})));
    mock.set_fail_after_calls(0);

    let (outcome, tries) = request_with_retries(&mock, "eth_getBlockByNumber", 4).await;
    assert!(matches!(outcome, Err(TransportError::Network(_))));
    assert_eq!(tries, 4);
    assert_eq!(mock.total_calls(), 4);
    assert_eq!(mock.call_count("eth_getBlockByNumber"), 0);
}

#[tokio::test]
async fn retry_loop_recovers_after_reset() {
    let mock = MockProvider::new();
    mock.set_response("eth_getBlockByNumber", MockResponse::success(json!({"number": "0x1"})));
    mock.set_fail_after_calls(1);
    mock.request("eth_getBlockByNumber", json!([]), 0).await.unwrap();

    let (outcome, tries) = request_with_retries(&mock, "eth_getBlockByNumber", 2).await;
    assert!(outcome.is_err());
    assert_eq!(tries, 2);

    mock.reset();
    let (outcome, tries) = request_with_retries(&mock, "eth_getBlockByNumber", 2).await;
    assert_eq!(tries, 1);
    assert_eq!(outcome.unwrap().result(), Some(&json!({"number": "0x1"})));
}

#[tokio::test]
async fn protocol_errors_are_not_retried() {
    let mock = MockProvider::new();
    mock.set_response("eth_call", MockResponse::failure(3, "execution reverted"));

    let (outcome, tries) = request_with_retries(&mock, "eth_call", 5).await;
    assert_eq!(tries, 1);
    assert_eq!(outcome.unwrap().error_object().unwrap().code, 3);
}

#[tokio::test]
async fn call_helper_surfaces_protocol_error() {
    let mock = MockProvider::new();
    mock.set_response("eth_getBalance", MockResponse::failure(-32000, "Insufficient funds"));

    let err = mock.call::<String>(1, "eth_getBalance", json!([])).await.unwrap_err();
    match err {
        TransportError::Rpc(e) => assert_eq!(e.code, -32000),
        other => panic!("expected Rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn usable_behind_a_trait_object() {
    let mock = MockProvider::new();
    mock.set_response("eth_chainId", MockResponse::success("0x1"));
    let provider: Arc<dyn RpcProvider> = Arc::new(mock.clone());

    let resp = provider.request("eth_chainId", json!([]), 1).await.unwrap();
    assert!(resp.is_ok());
    assert_eq!(mock.call_count("eth_chainId"), 1);
}
