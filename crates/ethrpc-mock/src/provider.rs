//! The mock provider and its shared state.
//!
//! Every call first bumps a running counter. If a `fail_after_calls`
//! threshold is set and the counter has passed it, the call fails with
//! `TransportError::Network` and nothing else is touched: injected failures
//! never reach the per-method ledger or the request log. Otherwise the
//! method's counter is bumped, the configured template (or a `-32601`
//! default) is copied out, and the lock is released before any simulated
//! delay so concurrent callers keep making progress.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use ethrpc_core::{ErrorKind, JsonRpcResponse, RpcProvider, TransportError};

use crate::response::MockResponse;

/// A call that reached dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub params: Value,
    pub id: u64,
}

/// Requests kept in the log unless changed with
/// [`MockProvider::set_request_log_limit`].
pub const DEFAULT_REQUEST_LOG_LIMIT: usize = 1024;

#[derive(Debug)]
struct MockState {
    responses: HashMap<String, MockResponse>,
    call_counts: HashMap<String, u64>,
    fail_after_calls: Option<u32>,
    total_calls: u64,
    in_flight: usize,
    requests: VecDeque<RecordedRequest>,
    request_log_limit: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            call_counts: HashMap::new(),
            fail_after_calls: None,
            total_calls: 0,
            in_flight: 0,
            requests: VecDeque::new(),
            request_log_limit: DEFAULT_REQUEST_LOG_LIMIT,
        }
    }
}

impl MockState {
    fn record(&mut self, request: RecordedRequest) {
        if self.request_log_limit == 0 {
            return;
        }
        while self.requests.len() >= self.request_log_limit {
            self.requests.pop_front();
        }
        self.requests.push_back(request);
    }
}

/// Configurable in-memory provider.
///
/// Clones share state; two values from separate `new()` calls never do.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the answer for `method`, replacing any earlier one.
    ///
    /// Returns the replaced template, if any.
    pub fn set_response(
        &self,
        method: impl Into<String>,
        response: MockResponse,
    ) -> Option<MockResponse> {
        self.lock().responses.insert(method.into(), response)
    }

    /// Forget the answer for `method`; it falls back to method-not-found.
    pub fn remove_response(&self, method: &str) -> Option<MockResponse> {
        self.lock().responses.remove(method)
    }

    /// Calls to `method` that reached dispatch. Zero for unseen methods.
    pub fn call_count(&self, method: &str) -> u64 {
        self.lock().call_counts.get(method).copied().unwrap_or(0)
    }

    /// Let `calls` requests through, then fail every later one with a
    /// network error. Restarts the running counter.
    pub fn set_fail_after_calls(&self, calls: u32) {
        let mut state = self.lock();
        state.fail_after_calls = Some(calls);
        state.total_calls = 0;
    }

    /// Stop injecting failures.
    pub fn clear_fail_after_calls(&self) {
        self.lock().fail_after_calls = None;
    }

    pub fn fail_after_calls(&self) -> Option<u32> {
        self.lock().fail_after_calls
    }

    /// Every `request` so far, injected failures included.
    pub fn total_calls(&self) -> u64 {
        self.lock().total_calls
    }

    /// Calls currently sleeping through a simulated delay.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// The most recent requests that reached dispatch, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.iter().cloned().collect()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.lock().requests.back().cloned()
    }

    /// Keep at most `limit` requests in the log, dropping the oldest first.
    /// Zero turns the log off. Counters are unaffected.
    pub fn set_request_log_limit(&self, limit: usize) {
        let mut state = self.lock();
        state.request_log_limit = limit;
        let excess = state.requests.len().saturating_sub(limit);
        state.requests.drain(..excess);
    }

    /// Zero the per-method counters and the running counter and clear the
    /// request log. Configured responses and the failure threshold stay.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.call_counts.clear();
        state.total_calls = 0;
        state.requests.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps `in_flight` accurate even if the request future is dropped mid-delay.
struct InFlight<'a>(&'a MockProvider);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}

#[async_trait]
impl RpcProvider for MockProvider {
    async fn request(
        &self,
        method: &str,
        params: Value,
        id: u64,
    ) -> Result<JsonRpcResponse, TransportError> {
        let template = {
            let mut state = self.lock();
            state.total_calls += 1;

            if let Some(limit) = state.fail_after_calls {
                if state.total_calls > u64::from(limit) {
                    let call = state.total_calls;
                    drop(state);
                    tracing::warn!(method, id, call, limit, "injected network failure");
                    return Err(TransportError::Network(format!(
                        "injected failure: call {call} exceeds fail_after_calls={limit}"
                    )));
                }
            }

            match state.call_counts.get_mut(method) {
                Some(count) => *count += 1,
                None => {
                    state.call_counts.insert(method.to_owned(), 1);
                }
            }
            if state.request_log_limit > 0 {
                state.record(RecordedRequest {
                    method: method.to_owned(),
                    params,
                    id,
                });
            }

            let template = state.responses.get(method).cloned();
            if template.as_ref().is_some_and(|t| !t.delay().is_zero()) {
                state.in_flight += 1;
            }
            template
        };

        let template = template.unwrap_or_else(|| {
            MockResponse::failure(
                ErrorKind::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            )
        });

        let delay = template.delay();
        if !delay.is_zero() {
            let _in_flight = InFlight(self);
            tracing::debug!(method, id, delay_ms = delay.as_millis() as u64, "simulating latency");
            tokio::time::sleep(delay).await;
        }

        Ok(template.to_response(id))
    }
}
