//! Scriptable vendor client for coordinator tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ha_coordinator::{UpdateError, VendorClient};
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

struct FakeState {
    calls: AtomicUsize,
    responses: Mutex<VecDeque<Result<Value, UpdateError>>>,
    default: Mutex<Value>,
    gated: AtomicBool,
    gate: Semaphore,
    started: Notify,
    closed: AtomicBool,
}

/// A vendor client whose answers and timing are driven by the test
///
/// Clones share state, so a test keeps one clone to inspect the client after
/// moving the other into a coordinator.
#[derive(Clone)]
pub struct FakeClient(Arc<FakeState>);

impl FakeClient {
    /// A client answering `default` unless a scripted response is queued
    pub fn new(default: Value) -> Self {
        Self(Arc::new(FakeState {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            started: Notify::new(),
            closed: AtomicBool::new(false),
        }))
    }

    /// Number of `fetch_state` calls so far
    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    /// Queue the answer for the next fetch
    pub fn push_response(&self, response: Result<Value, UpdateError>) {
        self.0.responses.lock().unwrap().push_back(response);
    }

    pub fn set_default(&self, value: Value) {
        *self.0.default.lock().unwrap() = value;
    }

    /// Make every following fetch wait for [`release`](Self::release)
    pub fn hold(&self) {
        self.0.gated.store(true, Ordering::SeqCst);
    }

    /// Let `n` held fetches proceed
    pub fn release(&self, n: usize) {
        self.0.gate.add_permits(n);
    }

    /// Wait until a fetch has started
    pub async fn wait_started(&self) {
        self.0.started.notified().await;
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VendorClient for FakeClient {
    type Data = Value;

    async fn fetch_state(&self) -> Result<Value, UpdateError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        self.0.started.notify_one();

        if self.0.gated.load(Ordering::SeqCst) {
            let permit = self
                .0
                .gate
                .acquire()
                .await
                .map_err(|_| UpdateError::connection("gate closed"))?;
            permit.forget();
        }

        let scripted = self.0.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.0.default.lock().unwrap().clone()))
    }

    async fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}
