//! Scripted in-process backend for tests and offline demos.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{path_of, ApiRequest, Method, RawResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub enum FakeReply {
    Json(u16, Value),
    Empty(u16),
    Raw(u16, Vec<u8>),
    Timeout,
    Unreachable,
    /// Answer with the inner reply after a delay.
    Delayed(Duration, Box<FakeReply>),
}

impl FakeReply {
    pub fn ok(v: Value) -> Self { FakeReply::Json(200, v) }

    pub fn status(code: u16, v: Value) -> Self { FakeReply::Json(code, v) }

    pub fn after(self, d: Duration) -> Self { FakeReply::Delayed(d, Box::new(self)) }
}

/// Replies are queued per (method, path); the last queued reply repeats.
/// Unscripted routes answer 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<FakeReply>>>,
    requests: Mutex<Vec<ApiRequest>>,
    down: AtomicBool,
    sends: AtomicU64,
    probes: AtomicU64,
}

impl FakeTransport {
    pub fn new() -> Self { Self::default() }

    pub fn on(&self, method: Method, path: &str, reply: FakeReply) -> &Self {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Drop every scripted reply for the route, then script `reply`.
    pub fn replace(&self, method: Method, path: &str, reply: FakeReply) -> &Self {
        self.routes.lock().insert((method, path.to_string()), VecDeque::from([reply]));
        self
    }

    /// Simulate the backend host going away (probe and sends fail).
    pub fn set_down(&self, down: bool) { self.down.store(down, Ordering::SeqCst); }

    pub fn requests(&self) -> Vec<ApiRequest> { self.requests.lock().clone() }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests.lock().iter().filter(|r| path_of(&r.endpoint) == path).cloned().collect()
    }

    pub fn send_count(&self) -> u64 { self.sends.load(Ordering::SeqCst) }

    pub fn probe_count(&self) -> u64 { self.probes.load(Ordering::SeqCst) }

    fn next_reply(&self, method: Method, path: &str) -> Option<FakeReply> {
        let mut routes = self.routes.lock();
        let q = routes.get_mut(&(method, path.to_string()))?;
        if q.len() > 1 { q.pop_front() } else { q.front().cloned() }
    }
}

async fn resolve(reply: FakeReply) -> Result<RawResponse, TransportError> {
    let mut reply = reply;
    loop {
        match reply {
            FakeReply::Delayed(d, inner) => {
                tokio::time::sleep(d).await;
                reply = *inner;
            }
            FakeReply::Json(status, v) => return Ok(RawResponse { status, body: v.to_string().into_bytes() }),
            FakeReply::Empty(status) => return Ok(RawResponse { status, body: Vec::new() }),
            FakeReply::Raw(status, body) => return Ok(RawResponse { status, body }),
            FakeReply::Timeout => return Err(TransportError::Timeout),
            FakeReply::Unreachable => return Err(TransportError::Unreachable("connection refused".into())),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, req: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req.clone());
        if self.down.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        let reply = self
            .next_reply(req.method, path_of(&req.endpoint))
            .unwrap_or_else(|| FakeReply::Json(404, serde_json::json!({ "error": "not found" })));
        resolve(reply).await
    }

    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        !self.down.load(Ordering::SeqCst)
    }
}
