//! Testing utilities.
//!
//! [`ScriptedTransport`] replays queued responses and records every call,
//! so applications can exercise the client's job lifecycle without a
//! network or an account.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, WhisperError};
use crate::transport::{ApiResponse, Submission, Transport};
use crate::types::JobHandle;

/// Record of a call made to the scripted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Submit {
        file_name: String,
        params: Vec<(&'static str, String)>,
    },
    Status { handle: String },
    Retrieve { handle: String },
    Usage,
}

type Scripted = Result<ApiResponse>;

#[derive(Default)]
struct Script {
    submit: VecDeque<Scripted>,
    status: VecDeque<Scripted>,
    retrieve: VecDeque<Scripted>,
    usage: VecDeque<Scripted>,
    /// Replayed once the status queue is empty.
    status_fallback: Option<ApiResponse>,
    /// How long every call takes to answer.
    latency: Duration,
}

/// A transport that answers from per-endpoint queues.
///
/// Cloning shares the script and the call log, so a test can keep a handle
/// after moving the transport into a client.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, status: u16, body: Value) -> Self {
        self.push(|s| &mut s.submit, Ok(ApiResponse::new(status, body.to_string())));
        self
    }

    /// Queue a submission acknowledgement carrying `handle`.
    pub fn accept(self, handle: &str) -> Self {
        self.on_submit(
            202,
            json!({"message": "Whisper Job Accepted", "status": "processing", "whisper_hash": handle}),
        )
    }

    /// Queue one status answer per entry, in order.
    pub fn statuses(self, statuses: &[&str]) -> Self {
        for status in statuses {
            self.push(
                |s| &mut s.status,
                Ok(ApiResponse::new(200, json!({"status": status}).to_string())),
            );
        }
        self
    }

    pub fn on_status(self, status: u16, body: Value) -> Self {
        self.push(|s| &mut s.status, Ok(ApiResponse::new(status, body.to_string())));
        self
    }

    /// Answer every status call with `status` once the queue runs dry.
    pub fn status_forever(self, status: &str) -> Self {
        self.lock_script().status_fallback =
            Some(ApiResponse::new(200, json!({"status": status}).to_string()));
        self
    }

    pub fn on_retrieve(self, status: u16, body: Value) -> Self {
        self.push(|s| &mut s.retrieve, Ok(ApiResponse::new(status, body.to_string())));
        self
    }

    pub fn on_usage(self, status: u16, body: Value) -> Self {
        self.push(|s| &mut s.usage, Ok(ApiResponse::new(status, body.to_string())));
        self
    }

    /// Delay every answer by `latency`, as a slow or stalled service would.
    ///
    /// The call is recorded before the delay starts.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock_script().latency = latency;
        self
    }

    /// Make the next status call fail below HTTP.
    pub fn status_transport_error(self, message: &str) -> Self {
        self.push(|s| &mut s.status, Err(WhisperError::Transport(message.to_string())));
        self
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn submit_calls(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Submit { .. }))
    }

    pub fn status_calls(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Status { .. }))
    }

    pub fn retrieve_calls(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Retrieve { .. }))
    }

    fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, queue: impl FnOnce(&mut Script) -> &mut VecDeque<Scripted>, item: Scripted) {
        queue(&mut self.lock_script()).push_back(item);
    }

    async fn record(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let latency = self.lock_script().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn next(
        &self,
        endpoint: &str,
        queue: impl FnOnce(&mut Script) -> &mut VecDeque<Scripted>,
    ) -> Scripted {
        queue(&mut self.lock_script()).pop_front().unwrap_or_else(|| {
            Err(WhisperError::Transport(format!(
                "scripted transport has no {} response left",
                endpoint
            )))
        })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(&self, submission: &Submission) -> Result<ApiResponse> {
        self.record(TransportCall::Submit {
            file_name: submission.file_name.clone(),
            params: submission.params.clone(),
        })
        .await;
        self.next("submit", |s| &mut s.submit)
    }

    async fn status(&self, handle: &JobHandle) -> Result<ApiResponse> {
        self.record(TransportCall::Status {
            handle: handle.to_string(),
        })
        .await;
        let mut script = self.lock_script();
        match script.status.pop_front() {
            Some(scripted) => scripted,
            None => script.status_fallback.clone().ok_or_else(|| {
                WhisperError::Transport("scripted transport has no status response left".into())
            }),
        }
    }

    async fn retrieve(&self, handle: &JobHandle) -> Result<ApiResponse> {
        self.record(TransportCall::Retrieve {
            handle: handle.to_string(),
        })
        .await;
        self.next("retrieve", |s| &mut s.retrieve)
    }

    async fn usage(&self) -> Result<ApiResponse> {
        self.record(TransportCall::Usage).await;
        self.next("usage", |s| &mut s.usage)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let transport = ScriptedTransport::new().statuses(&["processing", "processed"]);
        let handle = JobHandle::new("H1");

        let first = transport.status(&handle).await.unwrap();
        assert!(first.body.contains("processing"));
        let second = transport.status(&handle).await.unwrap();
        assert!(second.body.contains("processed"));
        assert!(transport.status(&handle).await.is_err());

        assert_eq!(transport.status_calls(), 3);
        assert_eq!(
            transport.calls()[0],
            TransportCall::Status {
                handle: "H1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_status() {
        let transport = ScriptedTransport::new().status_forever("processing");
        let handle = JobHandle::new("H1");
        for _ in 0..5 {
            assert_eq!(transport.status(&handle).await.unwrap().status, 200);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_answers() {
        let transport = ScriptedTransport::new()
            .statuses(&["processing"])
            .with_latency(Duration::from_secs(5));
        let started = tokio::time::Instant::now();

        assert!(transport.status(&JobHandle::new("H1")).await.is_ok());
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(transport.status_calls(), 1);
    }
}
