//! In-memory fakes for the network and server seams (testing only).
//!
//! `ScriptedTransport` answers requests from per-URL reply queues and records
//! what was sent; `RecordingNotifier` keeps every notification;
//! `ScriptedProbe` returns queued verification results; `FakeServer` and
//! `FakeBackup` stand in for the server process and archive backups.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{ModpilotError, Result};
use crate::registry::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::services::backup::BackupService;
use crate::services::notifier::Notifier;
use crate::services::server::{ServerLifecycle, StartupProbe};

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Reply {
    Response(HttpResponse),
    NetworkError(String),
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Reply::Response(HttpResponse {
            status,
            content_length: Some(0),
            body: Vec::new(),
        })
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::bytes(status, body.as_bytes().to_vec())
    }

    pub fn bytes(status: u16, body: Vec<u8>) -> Self {
        Reply::Response(HttpResponse {
            status,
            content_length: Some(body.len() as u64),
            body,
        })
    }

    /// A HEAD answer advertising `length`, or no length header at all.
    pub fn head(length: Option<u64>) -> Self {
        Reply::Response(HttpResponse {
            status: 200,
            content_length: length,
            body: Vec::new(),
        })
    }

    pub fn network(message: &str) -> Self {
        Reply::NetworkError(message.to_string())
    }
}

/// Replies are consumed in order; the last one repeats. Unscripted URLs get 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<(HttpMethod, String), VecDeque<Reply>>>,
    sent: Mutex<Vec<(HttpRequest, Instant)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, method: HttpMethod, url: &str, replies: Vec<Reply>) {
        let mut map = self.replies.lock().unwrap();
        map.insert((method, url.to_string()), replies.into());
    }

    pub fn request_count(&self, method: HttpMethod, url: &str) -> usize {
        let sent = self.sent.lock().unwrap();
        sent.iter()
            .filter(|(request, _)| request.method == method && request.url == url)
            .count()
    }

    pub fn count_method(&self, method: HttpMethod) -> usize {
        let sent = self.sent.lock().unwrap();
        sent.iter()
            .filter(|(request, _)| request.method == method)
            .count()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        let sent = self.sent.lock().unwrap();
        sent.iter().map(|(_, at)| *at).collect()
    }

    pub fn sent_requests(&self) -> Vec<HttpRequest> {
        let sent = self.sent.lock().unwrap();
        sent.iter().map(|(request, _)| request.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let key = (request.method, request.url.clone());
        self.sent.lock().unwrap().push((request, Instant::now()));

        let reply = {
            let mut map = self.replies.lock().unwrap();
            match map.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::NetworkError(message)) => Err(ModpilotError::Network(message)),
            None => Ok(HttpResponse {
                status: 404,
                content_length: None,
                body: Vec::new(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub is_error: bool,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str, is_error: bool) {
        self.sent.lock().unwrap().push(Notification {
            title: title.to_string(),
            body: body.to_string(),
            is_error,
        });
    }
}

// ---------------------------------------------------------------------------
// ScriptedProbe
// ---------------------------------------------------------------------------

/// Returns queued results; once empty every probe passes.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    results: Mutex<VecDeque<std::result::Result<(), String>>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(results: Vec<std::result::Result<(), String>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StartupProbe for ScriptedProbe {
    async fn verify(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Err(reason)) => Err(ModpilotError::Verification(reason)),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeServer
// ---------------------------------------------------------------------------

/// Lifecycle double: `start` succeeds per `starts`, `crashes` makes the
/// process die right after a successful start.
#[derive(Debug)]
pub struct FakeServer {
    starts: bool,
    crashes: bool,
    running: Mutex<bool>,
    stops: AtomicUsize,
}

impl FakeServer {
    pub fn new(starts: bool, crashes: bool) -> Self {
        Self {
            starts,
            crashes,
            running: Mutex::new(false),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn running(running: bool) -> Self {
        let server = Self::new(true, false);
        *server.running.lock().unwrap() = running;
        server
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerLifecycle for FakeServer {
    async fn start(&self) -> bool {
        if self.starts {
            *self.running.lock().unwrap() = !self.crashes;
        }
        self.starts
    }

    async fn stop(&self) -> bool {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.running.lock().unwrap() = false;
        true
    }

    async fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// FakeBackup
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeBackup {
    succeeds: bool,
    created: AtomicUsize,
    pruned: AtomicUsize,
}

impl FakeBackup {
    pub fn new(succeeds: bool) -> Self {
        Self {
            succeeds,
            created: AtomicUsize::new(0),
            pruned: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn pruned(&self) -> usize {
        self.pruned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupService for FakeBackup {
    async fn create_backup(&self) -> bool {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.succeeds
    }

    async fn prune_backups(&self) {
        self.pruned.fetch_add(1, Ordering::SeqCst);
    }
}
