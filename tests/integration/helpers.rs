//! Fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appwatch::actors::app_monitor::MonitorContext;
use appwatch::actors::emitter::Emitter;
use appwatch::actors::registry::MonitoredSet;
use appwatch::cloudfoundry::{
    AppEvent, AppRef, AppSummary, ControlPlane, ControlPlaneError, TokenError, TokenSource,
};
use appwatch::firehose::{Envelope, EnvelopeStream, StreamChannels, StreamError};
use appwatch::metric::ApplicationIdentity;
use appwatch::sink::{Sink, SinkError, SinkEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

pub const ORG: &str = "acme";
pub const SPACE: &str = "prod";

pub fn app(guid: &str) -> ApplicationIdentity {
    ApplicationIdentity::new(ORG, SPACE, guid, format!("app-{guid}"))
}

pub fn summary(running: u32, configured: u32) -> AppSummary {
    AppSummary {
        name: "app".into(),
        instances: configured,
        running_instances: running,
        state: "STARTED".into(),
    }
}

pub fn transient_error() -> ControlPlaneError {
    ControlPlaneError::Status {
        status: 502,
        url: "http://api.example.com".into(),
        body: "bad gateway".into(),
    }
}

/// Scripted control plane.
///
/// Unscripted summaries answer 1/1 running, unscripted event queries answer
/// with the recorded events newer than the bound, deleted applications answer
/// `NotFound`.
#[derive(Default)]
pub struct FakeControlPlane {
    apps: Mutex<Vec<AppRef>>,
    failing_listings: AtomicUsize,
    listings: AtomicUsize,
    deleted: Mutex<HashSet<String>>,
    summaries: Mutex<HashMap<String, VecDeque<Result<AppSummary, ControlPlaneError>>>>,
    summary_calls: Mutex<HashMap<String, usize>>,
    events: Mutex<HashMap<String, VecDeque<Result<Vec<AppEvent>, ControlPlaneError>>>>,
    event_queries: Mutex<Vec<(String, DateTime<Utc>)>>,
    event_log: Mutex<HashMap<String, Vec<AppEvent>>>,
    during_next_summary: Mutex<HashMap<String, AppEvent>>,
}

impl FakeControlPlane {
    pub fn with_apps(guids: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        fake.set_apps(guids);
        Arc::new(fake)
    }

    pub fn set_apps(&self, guids: &[&str]) {
        *self.apps.lock().unwrap() = guids
            .iter()
            .map(|guid| AppRef {
                guid: guid.to_string(),
                name: format!("app-{guid}"),
            })
            .collect();
    }

    pub fn fail_next_listings(&self, n: usize) {
        self.failing_listings.store(n, Ordering::SeqCst);
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn delete(&self, guid: &str) {
        self.deleted.lock().unwrap().insert(guid.to_string());
    }

    pub fn restore(&self, guid: &str) {
        self.deleted.lock().unwrap().remove(guid);
    }

    pub fn push_summary(&self, guid: &str, summary: Result<AppSummary, ControlPlaneError>) {
        self.summaries
            .lock()
            .unwrap()
            .entry(guid.to_string())
            .or_default()
            .push_back(summary);
    }

    pub fn summary_calls(&self, guid: &str) -> usize {
        self.summary_calls
            .lock()
            .unwrap()
            .get(guid)
            .copied()
            .unwrap_or(0)
    }

    pub fn push_events(&self, guid: &str, events: Result<Vec<AppEvent>, ControlPlaneError>) {
        self.events
            .lock()
            .unwrap()
            .entry(guid.to_string())
            .or_default()
            .push_back(events);
    }

    /// Record `event` on the platform, stamped with the current time, while
    /// the next summary of `guid` is being fetched.
    pub fn record_event_during_next_summary(&self, guid: &str, event: AppEvent) {
        self.during_next_summary
            .lock()
            .unwrap()
            .insert(guid.to_string(), event);
    }

    /// Lower bounds passed to `events_since` for `guid`, in call order
    pub fn event_queries(&self, guid: &str) -> Vec<DateTime<Utc>> {
        self.event_queries
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, _)| g == guid)
            .map(|(_, since)| *since)
            .collect()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_applications(
        &self,
        org: &str,
        space: &str,
    ) -> Result<Vec<AppRef>, ControlPlaneError> {
        assert_eq!((org, space), (ORG, SPACE));
        self.listings.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_listings.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_listings.store(failing - 1, Ordering::SeqCst);
            return Err(transient_error());
        }
        Ok(self.apps.lock().unwrap().clone())
    }

    async fn application_summary(&self, guid: &str) -> Result<AppSummary, ControlPlaneError> {
        *self
            .summary_calls
            .lock()
            .unwrap()
            .entry(guid.to_string())
            .or_default() += 1;

        if let Some(mut event) = self.during_next_summary.lock().unwrap().remove(guid) {
            event.timestamp = Utc::now();
            self.event_log
                .lock()
                .unwrap()
                .entry(guid.to_string())
                .or_default()
                .push(event);
        }

        if self.deleted.lock().unwrap().contains(guid) {
            return Err(ControlPlaneError::NotFound {
                resource: format!("application {guid}"),
            });
        }
        self.summaries
            .lock()
            .unwrap()
            .get_mut(guid)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| Ok(summary(1, 1)))
    }

    async fn events_since(
        &self,
        guid: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AppEvent>, ControlPlaneError> {
        self.event_queries
            .lock()
            .unwrap()
            .push((guid.to_string(), since));

        self.events
            .lock()
            .unwrap()
            .get_mut(guid)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| {
                // unscripted queries read the recorded log
                Ok(self
                    .event_log
                    .lock()
                    .unwrap()
                    .get(guid)
                    .into_iter()
                    .flatten()
                    .filter(|event| event.timestamp > since)
                    .cloned()
                    .collect())
            })
    }
}

#[derive(Default)]
pub struct FakeTokens {
    failing: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeTokens {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, n: usize) {
        self.failing.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for FakeTokens {
    async fn token(&self) -> Result<String, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing.store(failing - 1, Ordering::SeqCst);
            return Err(TokenError::NoCredentials);
        }
        Ok("token".to_string())
    }
}

/// Sending halves of a stream opened through [`FakeStream`]
#[derive(Clone)]
pub struct OpenedStream {
    pub guid: String,
    pub token: String,
    pub envelopes: mpsc::Sender<Envelope>,
    pub errors: mpsc::Sender<StreamError>,
}

impl OpenedStream {
    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.envelopes.is_closed()
    }
}

#[derive(Default)]
pub struct FakeStream {
    fail_open: AtomicBool,
    opened: Mutex<Vec<OpenedStream>>,
}

impl FakeStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self, guid: &str) -> Vec<OpenedStream> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.guid == guid)
            .cloned()
            .collect()
    }

    /// Hand over the streams opened for `guid`; dropping them closes the
    /// consumer's channels.
    pub fn take(&self, guid: &str) -> Vec<OpenedStream> {
        let mut opened = self.opened.lock().unwrap();
        let (taken, kept): (Vec<_>, Vec<_>) = opened.drain(..).partition(|s| s.guid == guid);
        *opened = kept;
        taken
    }
}

#[async_trait]
impl EnvelopeStream for FakeStream {
    async fn stream(&self, guid: &str, token: &str) -> Result<StreamChannels, StreamError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(StreamError::InvalidEndpoint {
                endpoint: "ws://doppler.invalid".into(),
                reason: "refused".into(),
            });
        }

        let (envelopes, errors, channels) = StreamChannels::bounded(16);
        self.opened.lock().unwrap().push(OpenedStream {
            guid: guid.to_string(),
            token: token.to_string(),
            envelopes,
            errors,
        });
        Ok(channels)
    }
}

/// Every event that reached the sink
pub type Recorded = Arc<Mutex<Vec<SinkEvent>>>;

#[derive(Default)]
pub struct RecordingSink {
    events: Recorded,
}

#[async_trait]
impl Sink for RecordingSink {
    async fn connect(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn send(&mut self, event: &SinkEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Emitter whose delivered events end up in the returned vector
pub fn recording_emitter() -> (Emitter, Recorded) {
    let sink = RecordingSink::default();
    let recorded = sink.events.clone();
    let (emitter, _delivery) = Emitter::initialize(Box::new(sink), 30.0, 1024);
    (emitter, recorded)
}

pub fn services(recorded: &Recorded) -> Vec<String> {
    recorded
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.service.clone())
        .collect()
}

pub struct Fixture {
    pub control_plane: Arc<FakeControlPlane>,
    pub tokens: Arc<FakeTokens>,
    pub stream: Arc<FakeStream>,
    pub registry: MonitoredSet,
    pub recorded: Recorded,
    pub ctx: MonitorContext,
}

impl Fixture {
    pub fn new(control_plane: Arc<FakeControlPlane>, poll_interval: Duration) -> Self {
        let tokens = FakeTokens::new();
        let stream = FakeStream::new();
        let registry = MonitoredSet::new();
        let (emitter, recorded) = recording_emitter();

        let ctx = MonitorContext {
            control_plane: control_plane.clone(),
            tokens: tokens.clone(),
            stream: stream.clone(),
            emitter,
            registry: registry.clone(),
            poll_interval,
        };

        Self {
            control_plane,
            tokens,
            stream,
            registry,
            recorded,
            ctx,
        }
    }
}

/// Log output captured on the current thread
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's `tracing` output into a buffer until the guard drops.
///
/// Only covers tasks polled on the test's own thread, which holds for the
/// default current-thread test runtime.
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    (tracing::subscriber::set_default(subscriber), logs)
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

pub async fn wait_for_monitored(registry: &MonitoredSet, n: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while registry.len().await != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {n} monitored applications");
}
