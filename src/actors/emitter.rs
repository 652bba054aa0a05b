//! Emitter - bounded, non-blocking path from producers to the sink
//!
//! ## Message Flow
//!
//! ```text
//! Monitors, firehose tasks ──emit()──► bounded queue ──► DeliveryActor ──► Sink
//!                               │
//!                               └── queue full: event shed, counted, logged
//! ```
//!
//! Producers never wait on the sink. The delivery task owns the sink
//! connection, connects lazily and drops the connection on any send error;
//! the next event reconnects. Delivery is at most once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::metric::Metric;
use crate::sink::{Sink, SinkEvent};

/// Counters shared by producers and the delivery task
#[derive(Debug, Default)]
pub struct EmitterStats {
    enqueued: AtomicU64,
    shed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl EmitterStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Events dropped because the queue was full
    pub fn shed(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Events lost to connect or send failures
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Producer side of the outbound queue
///
/// Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<SinkEvent>,
    default_ttl: f32,
    stats: Arc<EmitterStats>,
    closed: CancellationToken,
}

impl Emitter {
    /// Create the emitter and spawn its delivery task.
    pub fn initialize(
        sink: Box<dyn Sink>,
        default_ttl: f32,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (emitter, delivery) = Self::channel(default_ttl, queue_capacity);
        let handle = tokio::spawn(delivery.run(sink));
        (emitter, handle)
    }

    /// Create the emitter and its delivery actor without spawning anything.
    ///
    /// A capacity of 0 is raised to 1.
    pub fn channel(default_ttl: f32, queue_capacity: usize) -> (Self, DeliveryActor) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let stats = Arc::new(EmitterStats::default());
        let closed = CancellationToken::new();

        let emitter = Self {
            tx,
            default_ttl,
            stats: stats.clone(),
            closed: closed.clone(),
        };
        let delivery = DeliveryActor { rx, stats, closed };

        (emitter, delivery)
    }

    /// Queue a metric for delivery. Never blocks.
    pub fn emit(&self, metric: Metric) {
        if self.closed.is_cancelled() {
            trace!("emitter closed, discarding {}", metric.service);
            return;
        }

        let event = SinkEvent::from_metric(metric, self.default_ttl, Utc::now());
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(event)) => {
                let shed = self.stats.shed.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    host = %event.host,
                    service = %event.service,
                    "outbound queue full, dropping event ({shed} dropped so far)"
                );
            }
            Err(TrySendError::Closed(event)) => {
                debug!("delivery stopped, discarding {}", event.service);
            }
        }
    }

    /// Stop delivery. Events still queued may be lost.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn stats(&self) -> Arc<EmitterStats> {
        self.stats.clone()
    }
}

/// Consumer side of the outbound queue, owner of the sink connection
pub struct DeliveryActor {
    rx: mpsc::Receiver<SinkEvent>,
    stats: Arc<EmitterStats>,
    closed: CancellationToken,
}

impl DeliveryActor {
    /// Drain the queue into `sink` until the emitter is closed.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut sink: Box<dyn Sink>) {
        debug!("starting delivery");
        let mut connected = false;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.closed.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if !connected {
                if let Err(e) = sink.connect().await {
                    error!("error connecting to sink, dropping event: {e}");
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                debug!("connected to sink");
                connected = true;
            }

            match sink.send(&event).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!("error sending event {}: {e}", event.service);
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = sink.close().await {
                        debug!("error closing sink connection: {e}");
                    }
                    connected = false;
                }
            }
        }

        self.rx.close();
        if connected && let Err(e) = sink.close().await {
            debug!("error closing sink connection: {e}");
        }
        debug!("delivery stopped");
    }
}
