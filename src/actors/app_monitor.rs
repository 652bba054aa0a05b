//! AppMonitor - the lifecycle of one monitored application
//!
//! ## States
//!
//! ```text
//! Starting ──spawn firehose──► Active ──summary 404 / cancel──► Stopped
//!                                │  ▲
//!                                └──┘ poll tick: summary, events
//! ```
//!
//! Every tick fetches the application summary and the events recorded since
//! the last successful fetch. Summary metrics are emitted before event
//! metrics. A deleted application (404 on the summary) ends the monitor;
//! any other error is logged and retried on the next tick.
//!
//! On the way out the monitor cancels its firehose sub-task and removes
//! itself from the monitored set, so discovery may start a new monitor if
//! the application shows up again.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cloudfoundry::{ControlPlane, TokenSource};
use crate::firehose::EnvelopeStream;
use crate::metric::ApplicationIdentity;
use crate::telemetry::TelemetrySource;

use super::emitter::Emitter;
use super::firehose::FirehoseActor;
use super::messages::{FirehoseExit, MonitorExit, MonitorState};
use super::registry::MonitoredSet;

/// Collaborators shared by every monitor
#[derive(Clone)]
pub struct MonitorContext {
    pub control_plane: Arc<dyn ControlPlane>,
    pub tokens: Arc<dyn TokenSource>,
    pub stream: Arc<dyn EnvelopeStream>,
    pub emitter: Emitter,
    pub registry: MonitoredSet,
    pub poll_interval: Duration,
}

/// Lower bound of the next events query
///
/// Starts at the first tick's own time and only moves forward once a fetch
/// succeeded, so a failed fetch is retried with the same bound. A tick only
/// reports events up to its own time, so each window is `(since, now]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventWindow {
    since: Option<DateTime<Utc>>,
}

impl EventWindow {
    pub fn begin(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.since.unwrap_or(now)
    }

    pub fn commit(&mut self, now: DateTime<Utc>) {
        self.since = Some(now);
    }
}

struct RunningFirehose {
    cancel: CancellationToken,
    join: JoinHandle<FirehoseExit>,
}

pub struct AppMonitor {
    app: ApplicationIdentity,
    ctx: MonitorContext,
    cancel: CancellationToken,
    state_tx: watch::Sender<MonitorState>,
    events: EventWindow,
    firehose: Option<RunningFirehose>,
}

impl AppMonitor {
    pub fn new(
        app: ApplicationIdentity,
        ctx: MonitorContext,
        cancel: CancellationToken,
        state_tx: watch::Sender<MonitorState>,
    ) -> Self {
        Self {
            app,
            ctx,
            cancel,
            state_tx,
            events: EventWindow::default(),
            firehose: None,
        }
    }

    #[instrument(skip(self), fields(app = %self.app.name, guid = %self.app.guid))]
    pub async fn run(mut self) -> MonitorExit {
        info!("monitoring {}", self.app);

        self.start_firehose();
        self.state_tx.send_replace(MonitorState::Active);

        let mut ticker = interval(self.ctx.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break MonitorExit::Cancelled,
                _ = ticker.tick() => {
                    if let ControlFlow::Break(exit) = self.tick(Utc::now()).await {
                        break exit;
                    }
                }
            }
        };

        self.stop().await;
        match exit {
            MonitorExit::NotFound => info!("application no longer exists, monitor stopped"),
            MonitorExit::Cancelled => debug!("monitor cancelled"),
        }
        exit
    }

    async fn tick(&mut self, now: DateTime<Utc>) -> ControlFlow<MonitorExit> {
        self.restart_finished_firehose();

        let summary = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return ControlFlow::Break(MonitorExit::Cancelled),
            summary = self.ctx.control_plane.application_summary(&self.app.guid) => summary,
        };
        match summary {
            Ok(summary) => self.publish(TelemetrySource::Summary(summary)),
            Err(e) if e.is_not_found() => return ControlFlow::Break(MonitorExit::NotFound),
            Err(e) => warn!("error fetching application summary: {e}"),
        }

        let since = self.events.begin(now);
        let events = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return ControlFlow::Break(MonitorExit::Cancelled),
            events = self.ctx.control_plane.events_since(&self.app.guid, since) => events,
        };
        match events {
            Ok(events) => {
                // later events belong to the next window
                for event in events.into_iter().filter(|e| e.timestamp <= now) {
                    self.publish(TelemetrySource::Event(event));
                }
                self.events.commit(now);
            }
            Err(e) => warn!("error fetching application events since {since}: {e}"),
        }

        ControlFlow::Continue(())
    }

    fn publish(&self, source: TelemetrySource) {
        for metric in source.translate(&self.app) {
            self.ctx.emitter.emit(metric);
        }
    }

    fn start_firehose(&mut self) {
        let cancel = self.cancel.child_token();
        let actor = FirehoseActor::new(
            self.app.clone(),
            self.ctx.tokens.clone(),
            self.ctx.stream.clone(),
            self.ctx.emitter.clone(),
            cancel.clone(),
        );
        let join = tokio::spawn(actor.run());
        self.firehose = Some(RunningFirehose { cancel, join });
    }

    fn restart_finished_firehose(&mut self) {
        let finished = self
            .firehose
            .as_ref()
            .is_none_or(|firehose| firehose.join.is_finished());
        if finished {
            debug!("restarting stream consumer");
            self.start_firehose();
        }
    }

    async fn stop(&mut self) {
        if let Some(firehose) = self.firehose.take() {
            firehose.cancel.cancel();
            match firehose.join.await {
                Ok(exit) => debug!("stream consumer ended: {exit:?}"),
                Err(e) => warn!("stream consumer task failed: {e}"),
            }
        }

        self.ctx.registry.remove(&self.app.guid).await;
        self.state_tx.send_replace(MonitorState::Stopped);
    }
}

/// Handle to a spawned AppMonitor
pub struct AppMonitorHandle {
    pub app: ApplicationIdentity,
    state: watch::Receiver<MonitorState>,
    cancel: CancellationToken,
    join: JoinHandle<MonitorExit>,
}

impl AppMonitorHandle {
    /// Spawn a monitor for `app` bound to `cancel`.
    ///
    /// The caller must already have inserted `app` into the monitored set.
    pub fn spawn(app: ApplicationIdentity, ctx: MonitorContext, cancel: CancellationToken) -> Self {
        let (state_tx, state) = watch::channel(MonitorState::Starting);
        let monitor = AppMonitor::new(app.clone(), ctx, cancel.clone(), state_tx);
        let join = tokio::spawn(monitor.run());

        Self {
            app,
            state,
            cancel,
            join,
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the monitor to end.
    pub async fn join(self) -> Result<MonitorExit, tokio::task::JoinError> {
        self.join.await
    }
}
