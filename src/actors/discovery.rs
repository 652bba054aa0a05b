//! DiscoveryActor - keeps exactly one monitor per application
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → list applications → insert unknown guids → spawn AppMonitor
//!     ↑
//!     └─── Commands (DiscoverNow, GetStats)
//! ```
//!
//! Monitors are spawned on child tokens of the discovery token and clean up
//! after themselves; the loop never tears them down.

use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metric::ApplicationIdentity;

use super::app_monitor::{AppMonitorHandle, MonitorContext};
use super::messages::{DiscoveryCommand, DiscoveryStats};

/// The only way the discovery loop ends
#[derive(Debug, Error, PartialEq, Eq)]
#[error("discovery cancelled")]
pub struct Cancelled;

pub struct DiscoveryActor {
    org: String,
    space: String,
    ctx: MonitorContext,
    interval: Duration,
    command_rx: mpsc::Receiver<DiscoveryCommand>,
    stats: DiscoveryStats,
}

impl DiscoveryActor {
    pub fn new(
        org: impl Into<String>,
        space: impl Into<String>,
        ctx: MonitorContext,
        interval: Duration,
        command_rx: mpsc::Receiver<DiscoveryCommand>,
    ) -> Self {
        Self {
            org: org.into(),
            space: space.into(),
            ctx,
            interval,
            command_rx,
            stats: DiscoveryStats::default(),
        }
    }

    /// Run until `cancel` fires. Always ends with [`Cancelled`].
    #[instrument(skip_all, fields(org = %self.org, space = %self.space))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), Cancelled> {
        info!("starting discovery every {:?}", self.interval);

        // the first scan completes before any command is served
        self.stats.ticks += 1;
        self.discover(&cancel).await;

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    self.stats.ticks += 1;
                    self.discover(&cancel).await;
                }

                Some(cmd) = self.command_rx.recv() => match cmd {
                    DiscoveryCommand::DiscoverNow { respond_to } => {
                        debug!("received DiscoverNow command");
                        let spawned = self.discover(&cancel).await;
                        let _ = respond_to.send(spawned);
                    }
                    DiscoveryCommand::GetStats { respond_to } => {
                        let mut stats = self.stats.clone();
                        stats.monitored = self.ctx.registry.len().await;
                        let _ = respond_to.send(stats);
                    }
                },
            }
        }

        info!("discovery stopped");
        Err(Cancelled)
    }

    /// List the space and spawn a monitor for every new application.
    ///
    /// Returns the number of monitors spawned.
    async fn discover(&mut self, cancel: &CancellationToken) -> usize {
        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return 0,
            listing = self.ctx.control_plane.list_applications(&self.org, &self.space) => listing,
        };

        let apps = match listing {
            Ok(apps) => apps,
            Err(e) => {
                warn!("error listing applications: {e}");
                self.stats.failed_listings += 1;
                return 0;
            }
        };

        let identities = apps
            .into_iter()
            .map(|app| ApplicationIdentity::new(&self.org, &self.space, app.guid, app.name));

        let ctx = self.ctx.clone();
        let spawned = ctx
            .registry
            .insert_new(identities, |app| {
                debug!("spawning monitor for {app}");
                AppMonitorHandle::spawn(app, ctx.clone(), cancel.child_token());
            })
            .await;

        if spawned > 0 {
            info!("now monitoring {spawned} new application(s)");
        }
        self.stats.monitors_spawned += spawned as u64;
        spawned
    }
}

/// Handle for controlling a DiscoveryActor
pub struct DiscoveryHandle {
    sender: mpsc::Sender<DiscoveryCommand>,
    cancel: CancellationToken,
    join: JoinHandle<Result<(), Cancelled>>,
}

impl DiscoveryHandle {
    /// Spawn the discovery loop on `cancel`.
    pub fn spawn(
        org: impl Into<String>,
        space: impl Into<String>,
        ctx: MonitorContext,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = DiscoveryActor::new(org, space, ctx, interval, cmd_rx);
        let join = tokio::spawn(actor.run(cancel.clone()));

        Self {
            sender: cmd_tx,
            cancel,
            join,
        }
    }

    /// Scan right away, returning the number of monitors spawned
    pub async fn discover_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DiscoveryCommand::DiscoverNow { respond_to: tx })
            .await
            .context("failed to send DiscoverNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn stats(&self) -> Result<DiscoveryStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DiscoveryCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Cancel the loop and every monitor it spawned, then wait for the loop.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        match self.join.await.context("discovery task failed")? {
            Ok(()) | Err(Cancelled) => Ok(()),
        }
    }
}
