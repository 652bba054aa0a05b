//! Message types for actor communication
//!
//! Commands travel over mpsc channels with oneshot responses, lifecycle
//! states over watch channels, and every task reports why it ended through
//! its join handle.

use tokio::sync::oneshot;

/// Commands that can be sent to the DiscoveryActor
#[derive(Debug)]
pub enum DiscoveryCommand {
    /// Scan the space right away instead of waiting for the next tick
    ///
    /// Responds with the number of monitors spawned by the scan.
    DiscoverNow { respond_to: oneshot::Sender<usize> },

    GetStats {
        respond_to: oneshot::Sender<DiscoveryStats>,
    },
}

/// Counters of the discovery loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Interval ticks handled so far
    pub ticks: u64,

    /// Listings that failed and were skipped
    pub failed_listings: u64,

    /// Monitors spawned since start
    pub monitors_spawned: u64,

    /// Applications currently in the monitored set
    pub monitored: usize,
}

/// Lifecycle of a per-application monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Active,

    /// Terminal. The monitor has left the monitored set.
    Stopped,
}

/// Why a per-application monitor ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The application was deleted from the platform
    NotFound,

    Cancelled,
}

/// Why a stream-consumption sub-task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirehoseExit {
    Cancelled,

    /// No bearer token could be obtained
    CredentialsUnavailable,

    /// The stream could not be opened
    OpenFailed,

    /// The data or the error channel closed
    StreamClosed,
}
