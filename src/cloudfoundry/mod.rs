//! Cloud Foundry control plane
//!
//! This module defines the seam between the monitoring engine and the
//! platform API. The engine only talks to the [`ControlPlane`] and
//! [`TokenSource`] traits; [`client::CloudFoundryClient`] and
//! [`token::OAuthTokenSource`] are the concrete v2 API implementations.
//!
//! ## Operations
//!
//! - **list_applications**: applications in an org/space
//! - **application_summary**: instance counts and state, `NotFound` on 404
//! - **events_since**: lifecycle events newer than a timestamp, oldest first

pub mod client;
pub mod error;
pub mod model;
pub mod token;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::{ControlPlaneError, TokenError};

/// An application as returned by the space listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRef {
    pub guid: String,
    pub name: String,
}

/// Instance counts and state of one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSummary {
    pub name: String,

    /// Number of instances the application is configured to run
    pub instances: u32,

    /// Number of instances currently running
    pub running_instances: u32,

    /// Desired state (`STARTED`, `STOPPED`)
    pub state: String,
}

/// A lifecycle event recorded by the platform for an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEvent {
    /// Event type, e.g. `audit.app.update`
    pub event_type: String,
    pub actor_name: String,
    pub actor_type: String,
    pub actee_name: String,
    pub actee_type: String,

    /// When the event happened on the platform
    pub timestamp: DateTime<Utc>,
}

/// Platform API used by the discovery loop and the per-application monitors.
///
/// Implementations must bound every call with a timeout; the engine never
/// wraps them in one.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List the applications deployed in `space` of `org`.
    async fn list_applications(
        &self,
        org: &str,
        space: &str,
    ) -> Result<Vec<AppRef>, ControlPlaneError>;

    /// Fetch the summary of an application.
    ///
    /// Must return [`ControlPlaneError::NotFound`] when the application no
    /// longer exists.
    async fn application_summary(&self, guid: &str) -> Result<AppSummary, ControlPlaneError>;

    /// Fetch events whose actee is `guid` and whose timestamp is strictly
    /// greater than `since`, in the order they occurred.
    async fn events_since(
        &self,
        guid: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AppEvent>, ControlPlaneError>;
}

/// Produces bearer credentials on demand.
///
/// Tokens are short-lived; callers ask for one per (re)connection instead of
/// holding on to it.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, TokenError>;
}
