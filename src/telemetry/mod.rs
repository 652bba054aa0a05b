//! Telemetry translators
//!
//! Pure functions turning raw payloads of one application into [`Metric`]
//! records. Every record carries the identity attributes of the
//! application; source-specific attributes are layered on top.
//!
//! | Source | Services |
//! |---|---|
//! | application summary | `instance running_count`, `instance configured_count` |
//! | lifecycle event | `app event` |
//! | container envelope | `memory *`, `disk *`, `cpu_percent` |
//! | HTTP envelope | `http response time_ms`, `http response content_length_bytes` |

pub mod container;
pub mod event;
pub mod http;
pub mod summary;

use crate::cloudfoundry::{AppEvent, AppSummary};
use crate::firehose::{ContainerSample, HttpSample};
use crate::metric::{ApplicationIdentity, Metric};

/// A raw payload collected for one application
#[derive(Debug, Clone)]
pub enum TelemetrySource {
    Summary(AppSummary),
    Event(AppEvent),
    Container(ContainerSample),
    Http(HttpSample),
}

impl TelemetrySource {
    pub fn translate(&self, app: &ApplicationIdentity) -> Vec<Metric> {
        match self {
            TelemetrySource::Summary(s) => summary::summary_metrics(app, s),
            TelemetrySource::Event(e) => vec![event::event_metric(app, e)],
            TelemetrySource::Container(c) => container::container_metrics(app, c),
            TelemetrySource::Http(h) => http::http_metrics(app, h),
        }
    }
}
