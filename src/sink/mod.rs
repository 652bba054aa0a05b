//! Downstream monitoring sink
//!
//! The emitter's delivery task owns exactly one [`Sink`] and drives it
//! through `connect` → `send`* → `close`. Any failure is an ordinary
//! [`SinkError`]; reconnecting is the caller's business.
//!
//! ## Backends
//!
//! - **Riemann** ([`riemann::RiemannSink`]): protobuf events over TCP or UDP

pub mod riemann;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::metric::{
    ATTR_APPLICATION, ATTR_APPLICATION_ID, ATTR_ORG, ATTR_SPACE, Metric, MetricValue,
};

/// An event ready to be written to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEvent {
    /// Host the event is reported for (the application name)
    pub host: String,

    pub service: String,

    pub state: String,

    pub metric: MetricValue,

    /// Unix timestamp in seconds
    pub time: i64,

    /// Seconds the value stays valid
    pub ttl: f32,

    pub attributes: BTreeMap<String, String>,
}

impl SinkEvent {
    /// Build the sink event for `metric`.
    ///
    /// A missing time becomes `now` and a missing TTL becomes `default_ttl`.
    /// The identity attributes always reflect the metric's identity fields,
    /// whatever the producer put into the attribute map.
    pub fn from_metric(metric: Metric, default_ttl: f32, now: DateTime<Utc>) -> Self {
        let mut attributes = metric.attributes;
        attributes.insert(ATTR_APPLICATION.to_string(), metric.application.clone());
        attributes.insert(ATTR_APPLICATION_ID.to_string(), metric.application_id);
        attributes.insert(ATTR_ORG.to_string(), metric.organization);
        attributes.insert(ATTR_SPACE.to_string(), metric.space);

        Self {
            host: metric.application,
            service: metric.service,
            state: metric.state.as_str().to_string(),
            metric: metric.value,
            time: metric.time.unwrap_or(now).timestamp(),
            ttl: metric.ttl.unwrap_or(default_ttl),
            attributes,
        }
    }
}

/// Errors reported by sink implementations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("error connecting to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for the sink")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    /// The sink acknowledged the message with an error
    #[error("sink rejected the event: {0}")]
    Rejected(String),

    #[error("malformed response from sink: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("invalid sink address: {0}")]
    InvalidAddress(String),
}

/// A connect/send/close sink.
///
/// Owned by a single task, hence `&mut self` and no `Sync` bound.
#[async_trait]
pub trait Sink: Send {
    async fn connect(&mut self) -> Result<(), SinkError>;

    async fn send(&mut self, event: &SinkEvent) -> Result<(), SinkError>;

    async fn close(&mut self) -> Result<(), SinkError>;
}

/// Transport of a sink address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

/// Parsed `scheme://host:port` sink address. A missing scheme means TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkAddress {
    pub network: Network,

    /// `host:port`
    pub host: String,
}

impl SinkAddress {
    pub fn parse(address: &str) -> Result<Self, SinkError> {
        let (scheme, host) = address.split_once("://").unwrap_or(("tcp", address));

        let network = match scheme {
            "tcp" | "tcp4" | "tcp6" => Network::Tcp,
            "udp" | "udp4" | "udp6" => Network::Udp,
            other => {
                return Err(SinkError::InvalidAddress(format!(
                    "unknown network {other:?}"
                )));
            }
        };

        let host = host.trim_end_matches('/');
        let valid = host
            .rsplit_once(':')
            .is_some_and(|(name, port)| !name.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(SinkError::InvalidAddress(format!(
                "{address:?} is not of the form host:port"
            )));
        }

        Ok(Self {
            network,
            host: host.to_string(),
        })
    }
}

impl fmt::Display for SinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.network {
            Network::Tcp => "tcp",
            Network::Udp => "udp",
        };
        write!(f, "{scheme}://{}", self.host)
    }
}
