//! Canonical metric record shared by every telemetry source.
//!
//! Translators build [`Metric`] values for a single [`ApplicationIdentity`];
//! the emitter turns them into sink events.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a monitored application.
///
/// `guid` is the uniqueness field; org, space and name are descriptive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationIdentity {
    pub org: String,
    pub space: String,
    pub guid: String,
    pub name: String,
}

impl ApplicationIdentity {
    pub fn new(
        org: impl Into<String>,
        space: impl Into<String>,
        guid: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            org: org.into(),
            space: space.into(),
            guid: guid.into(),
            name: name.into(),
        }
    }

    /// Attributes identifying the application on every emitted event.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ATTR_APPLICATION.to_string(), self.name.clone()),
            (ATTR_APPLICATION_ID.to_string(), self.guid.clone()),
            (ATTR_ORG.to_string(), self.org.clone()),
            (ATTR_SPACE.to_string(), self.space.clone()),
        ])
    }
}

impl fmt::Display for ApplicationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{} ({})", self.org, self.space, self.name, self.guid)
    }
}

pub const ATTR_APPLICATION: &str = "application";
pub const ATTR_APPLICATION_ID: &str = "application_id";
pub const ATTR_ORG: &str = "org";
pub const ATTR_SPACE: &str = "space";

/// Numeric value of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Int(v) => *v as f64,
            MetricValue::Float(v) => *v,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Int(crate::util::saturating_i64(value))
    }
}

impl From<u32> for MetricValue {
    fn from(value: u32) -> Self {
        MetricValue::Int(value.into())
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Health state carried by a metric.
///
/// The sink accepts free text, so anything outside the well-known states is
/// kept verbatim in [`State::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum State {
    Ok,
    Warn,
    Critical,
    Other(String),
}

impl State {
    pub fn as_str(&self) -> &str {
        match self {
            State::Ok => "ok",
            State::Warn => "warn",
            State::Critical => "critical",
            State::Other(s) => s,
        }
    }
}

impl From<String> for State {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ok" => State::Ok,
            "warn" => State::Warn,
            "critical" => State::Critical,
            _ => State::Other(value),
        }
    }
}

impl From<State> for String {
    fn from(value: State) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single telemetry record for one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Application name
    pub application: String,

    /// Application guid
    pub application_id: String,

    pub organization: String,

    pub space: String,

    /// When the measurement happened. `None` means "now" at emission time.
    pub time: Option<DateTime<Utc>>,

    /// Service name, e.g. `memory used_bytes`
    pub service: String,

    pub value: MetricValue,

    pub state: State,

    pub attributes: BTreeMap<String, String>,

    /// Time-to-live hint in seconds. `None` means the emitter default.
    pub ttl: Option<f32>,
}

impl Metric {
    /// Create a metric for `app` carrying its identity attributes.
    pub fn for_app(
        app: &ApplicationIdentity,
        service: impl Into<String>,
        value: impl Into<MetricValue>,
        state: State,
    ) -> Self {
        Self {
            application: app.name.clone(),
            application_id: app.guid.clone(),
            organization: app.org.clone(),
            space: app.space.clone(),
            time: None,
            service: service.into(),
            value: value.into(),
            state,
            attributes: app.attributes(),
            ttl: None,
        }
    }

    /// Add attributes on top of the identity attributes.
    pub fn with_attributes(mut self, attributes: &BTreeMap<String, String>) -> Self {
        self.attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_ttl(mut self, ttl: f32) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
