//! Application event stream
//!
//! A per-application monitor subscribes to the stream of container and
//! HTTP envelopes of its application through the [`EnvelopeStream`] trait.
//! An open stream is handed back as two channels: decoded envelopes and
//! non-fatal errors. The stream ends when either channel closes.
//!
//! [`doppler::DopplerStream`] is the websocket implementation.

pub mod doppler;
pub mod proto;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Resource usage of one application instance
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSample {
    pub instance_index: i32,
    pub cpu_percentage: f64,
    pub memory_bytes: u64,
    pub memory_bytes_quota: u64,
    pub disk_bytes: u64,
    pub disk_bytes_quota: u64,
}

/// Which side of the request emitted an HTTP envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerType {
    Client,
    Server,
    Unknown,
}

impl PeerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerType::Client => "client",
            PeerType::Server => "server",
            PeerType::Unknown => "unknown",
        }
    }
}

/// One completed HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSample {
    /// Nanoseconds since the epoch
    pub start_timestamp: i64,

    /// Nanoseconds since the epoch
    pub stop_timestamp: i64,

    pub request_id: Option<Uuid>,

    pub peer_type: PeerType,

    pub method: String,

    pub status_code: i32,

    pub content_length: i64,

    pub instance_index: i32,
}

/// A decoded stream envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Container(ContainerSample),
    Http(HttpSample),

    /// Log lines, counters and anything else the agent does not translate
    Other,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid stream endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("error opening stream: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("error reading stream: {0}")]
    Read(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("malformed envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
}

/// The two halves of an open stream
#[derive(Debug)]
pub struct StreamChannels {
    pub envelopes: mpsc::Receiver<Envelope>,
    pub errors: mpsc::Receiver<StreamError>,
}

impl StreamChannels {
    /// Create a pair of channels of the given capacity along with their
    /// sending halves.
    pub fn bounded(
        capacity: usize,
    ) -> (
        mpsc::Sender<Envelope>,
        mpsc::Sender<StreamError>,
        StreamChannels,
    ) {
        let (envelope_tx, envelopes) = mpsc::channel(capacity);
        let (error_tx, errors) = mpsc::channel(capacity);
        (envelope_tx, error_tx, StreamChannels { envelopes, errors })
    }
}

/// Opens the envelope stream of one application.
///
/// `token` is a bearer credential obtained right before the call.
#[async_trait]
pub trait EnvelopeStream: Send + Sync {
    async fn stream(&self, guid: &str, token: &str) -> Result<StreamChannels, StreamError>;
}
