//! Wire format of stream envelopes (dropsonde protobuf).
//!
//! Only the envelope kinds the agent translates are modelled; other
//! payloads are skipped by the decoder as unknown fields.

use prost::Message;
use uuid::Uuid;

use super::{ContainerSample, HttpSample, PeerType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    HttpStartStop = 4,
    LogMessage = 5,
    ValueMetric = 6,
    CounterEvent = 7,
    Error = 8,
    ContainerMetric = 9,
}

#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(string, optional, tag = "1")]
    pub origin: Option<String>,
    #[prost(enumeration = "EventType", optional, tag = "2")]
    pub event_type: Option<i32>,
    #[prost(int64, optional, tag = "6")]
    pub timestamp: Option<i64>,
    #[prost(message, optional, tag = "7")]
    pub http_start_stop: Option<HttpStartStop>,
    #[prost(message, optional, tag = "12")]
    pub container_metric: Option<ContainerMetric>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContainerMetric {
    #[prost(string, optional, tag = "1")]
    pub application_id: Option<String>,
    #[prost(int32, optional, tag = "2")]
    pub instance_index: Option<i32>,
    #[prost(double, optional, tag = "3")]
    pub cpu_percentage: Option<f64>,
    #[prost(uint64, optional, tag = "4")]
    pub memory_bytes: Option<u64>,
    #[prost(uint64, optional, tag = "5")]
    pub disk_bytes: Option<u64>,
    #[prost(uint64, optional, tag = "6")]
    pub memory_bytes_quota: Option<u64>,
    #[prost(uint64, optional, tag = "7")]
    pub disk_bytes_quota: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct HttpStartStop {
    #[prost(int64, optional, tag = "1")]
    pub start_timestamp: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub stop_timestamp: Option<i64>,
    #[prost(message, optional, tag = "3")]
    pub request_id: Option<ProtoUuid>,
    #[prost(int32, optional, tag = "4")]
    pub peer_type: Option<i32>,
    #[prost(int32, optional, tag = "5")]
    pub method: Option<i32>,
    #[prost(string, optional, tag = "6")]
    pub uri: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub remote_address: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub user_agent: Option<String>,
    #[prost(int32, optional, tag = "9")]
    pub status_code: Option<i32>,
    #[prost(int64, optional, tag = "10")]
    pub content_length: Option<i64>,
    #[prost(message, optional, tag = "12")]
    pub application_id: Option<ProtoUuid>,
    #[prost(int32, optional, tag = "13")]
    pub instance_index: Option<i32>,
    #[prost(string, optional, tag = "14")]
    pub instance_id: Option<String>,
}

/// UUID as two little-endian 64-bit halves
#[derive(Clone, Copy, PartialEq, Message)]
pub struct ProtoUuid {
    #[prost(uint64, optional, tag = "1")]
    pub low: Option<u64>,
    #[prost(uint64, optional, tag = "2")]
    pub high: Option<u64>,
}

impl From<ProtoUuid> for Uuid {
    fn from(id: ProtoUuid) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&id.low.unwrap_or_default().to_le_bytes());
        bytes[8..].copy_from_slice(&id.high.unwrap_or_default().to_le_bytes());
        Uuid::from_bytes(bytes)
    }
}

impl From<Uuid> for ProtoUuid {
    fn from(id: Uuid) -> Self {
        let bytes = id.as_bytes();
        let (low, high) = bytes.split_at(8);
        let half = |b: &[u8]| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(b);
            u64::from_le_bytes(buf)
        };
        ProtoUuid {
            low: Some(half(low)),
            high: Some(half(high)),
        }
    }
}

/// Name of an HTTP method code. Unknown codes are rendered as numbers.
pub fn method_name(code: i32) -> String {
    let name = match code {
        1 => "GET",
        2 => "POST",
        3 => "PUT",
        4 => "DELETE",
        5 => "HEAD",
        6 => "ACL",
        7 => "BASELINE_CONTROL",
        8 => "BIND",
        9 => "CHECKIN",
        10 => "CHECKOUT",
        11 => "CONNECT",
        12 => "COPY",
        13 => "DEBUG",
        14 => "LABEL",
        15 => "LINK",
        16 => "LOCK",
        17 => "MERGE",
        18 => "MKACTIVITY",
        19 => "MKCALENDAR",
        20 => "MKCOL",
        21 => "MKREDIRECTREF",
        22 => "MKWORKSPACE",
        23 => "MOVE",
        24 => "OPTIONS",
        25 => "ORDERPATCH",
        26 => "PATCH",
        27 => "PRI",
        28 => "PROPFIND",
        29 => "PROPPATCH",
        30 => "REBIND",
        31 => "REPORT",
        32 => "SEARCH",
        33 => "SHOWMETHOD",
        34 => "SPACEJUMP",
        35 => "TEXTSEARCH",
        36 => "TRACE",
        37 => "TRACK",
        38 => "UNBIND",
        39 => "UNCHECKOUT",
        40 => "UNLINK",
        41 => "UNLOCK",
        42 => "UPDATE",
        43 => "UPDATEREDIRECTREF",
        44 => "VERSION_CONTROL",
        _ => return code.to_string(),
    };
    name.to_string()
}

impl From<ContainerMetric> for ContainerSample {
    fn from(m: ContainerMetric) -> Self {
        ContainerSample {
            instance_index: m.instance_index.unwrap_or_default(),
            cpu_percentage: m.cpu_percentage.unwrap_or_default(),
            memory_bytes: m.memory_bytes.unwrap_or_default(),
            memory_bytes_quota: m.memory_bytes_quota.unwrap_or_default(),
            disk_bytes: m.disk_bytes.unwrap_or_default(),
            disk_bytes_quota: m.disk_bytes_quota.unwrap_or_default(),
        }
    }
}

impl From<HttpStartStop> for HttpSample {
    fn from(h: HttpStartStop) -> Self {
        let peer_type = match h.peer_type {
            Some(1) => PeerType::Client,
            Some(2) => PeerType::Server,
            _ => PeerType::Unknown,
        };

        HttpSample {
            start_timestamp: h.start_timestamp.unwrap_or_default(),
            stop_timestamp: h.stop_timestamp.unwrap_or_default(),
            request_id: h.request_id.map(Uuid::from),
            peer_type,
            method: method_name(h.method.unwrap_or_default()),
            status_code: h.status_code.unwrap_or_default(),
            content_length: h.content_length.unwrap_or_default(),
            instance_index: h.instance_index.unwrap_or_default(),
        }
    }
}

impl From<Envelope> for super::Envelope {
    fn from(envelope: Envelope) -> Self {
        match envelope.event_type.and_then(|t| EventType::try_from(t).ok()) {
            Some(EventType::ContainerMetric) => envelope
                .container_metric
                .map_or(super::Envelope::Other, |m| super::Envelope::Container(m.into())),
            Some(EventType::HttpStartStop) => envelope
                .http_start_stop
                .map_or(super::Envelope::Other, |h| super::Envelope::Http(h.into())),
            _ => super::Envelope::Other,
        }
    }
}

/// Decode one binary websocket frame.
pub fn decode(frame: &[u8]) -> Result<super::Envelope, prost::DecodeError> {
    Envelope::decode(frame).map(Into::into)
}
