//! Riemann sink
//!
//! Events are wrapped in a protobuf `Msg`. Over TCP every message is
//! prefixed with its length as a 4-byte big-endian integer and answered by
//! an acknowledgement `Msg`; over UDP each message is a single datagram with
//! no acknowledgement.

use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::{Network, Sink, SinkAddress, SinkError, SinkEvent};
use crate::metric::MetricValue;

/// Connect timeout of the riemann client
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Acknowledgements larger than this are treated as garbage
const MAX_ACK_SIZE: u32 = 1024 * 1024;

#[derive(Clone, PartialEq, Message)]
pub struct Msg {
    #[prost(bool, optional, tag = "2")]
    pub ok: Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
    #[prost(message, repeated, tag = "6")]
    pub events: Vec<Event>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Event {
    #[prost(int64, optional, tag = "1")]
    pub time: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub state: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub service: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub host: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(string, repeated, tag = "7")]
    pub tags: Vec<String>,
    #[prost(float, optional, tag = "8")]
    pub ttl: Option<f32>,
    #[prost(message, repeated, tag = "9")]
    pub attributes: Vec<Attribute>,
    #[prost(sint64, optional, tag = "13")]
    pub metric_sint64: Option<i64>,
    #[prost(double, optional, tag = "14")]
    pub metric_d: Option<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Attribute {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

impl From<&SinkEvent> for Event {
    fn from(event: &SinkEvent) -> Self {
        let (metric_sint64, metric_d) = match event.metric {
            MetricValue::Int(v) => (Some(v), None),
            MetricValue::Float(v) => (None, Some(v)),
        };

        Event {
            time: Some(event.time),
            state: Some(event.state.clone()),
            service: Some(event.service.clone()),
            host: Some(event.host.clone()),
            ttl: Some(event.ttl),
            attributes: event
                .attributes
                .iter()
                .map(|(key, value)| Attribute {
                    key: key.clone(),
                    value: Some(value.clone()),
                })
                .collect(),
            metric_sint64,
            metric_d,
            ..Default::default()
        }
    }
}

enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Riemann client owned by the emitter's delivery task
pub struct RiemannSink {
    address: SinkAddress,

    /// Bound on connecting and on waiting for an acknowledgement
    io_timeout: Duration,

    conn: Option<Connection>,
}

impl RiemannSink {
    pub fn new(address: SinkAddress) -> Self {
        Self {
            address,
            io_timeout: DIAL_TIMEOUT,
            conn: None,
        }
    }

    pub fn with_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    async fn send_tcp(stream: &mut TcpStream, payload: &[u8]) -> Result<(), SinkError> {
        let len = u32::try_from(payload.len())
            .map_err(|_| SinkError::Rejected("message too large".to_string()))?;
        stream.write_u32(len).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;

        let ack_len = stream.read_u32().await?;
        if ack_len > MAX_ACK_SIZE {
            return Err(SinkError::Rejected(format!(
                "acknowledgement of {ack_len} bytes"
            )));
        }
        let mut buf = vec![0; ack_len as usize];
        stream.read_exact(&mut buf).await?;

        let ack = Msg::decode(buf.as_slice())?;
        if ack.ok == Some(false) {
            return Err(SinkError::Rejected(ack.error.unwrap_or_default()));
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for RiemannSink {
    async fn connect(&mut self) -> Result<(), SinkError> {
        let host = self.address.host.as_str();
        debug!("connecting to riemann at {}", self.address);

        let conn = match self.address.network {
            Network::Tcp => {
                let stream = timeout(self.io_timeout, TcpStream::connect(host))
                    .await
                    .map_err(|_| SinkError::ConnectTimeout(self.address.to_string()))?
                    .map_err(|source| SinkError::Connect {
                        address: self.address.to_string(),
                        source,
                    })?;
                stream.set_nodelay(true)?;
                Connection::Tcp(stream)
            }
            Network::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket
                    .connect(host)
                    .await
                    .map_err(|source| SinkError::Connect {
                        address: self.address.to_string(),
                        source,
                    })?;
                Connection::Udp(socket)
            }
        };

        self.conn = Some(conn);
        Ok(())
    }

    async fn send(&mut self, event: &SinkEvent) -> Result<(), SinkError> {
        let msg = Msg {
            events: vec![Event::from(event)],
            ..Default::default()
        };
        let payload = msg.encode_to_vec();
        trace!("sending {} bytes to riemann", payload.len());

        match self.conn.as_mut() {
            Some(Connection::Tcp(stream)) => {
                timeout(self.io_timeout, Self::send_tcp(stream, &payload))
                    .await
                    .map_err(|_| SinkError::Timeout)?
            }
            Some(Connection::Udp(socket)) => {
                socket.send(&payload).await?;
                Ok(())
            }
            None => Err(SinkError::NotConnected),
        }
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(Connection::Tcp(mut stream)) = self.conn.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
