//! Websocket envelope stream served by Doppler.
//!
//! Every call to [`DopplerStream::stream`] opens its own websocket to
//! `{endpoint}/apps/{guid}/stream` and spawns a reader task that decodes
//! binary frames into envelopes. The reader stops when the socket closes
//! or when the consumer drops the envelope receiver. There is no
//! reconnect; the caller opens a new stream instead.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::{debug, instrument, trace};

use super::{Envelope, EnvelopeStream, StreamChannels, StreamError, proto};

const CHANNEL_CAPACITY: usize = 64;

pub struct DopplerStream {
    endpoint: String,
}

impl DopplerStream {
    /// `endpoint` is the Doppler logging endpoint advertised by `/v2/info`,
    /// e.g. `wss://doppler.example.com:443`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn stream_url(&self, guid: &str) -> Result<url::Url, StreamError> {
        let raw = format!("{}/apps/{guid}/stream", self.endpoint.trim_end_matches('/'));
        let url = url::Url::parse(&raw).map_err(|e| StreamError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(StreamError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme {other:?}"),
            }),
        }
    }
}

#[async_trait]
impl EnvelopeStream for DopplerStream {
    #[instrument(skip(self, token))]
    async fn stream(&self, guid: &str, token: &str) -> Result<StreamChannels, StreamError> {
        let url = self.stream_url(guid)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(StreamError::Connect)?;
        let bearer = HeaderValue::from_str(&format!("bearer {token}")).map_err(|e| {
            StreamError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unusable token: {e}"),
            }
        })?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, _) = connect_async(request)
            .await
            .map_err(StreamError::Connect)?;
        debug!("stream opened");

        let (envelope_tx, error_tx, channels) = StreamChannels::bounded(CHANNEL_CAPACITY);
        tokio::spawn(read_frames(ws, envelope_tx, error_tx));

        Ok(channels)
    }
}

async fn read_frames<S>(
    mut ws: tokio_tungstenite::WebSocketStream<S>,
    envelope_tx: mpsc::Sender<Envelope>,
    error_tx: mpsc::Sender<StreamError>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = envelope_tx.closed() => break,
            frame = ws.next() => frame,
        };

        match frame {
            Some(Ok(Message::Binary(data))) => match proto::decode(&data) {
                Ok(envelope) => {
                    if envelope_tx.send(envelope).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    if error_tx.send(e.into()).await.is_err() {
                        break;
                    }
                }
            },
            Some(Ok(Message::Text(_))) => {
                if error_tx
                    .send(StreamError::UnexpectedFrame("text"))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let _ = error_tx.send(StreamError::Read(e)).await;
                break;
            }
        }
    }

    let _ = ws.close(None).await;
    trace!("stream reader stopped");
}
