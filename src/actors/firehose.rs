//! FirehoseActor - consumes the envelope stream of one application
//!
//! Spawned by the application's monitor on a child cancellation token.
//! It ends on its own when no token can be obtained or the stream closes;
//! the monitor restarts it on a later tick.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::cloudfoundry::TokenSource;
use crate::firehose::{Envelope, EnvelopeStream, StreamChannels};
use crate::metric::ApplicationIdentity;
use crate::telemetry::TelemetrySource;

use super::emitter::Emitter;
use super::messages::FirehoseExit;

pub struct FirehoseActor {
    app: ApplicationIdentity,
    tokens: Arc<dyn TokenSource>,
    stream: Arc<dyn EnvelopeStream>,
    emitter: Emitter,
    cancel: CancellationToken,
}

impl FirehoseActor {
    pub fn new(
        app: ApplicationIdentity,
        tokens: Arc<dyn TokenSource>,
        stream: Arc<dyn EnvelopeStream>,
        emitter: Emitter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            app,
            tokens,
            stream,
            emitter,
            cancel,
        }
    }

    #[instrument(skip(self), fields(app = %self.app.name, guid = %self.app.guid))]
    pub async fn run(self) -> FirehoseExit {
        let token = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return FirehoseExit::Cancelled,
            token = self.tokens.token() => token,
        };
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                debug!("no token for the stream: {e}");
                return FirehoseExit::CredentialsUnavailable;
            }
        };

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return FirehoseExit::Cancelled,
            opened = self.stream.stream(&self.app.guid, &token) => opened,
        };
        let StreamChannels {
            mut envelopes,
            mut errors,
        } = match opened {
            Ok(channels) => channels,
            Err(e) => {
                warn!("error opening stream: {e}");
                return FirehoseExit::OpenFailed;
            }
        };
        debug!("consuming stream");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    trace!("stream consumer cancelled");
                    return FirehoseExit::Cancelled;
                }
                envelope = envelopes.recv() => match envelope {
                    Some(envelope) => self.handle(envelope),
                    None => {
                        // the reader reports its last error right before closing
                        while let Ok(e) = errors.try_recv() {
                            warn!("stream error: {e}");
                        }
                        debug!("stream closed");
                        return FirehoseExit::StreamClosed;
                    }
                },
                error = errors.recv() => match error {
                    Some(e) => warn!("stream error: {e}"),
                    None => {
                        debug!("stream error channel closed");
                        return FirehoseExit::StreamClosed;
                    }
                },
            }
        }
    }

    fn handle(&self, envelope: Envelope) {
        let source = match envelope {
            Envelope::Container(sample) => TelemetrySource::Container(sample),
            Envelope::Http(sample) => TelemetrySource::Http(sample),
            Envelope::Other => return,
        };

        for metric in source.translate(&self.app) {
            self.emitter.emit(metric);
        }
    }
}
