//! Wiring of the agent
//!
//! Performs the startup steps that may fail fatally, then runs discovery
//! until the root token is cancelled.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::actors::app_monitor::MonitorContext;
use crate::actors::discovery::DiscoveryHandle;
use crate::actors::emitter::Emitter;
use crate::actors::registry::MonitoredSet;
use crate::cloudfoundry::client::CloudFoundryClient;
use crate::config::Config;
use crate::firehose::doppler::DopplerStream;
use crate::sink::SinkAddress;
use crate::sink::riemann::RiemannSink;

#[instrument(skip_all, fields(org = %config.target.org, space = %config.target.space))]
pub async fn run(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let Config {
        target,
        sink,
        monitor,
    } = config;

    let client = CloudFoundryClient::connect(&target)
        .await
        .with_context(|| format!("error connecting to {}", target.api))?;

    let tokens = client.token_source();
    tokens
        .token()
        .await
        .context("error obtaining an access token")?;

    let space_guid = client
        .resolve_space(&target.org, &target.space)
        .await
        .context("error resolving space")?;
    debug!("space {} has guid {space_guid}", target.space);

    let doppler = client
        .doppler_endpoint()
        .map(str::to_owned)
        .context("the platform does not advertise a doppler endpoint")?;

    let address = SinkAddress::parse(&sink.address)?;
    let (emitter, delivery) = Emitter::initialize(
        Box::new(RiemannSink::new(address)),
        sink.ttl_secs,
        sink.queue_size,
    );

    let ctx = MonitorContext {
        control_plane: Arc::new(client),
        tokens,
        stream: Arc::new(DopplerStream::new(doppler)),
        emitter: emitter.clone(),
        registry: MonitoredSet::new(),
        poll_interval: monitor.poll_interval(),
    };

    info!("forwarding metrics to {}", sink.address);
    let discovery = DiscoveryHandle::spawn(
        target.org,
        target.space,
        ctx,
        monitor.discovery_interval(),
        cancel.child_token(),
    );

    cancel.cancelled().await;
    info!("shutting down");

    discovery.shutdown().await?;
    emitter.close();
    delivery.await.context("delivery task failed")?;

    let stats = emitter.stats();
    info!(
        "delivered {} events, {} failed, {} shed",
        stats.delivered(),
        stats.failed(),
        stats.shed()
    );
    Ok(())
}
