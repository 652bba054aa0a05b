use anyhow::Context;
use appwatch::config::{Config, cf_cli_config_path, read_cf_cli_config, read_config_file};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Watches the applications of a Cloud Foundry space and forwards their
/// metrics to Riemann.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Args {
    /// JSON config file; command line options override its values
    #[arg(short, long)]
    file: Option<String>,

    /// Take API, tokens, org and space from the cf CLI's current target
    #[arg(long)]
    use_cf_cli_target: bool,

    /// Address of the Cloud Foundry API
    #[arg(long, env = "CF_API")]
    api: Option<String>,

    #[arg(long, env = "CF_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "CF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// OAuth2 access token, alternative to username and password
    #[arg(long, env = "CF_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long, env = "CF_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    /// Skip TLS certificate validation of the API
    #[arg(long)]
    insecure: bool,

    #[arg(long, env = "CF_ORG")]
    org: Option<String>,

    #[arg(long, env = "CF_SPACE")]
    space: Option<String>,

    /// Riemann address, tcp://host:port or udp://host:port
    #[arg(long, env = "RIEMANN_ADDRESS")]
    riemann: Option<String>,

    /// TTL of emitted events in seconds
    #[arg(long)]
    ttl: Option<f32>,

    /// Capacity of the outbound event queue
    #[arg(long)]
    queue_size: Option<usize>,

    /// Seconds between two listings of the space
    #[arg(long)]
    discovery_interval: Option<u64>,

    /// Seconds between two polls of an application
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Timeout of control-plane calls in seconds
    #[arg(long)]
    rpc_timeout: Option<u64>,

    /// One of trace, debug, info, warn, error, off
    #[arg(long, env = "APPWATCH_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.file {
            Some(file) => read_config_file(file)?,
            None => Config::default(),
        };

        if self.use_cf_cli_target {
            let path = cf_cli_config_path().context("cannot locate the cf CLI home directory")?;
            config.target.apply_cf_cli(read_cf_cli_config(&path)?);
        }

        let target = &mut config.target;
        set(&mut target.api, self.api);
        set_opt(&mut target.username, self.username);
        set_opt(&mut target.password, self.password);
        set_opt(&mut target.access_token, self.access_token);
        set_opt(&mut target.refresh_token, self.refresh_token);
        set(&mut target.org, self.org);
        set(&mut target.space, self.space);
        set(&mut target.rpc_timeout_secs, self.rpc_timeout);
        target.insecure |= self.insecure;

        set(&mut config.sink.address, self.riemann);
        set(&mut config.sink.ttl_secs, self.ttl);
        set(&mut config.sink.queue_size, self.queue_size);
        set(
            &mut config.monitor.discovery_interval_secs,
            self.discovery_interval,
        );
        set(&mut config.monitor.poll_interval_secs, self.poll_interval);

        Ok(config)
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_opt<T>(field: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *field = value;
    }
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new()
        .with_targets(vec![("appwatch", level), ("appwatch_agent", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let level: LevelFilter = args
        .log_level
        .parse()
        .with_context(|| format!("invalid log level {:?}", args.log_level))?;
    init(level);
    trace!("config file: {:?}", args.file);

    let config = args.into_config()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received interrupt"),
            Err(e) => {
                warn!("cannot listen for interrupts: {e}");
                return;
            }
        }
        on_signal.cancel();
    });

    appwatch::agent::run(config, cancel).await
}
