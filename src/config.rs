use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use crate::sink::SinkAddress;

/// Agent configuration
///
/// Loaded from a JSON file and/or the command line, then handed to
/// [`crate::agent::run`] as a single value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Which platform to watch and how to authenticate against it
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Address of the Cloud Foundry API
    #[serde(default = "default_api")]
    pub api: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Pre-issued OAuth2 access token, alternative to username/password
    pub access_token: Option<String>,

    /// Refresh token used together with `access_token`
    pub refresh_token: Option<String>,

    /// Skip TLS certificate validation of the API
    #[serde(default)]
    pub insecure: bool,

    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub space: String,

    /// Timeout of every control-plane call in seconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            api: default_api(),
            username: None,
            password: None,
            access_token: None,
            refresh_token: None,
            insecure: false,
            org: String::new(),
            space: String::new(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl TargetConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    fn has_credentials(&self) -> bool {
        let password = self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.is_some();
        let token = self.access_token.as_deref().is_some_and(|t| !t.is_empty());
        password || token
    }

    /// Take API, tokens, org and space from the cf CLI's current target.
    pub fn apply_cf_cli(&mut self, cli: CfCliConfig) {
        self.api = cli.target;
        self.access_token = Some(cli.access_token).filter(|t| !t.is_empty());
        self.refresh_token = Some(cli.refresh_token).filter(|t| !t.is_empty());
        self.insecure = cli.ssl_disabled;
        self.org = cli.organization.name;
        self.space = cli.space.name;
    }
}

/// Where and how metrics are delivered
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Riemann endpoint, `tcp://host:port` or `udp://host:port`
    #[serde(default = "default_sink_address")]
    pub address: String,

    /// TTL of emitted events in seconds
    #[serde(default = "default_ttl")]
    pub ttl_secs: f32,

    /// Number of events kept in memory while the sink is slow or down
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            address: default_sink_address(),
            ttl_secs: default_ttl(),
            queue_size: default_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between two listings of the space
    #[serde(default = "default_interval")]
    pub discovery_interval_secs: u64,

    /// Seconds between two summary/event polls of one application
    #[serde(default = "default_interval")]
    pub poll_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            discovery_interval_secs: default_interval(),
            poll_interval_secs: default_interval(),
        }
    }
}

impl MonitorConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_api() -> String {
    "https://api.bosh-lite.com".to_string()
}

fn default_rpc_timeout() -> u64 {
    15
}

fn default_sink_address() -> String {
    "tcp://127.0.0.1:5555".to_string()
}

fn default_ttl() -> f32 {
    30.0
}

fn default_queue_size() -> usize {
    256
}

fn default_interval() -> u64 {
    5
}

/// Reasons a configuration is rejected before startup
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no organization configured")]
    MissingOrg,

    #[error("no space configured")]
    MissingSpace,

    #[error("either username and password or an access token must be provided")]
    MissingCredentials,

    #[error("queue size must be at least 1")]
    InvalidQueueSize,

    #[error("{0} must be at least one second")]
    InvalidInterval(&'static str),

    #[error("event TTL must be a positive number of seconds")]
    InvalidTtl,

    #[error("invalid sink address {address}: {reason}")]
    InvalidSinkAddress { address: String, reason: String },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.org.is_empty() {
            return Err(ConfigError::MissingOrg);
        }
        if self.target.space.is_empty() {
            return Err(ConfigError::MissingSpace);
        }
        if !self.target.has_credentials() {
            return Err(ConfigError::MissingCredentials);
        }
        if self.target.rpc_timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval("rpc timeout"));
        }
        if self.sink.queue_size == 0 {
            return Err(ConfigError::InvalidQueueSize);
        }
        if !(self.sink.ttl_secs.is_finite() && self.sink.ttl_secs > 0.0) {
            return Err(ConfigError::InvalidTtl);
        }
        if self.monitor.discovery_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("discovery interval"));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("poll interval"));
        }
        SinkAddress::parse(&self.sink.address).map_err(|e| ConfigError::InvalidSinkAddress {
            address: self.sink.address.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// The parts of the cf CLI's `config.json` the agent cares about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CfCliConfig {
    #[serde(rename = "Target", default)]
    pub target: String,

    #[serde(rename = "SSLDisabled", default)]
    pub ssl_disabled: bool,

    #[serde(rename = "AccessToken", default)]
    pub access_token: String,

    #[serde(rename = "RefreshToken", default)]
    pub refresh_token: String,

    #[serde(rename = "OrganizationFields", default)]
    pub organization: CfCliNamed,

    #[serde(rename = "SpaceFields", default)]
    pub space: CfCliNamed,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CfCliNamed {
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// Location of the cf CLI configuration: `$CF_HOME/.cf/config.json`,
/// falling back to the user's home directory.
pub fn cf_cli_config_path() -> Option<PathBuf> {
    crate::util::cf_home().map(|home| home.join(".cf").join("config.json"))
}

pub fn read_cf_cli_config(path: &Path) -> anyhow::Result<CfCliConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("error opening {}", path.display()))?;
    serde_json::from_str(&content).context("error decoding cf CLI config file content")
}
