//! Wire types of the Cloud Foundry v2 API
//!
//! Only the fields the agent reads are modelled; everything else in the
//! responses is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{AppEvent, AppRef, AppSummary};

/// A page of a paginated v2 listing
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub total_results: u64,

    /// Relative URL of the next page, `None` on the last page
    pub next_url: Option<String>,

    #[serde(default)]
    pub resources: Vec<Resource<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource<T> {
    pub metadata: Metadata,
    pub entity: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub guid: String,
}

/// Entity of organizations, spaces and apps; all we need is the name
#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventEntity {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub actor_type: String,
    #[serde(default)]
    pub actor_name: String,
    #[serde(default)]
    pub actee_type: String,
    #[serde(default)]
    pub actee_name: String,
    pub timestamp: DateTime<Utc>,
}

/// `GET /v2/apps/:guid/summary`
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub name: String,
    #[serde(default)]
    pub instances: Option<u32>,
    #[serde(default)]
    pub running_instances: Option<u32>,
    #[serde(default)]
    pub state: String,
}

/// `GET /v2/info`
#[derive(Debug, Clone, Deserialize)]
pub struct InfoResponse {
    /// UAA base URL
    pub token_endpoint: String,

    /// Websocket endpoint of the loggregator/Doppler firehose
    pub doppler_logging_endpoint: Option<String>,

    #[serde(default)]
    pub api_version: Option<String>,
}

/// `POST /oauth/token` response of the UAA
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,

    /// Lifetime of the access token in seconds
    pub expires_in: Option<i64>,
}

impl From<Resource<NamedEntity>> for AppRef {
    fn from(resource: Resource<NamedEntity>) -> Self {
        AppRef {
            guid: resource.metadata.guid,
            name: resource.entity.name,
        }
    }
}

impl From<SummaryResponse> for AppSummary {
    fn from(summary: SummaryResponse) -> Self {
        AppSummary {
            name: summary.name,
            instances: summary.instances.unwrap_or_default(),
            running_instances: summary.running_instances.unwrap_or_default(),
            state: summary.state,
        }
    }
}

impl From<EventEntity> for AppEvent {
    fn from(event: EventEntity) -> Self {
        AppEvent {
            event_type: event.event_type,
            actor_name: event.actor_name,
            actor_type: event.actor_type,
            actee_name: event.actee_name,
            actee_type: event.actee_type,
            timestamp: event.timestamp,
        }
    }
}
