//! HTTP client for the Cloud Foundry v2 API
//!
//! ## Request Flow
//!
//! ```text
//! connect: GET /v2/info → token endpoint + doppler endpoint → OAuthTokenSource
//!
//! list_applications:   GET /v2/organizations?q=name:ORG
//!                      GET /v2/organizations/:org/spaces?q=name:SPACE   (cached)
//!                      GET /v2/spaces/:space/apps                       (all pages)
//! application_summary: GET /v2/apps/:guid/summary                       (404 → NotFound)
//! events_since:        GET /v2/events?q=actee:GUID&q=timestamp>SINCE    (all pages)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};
use url::Url;

use crate::config::TargetConfig;

use super::model::{EventEntity, InfoResponse, NamedEntity, Page, Resource, SummaryResponse};
use super::token::{OAuthTokenSource, http_client, parse_bearer_token};
use super::{AppEvent, AppRef, AppSummary, ControlPlane, ControlPlaneError, TokenSource};

const RESULTS_PER_PAGE: &str = "100";

/// Client for one Cloud Foundry API endpoint
pub struct CloudFoundryClient {
    /// HTTP client (reused across requests, carries the per-call timeout)
    http: reqwest::Client,

    /// Base URL of the API
    api: Url,

    /// Endpoints advertised by `/v2/info`
    info: InfoResponse,

    tokens: Arc<dyn TokenSource>,

    /// Resolved space guids keyed by (org, space) name
    spaces: RwLock<HashMap<(String, String), String>>,
}

impl CloudFoundryClient {
    /// Connect to the API described by `target`.
    ///
    /// Fetches `/v2/info` and builds the token source from the configured
    /// credentials. Fails on an unusable address or an unreachable API.
    pub async fn connect(target: &TargetConfig) -> Result<Self, ControlPlaneError> {
        let api = Url::parse(&target.api).map_err(|e| ControlPlaneError::InvalidAddress {
            address: target.api.clone(),
            reason: e.to_string(),
        })?;

        let http = http_client(target.rpc_timeout(), target.insecure).map_err(|source| {
            ControlPlaneError::Request {
                url: target.api.clone(),
                source,
            }
        })?;

        let info: InfoResponse = fetch_json(&http, join(&api, "/v2/info")?, None).await?;
        debug!(
            "connected to {} (api version {})",
            api,
            info.api_version.as_deref().unwrap_or("unknown")
        );

        let mut tokens = OAuthTokenSource::new(http.clone(), &info.token_endpoint);
        if let (Some(username), Some(password)) = (&target.username, &target.password) {
            tokens = tokens.with_password(username.clone(), password.clone());
        }
        if let Some(access_token) = target.access_token.as_deref().filter(|t| !t.is_empty()) {
            let token = parse_bearer_token(access_token, target.refresh_token.clone())?;
            tokens = tokens.with_token(token);
        }

        Ok(Self::new(http, api, info, Arc::new(tokens)))
    }

    pub fn new(
        http: reqwest::Client,
        api: Url,
        info: InfoResponse,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            api,
            info,
            tokens,
            spaces: RwLock::new(HashMap::new()),
        }
    }

    /// Token source used for API calls, shared with the firehose
    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        self.tokens.clone()
    }

    /// Websocket endpoint of the firehose, if the platform advertises one
    pub fn doppler_endpoint(&self) -> Option<&str> {
        self.info.doppler_logging_endpoint.as_deref()
    }

    /// Resolve the guid of `space` in `org`, caching the result.
    #[instrument(skip(self))]
    pub async fn resolve_space(&self, org: &str, space: &str) -> Result<String, ControlPlaneError> {
        let key = (org.to_string(), space.to_string());
        if let Some(guid) = self.spaces.read().await.get(&key) {
            return Ok(guid.clone());
        }

        let orgs: Vec<Resource<NamedEntity>> = self
            .get_all("/v2/organizations", &[("q", format!("name:{org}"))])
            .await?;
        let org_guid = orgs
            .into_iter()
            .find(|o| o.entity.name == org)
            .map(|o| o.metadata.guid)
            .ok_or_else(|| ControlPlaneError::OrgNotFound(org.to_string()))?;

        let spaces: Vec<Resource<NamedEntity>> = self
            .get_all(
                &format!("/v2/organizations/{org_guid}/spaces"),
                &[("q", format!("name:{space}"))],
            )
            .await?;
        let space_guid = spaces
            .into_iter()
            .find(|s| s.entity.name == space)
            .map(|s| s.metadata.guid)
            .ok_or_else(|| ControlPlaneError::SpaceNotFound {
                org: org.to_string(),
                space: space.to_string(),
            })?;

        trace!("resolved space {org}/{space} to {space_guid}");
        self.spaces.write().await.insert(key, space_guid.clone());
        Ok(space_guid)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ControlPlaneError> {
        let token = self.tokens.token().await?;
        fetch_json(&self.http, url, Some(&token)).await
    }

    /// Fetch every page of a listing
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Resource<T>>, ControlPlaneError> {
        let mut url = join(&self.api, path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("results-per-page", RESULTS_PER_PAGE);
        }

        let mut resources = Vec::new();
        loop {
            let page: Page<T> = self.get(url).await?;
            resources.extend(page.resources);

            match page.next_url {
                Some(next) => url = join(&self.api, &next)?,
                None => break,
            }
        }

        Ok(resources)
    }
}

#[async_trait]
impl ControlPlane for CloudFoundryClient {
    #[instrument(skip(self))]
    async fn list_applications(
        &self,
        org: &str,
        space: &str,
    ) -> Result<Vec<AppRef>, ControlPlaneError> {
        let space_guid = self.resolve_space(org, space).await?;
        let apps: Vec<Resource<NamedEntity>> = self
            .get_all(&format!("/v2/spaces/{space_guid}/apps"), &[])
            .await?;

        Ok(apps.into_iter().map(AppRef::from).collect())
    }

    #[instrument(skip(self))]
    async fn application_summary(&self, guid: &str) -> Result<AppSummary, ControlPlaneError> {
        let url = join(&self.api, &format!("/v2/apps/{guid}/summary"))?;
        let summary: SummaryResponse = self.get(url).await.map_err(|e| match e {
            ControlPlaneError::NotFound { .. } => ControlPlaneError::NotFound {
                resource: format!("application {guid}"),
            },
            e => e,
        })?;

        Ok(summary.into())
    }

    #[instrument(skip(self))]
    async fn events_since(
        &self,
        guid: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AppEvent>, ControlPlaneError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let events: Vec<Resource<EventEntity>> = self
            .get_all(
                "/v2/events",
                &[
                    ("q", format!("actee:{guid}")),
                    ("q", format!("timestamp>{since}")),
                    ("order-direction", "asc".to_string()),
                ],
            )
            .await?;

        Ok(events.into_iter().map(|e| e.entity.into()).collect())
    }
}

fn join(base: &Url, path: &str) -> Result<Url, ControlPlaneError> {
    base.join(path).map_err(|e| ControlPlaneError::InvalidAddress {
        address: format!("{base}{path}"),
        reason: e.to_string(),
    })
}

async fn fetch_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: Url,
    token: Option<&str>,
) -> Result<T, ControlPlaneError> {
    trace!("GET {url}");

    let mut request = http.get(url.clone());
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|source| ControlPlaneError::Request {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ControlPlaneError::NotFound {
            resource: url.path().to_string(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| ControlPlaneError::Request {
            url: url.to_string(),
            source,
        })?;

    if !status.is_success() {
        return Err(ControlPlaneError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| ControlPlaneError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
