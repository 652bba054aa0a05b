//! Error types for control plane operations

use thiserror::Error;

/// Errors returned by [`super::ControlPlane`] implementations
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// The requested resource does not exist (HTTP 404)
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The API answered with a non-success status
    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The request could not be sent or timed out
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not match the expected shape
    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// No bearer token could be obtained for the request
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("organization {0} not found")]
    OrgNotFound(String),

    #[error("space {space} not found in organization {org}")]
    SpaceNotFound { org: String, space: String },

    /// The configured API address is unusable
    #[error("invalid API address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

impl ControlPlaneError {
    /// Whether the error means the resource is gone for good.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound { .. })
    }
}

/// Errors produced while obtaining a bearer token
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token endpoint rejected the grant
    #[error("token endpoint rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The pre-issued token has expired and nothing can refresh it
    #[error("access token expired and no credentials are available to refresh it")]
    Expired,

    /// A pre-issued token could not be parsed
    #[error("invalid token: {0}")]
    Invalid(String),

    /// No way of obtaining a token was configured
    #[error("no credentials configured")]
    NoCredentials,
}
