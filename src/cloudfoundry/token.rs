//! Bearer tokens from the UAA
//!
//! [`OAuthTokenSource`] hands out the cached access token while it is fresh
//! and otherwise fetches a new one, preferring the refresh-token grant and
//! falling back to the password grant when credentials are configured.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::TokenSource;
use super::error::TokenError;
use super::model::TokenResponse;

/// Tokens expiring sooner than this are refreshed ahead of time
const EXPIRY_MARGIN: TimeDelta = TimeDelta::seconds(30);

/// OAuth client the cf CLI registers with the UAA
const CLIENT_ID: &str = "cf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,

    /// `None` when the token does not tell; such tokens are treated as fresh
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_none_or(|expiry| {
            expiry
                .checked_sub_signed(EXPIRY_MARGIN)
                .is_some_and(|deadline| deadline > now)
        })
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Parse a pre-issued access token of the form `<header>.<payload>.<signature>`.
///
/// An optional `bearer ` prefix is stripped. The expiry is read from the
/// `exp` claim of the payload.
pub fn parse_bearer_token(
    access_token: &str,
    refresh_token: Option<String>,
) -> Result<Token, TokenError> {
    let access_token = access_token.trim();
    let access_token = access_token
        .strip_prefix("bearer ")
        .or_else(|| access_token.strip_prefix("Bearer "))
        .unwrap_or(access_token);

    let parts: Vec<&str> = access_token.split('.').collect();
    let [_, payload, _] = parts.as_slice() else {
        return Err(TokenError::Invalid("invalid token syntax".to_string()));
    };

    let claims = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|e| TokenError::Invalid(format!("error decoding token claims segment: {e}")))?;
    let claims: Claims = serde_json::from_slice(&claims)
        .map_err(|e| TokenError::Invalid(format!("error decoding token claims: {e}")))?;

    Ok(Token {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.filter(|t| !t.is_empty()),
        expiry: DateTime::from_timestamp(claims.exp, 0),
    })
}

/// Token source backed by the UAA `/oauth/token` endpoint
pub struct OAuthTokenSource {
    http: reqwest::Client,

    /// Full URL of the token endpoint
    token_url: String,

    /// Username and password for the password grant
    password: Option<(String, String)>,

    /// Last token handed out
    current: Mutex<Option<Token>>,
}

impl OAuthTokenSource {
    /// Create a token source for the UAA at `token_endpoint`.
    pub fn new(http: reqwest::Client, token_endpoint: &str) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth/token", token_endpoint.trim_end_matches('/')),
            password: None,
            current: Mutex::new(None),
        }
    }

    pub fn with_password(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.password = Some((username.into(), password.into()));
        self
    }

    /// Seed the source with a pre-issued token
    pub fn with_token(self, token: Token) -> Self {
        Self {
            current: Mutex::new(Some(token)),
            ..self
        }
    }

    async fn password_grant(&self) -> Result<Token, TokenError> {
        let Some((username, password)) = &self.password else {
            return Err(TokenError::NoCredentials);
        };
        debug!("requesting token with password grant");
        self.request(&[
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Token, TokenError> {
        debug!("requesting token with refresh grant");
        self.request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn request(&self, form: &[(&str, &str)]) -> Result<Token, TokenError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(CLIENT_ID, Some(""))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response.json().await?;
        let expiry = body
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .or_else(|| {
                parse_bearer_token(&body.access_token, None)
                    .ok()
                    .and_then(|t| t.expiry)
            });

        Ok(Token {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expiry,
        })
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    #[instrument(skip(self), fields(url = %self.token_url))]
    async fn token(&self) -> Result<String, TokenError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref()
            && token.is_fresh(Utc::now())
        {
            return Ok(token.access_token.clone());
        }

        let refresh_token = current.as_ref().and_then(|t| t.refresh_token.clone());
        let mut token = match refresh_token.as_deref() {
            Some(refresh_token) => match self.refresh_grant(refresh_token).await {
                Ok(token) => token,
                Err(e) if self.password.is_some() => {
                    warn!("refresh grant failed, falling back to password grant: {e}");
                    self.password_grant().await?
                }
                Err(e) => return Err(e),
            },
            None if self.password.is_some() => self.password_grant().await?,
            None if current.is_some() => return Err(TokenError::Expired),
            None => return Err(TokenError::NoCredentials),
        };

        // the UAA does not always rotate refresh tokens
        if token.refresh_token.is_none() {
            token.refresh_token = refresh_token;
        }

        let access_token = token.access_token.clone();
        *current = Some(token);
        Ok(access_token)
    }
}

/// Build the HTTP client shared by the API client and the token source
pub fn http_client(timeout: Duration, insecure: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure)
        .build()
}
