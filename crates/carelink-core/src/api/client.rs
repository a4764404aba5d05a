//! API client for the carelink backend.
//!
//! Every request goes through `execute`, which owns the retry policy:
//! one coordinated token refresh on 401, one `retry-after` wait on 429,
//! and bounded backoff on connection failures for GETs only.

use std::time::Duration;

use futures::future::FutureExt;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{RefreshCoordinator, RefreshError, RefreshFn, SessionCache, Tokens};
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh-token";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const CURRENT_USER_PATH: &str = "/auth/user";

/// Wait used when a 429 carries no usable `retry-after` header
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Extra attempts for GETs that fail to connect or time out
const MAX_NETWORK_RETRIES: u32 = 2;

/// First backoff delay for network retries, doubled each attempt
const INITIAL_BACKOFF_MS: u64 = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    access_token: String,
    refresh_token: Option<String>,
}

/// The refresh endpoint answers either flat or nested under `tokens`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefreshResponse {
    Nested { tokens: TokenPayload },
    Flat(TokenPayload),
}

impl RefreshResponse {
    /// Keep the old refresh token when the server does not rotate it.
    fn into_tokens(self, previous_refresh: String) -> Tokens {
        let payload = match self {
            RefreshResponse::Nested { tokens } => tokens,
            RefreshResponse::Flat(tokens) => tokens,
        };
        Tokens::new(
            payload.access_token,
            payload.refresh_token.unwrap_or(previous_refresh),
        )
    }
}

/// API client for the portal backend.
/// Clone is cheap: the HTTP pool, session cache and refresh state are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionCache,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(config: &Config, session: SessionCache) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let refresher = RefreshCoordinator::new(
            session.clone(),
            Self::refresh_fn(client.clone(), base_url.clone()),
        );
        Ok(Self {
            client,
            base_url,
            session,
            refresher,
        })
    }

    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// The network side of a token refresh, handed to the coordinator.
    fn refresh_fn(client: Client, base_url: String) -> RefreshFn {
        std::sync::Arc::new(move |refresh_token: String| {
            let client = client.clone();
            let url = format!("{}{}", base_url, REFRESH_PATH);
            async move {
                let response = client
                    .post(&url)
                    .json(&RefreshRequest {
                        refresh_token: &refresh_token,
                    })
                    .send()
                    .await
                    .map_err(|e| RefreshError::Rejected(format!("refresh request failed: {}", e)))?;

                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    let err = ApiError::from_status(status, &body);
                    return Err(RefreshError::Rejected(err.to_string()));
                }
                let parsed: RefreshResponse = serde_json::from_str(&body)
                    .map_err(|e| RefreshError::Rejected(format!("invalid refresh response: {}", e)))?;
                Ok(parsed.into_tokens(refresh_token))
            }
            .boxed()
        })
    }

    /// Seconds to wait from a 429's `retry-after` header.
    fn retry_after(headers: &header::HeaderMap) -> Duration {
        headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(DEFAULT_RETRY_AFTER_SECS))
    }

    /// Access token for the next request, and whether a refresh was spent
    /// getting it. With only a refresh token left, refresh first; with
    /// neither, fail without touching the network.
    async fn bearer_token(&self) -> Result<(String, bool), ApiError> {
        if let Some(token) = self.session.access_token() {
            return Ok((token, false));
        }
        if self.session.refresh_token().is_none() {
            return Err(ApiError::AuthenticationRequired("no active session".to_string()));
        }
        debug!("No access token cached, refreshing before request");
        let tokens = self.refresher.refresh().await?;
        Ok((tokens.access_token, true))
    }

    /// Send a request with the full retry policy.
    ///
    /// `build` is called once per attempt to attach the body, since bodies
    /// such as multipart forms cannot be reused. A `build` error is returned
    /// before anything is sent.
    pub async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        authenticated: bool,
        build: F,
    ) -> Result<Response, ApiError>
    where
        F: Fn(RequestBuilder) -> Result<RequestBuilder, ApiError>,
    {
        let url = self.url(path);
        // One refresh per request, including one spent before the first send
        let (mut token, mut refreshed) = if authenticated {
            let (token, refreshed) = self.bearer_token().await?;
            (Some(token), refreshed)
        } else {
            (None, false)
        };
        let mut rate_limited = false;
        let mut network_retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = build(self.client.request(method.clone(), &url))?;
            if let Some(ref token) = token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = ApiError::Network(e);
                    if method == Method::GET && err.is_transient() && network_retries < MAX_NETWORK_RETRIES {
                        network_retries += 1;
                        warn!(url = %url, retry = network_retries, backoff_ms, "Request failed, retrying");
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms *= 2;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            debug!(method = %method, url = %url, status = %status, "Response received");

            if status.is_success() {
                return Ok(response);
            }
            match status {
                StatusCode::UNAUTHORIZED if authenticated => {
                    if refreshed {
                        return Err(ApiError::AuthenticationRequired(
                            "access token rejected after refresh".to_string(),
                        ));
                    }
                    refreshed = true;
                    let tokens = self.refresher.refresh().await?;
                    token = Some(tokens.access_token);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    if rate_limited {
                        return Err(ApiError::RateLimited);
                    }
                    rate_limited = true;
                    let wait = Self::retry_after(response.headers());
                    warn!(url = %url, wait_ms = wait.as_millis() as u64, "Rate limited, waiting before retry");
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::from_status(status, &body));
                }
            }
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("failed to parse response from {}: {}", url, e))
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(Method::GET, path, true, Ok).await?;
        Self::parse_json(response, path).await
    }

    pub async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.execute(Method::GET, path, true, |r| Ok(r.query(query))).await?;
        Self::parse_json(response, path).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.execute(Method::POST, path, true, |r| Ok(r.json(body))).await?;
        Self::parse_json(response, path).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.execute(Method::PUT, path, true, |r| Ok(r.json(body))).await?;
        Self::parse_json(response, path).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.execute(Method::PATCH, path, true, |r| Ok(r.json(body))).await?;
        Self::parse_json(response, path).await
    }

    /// DELETE, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, path, true, Ok).await?;
        Ok(())
    }

    /// POST without a bearer token (login).
    pub async fn post_public<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.execute(Method::POST, path, false, |r| Ok(r.json(body))).await?;
        Self::parse_json(response, path).await
    }

    /// Authenticated POST whose response body is ignored.
    pub async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        self.execute(Method::POST, path, true, |r| Ok(r.json(body))).await?;
        Ok(())
    }
}
