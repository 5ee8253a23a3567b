//! # Catalog HTTP Plumbing
//!
//! JSON GET requests shared by the catalog clients: per-request timeout,
//! optional client-side rate limit, exponential backoff on transient
//! failures and cancellation.

use std::collections::VecDeque;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::{ResolveError, Result};

/// Grants at most `limit` permits in any sliding `window`
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            grants: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit as usize, Duration::from_secs(60))
    }

    /// Waits until a permit is available and takes it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut grants = self.grants.lock().await;
                let now = Instant::now();
                while grants
                    .front()
                    .is_some_and(|granted| now.duration_since(*granted) >= self.window)
                {
                    grants.pop_front();
                }
                if grants.len() < self.limit {
                    grants.push_back(now);
                    return;
                }
                grants
                    .front()
                    .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            };
            if let Some(wait) = wait {
                debug!(?wait, "Rate limit reached, waiting");
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// JSON-over-HTTP access to one catalog's API
#[derive(Debug)]
pub struct CatalogHttp {
    catalog: String,
    client: Client,
    base_url: Url,
    limiter: Option<RateLimiter>,
    retry: RetrySettings,
}

impl CatalogHttp {
    pub fn new(
        catalog: &str,
        base_url: &str,
        timeout: Duration,
        headers: HeaderMap,
        limiter: Option<RateLimiter>,
        retry: RetrySettings,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ResolveError::transport(catalog, e))?;
        let base_url = Url::parse(base_url).map_err(|e| {
            ResolveError::invalid_argument(format!("invalid base URL '{}': {}", base_url, e))
        })?;

        Ok(Self {
            catalog: catalog.to_string(),
            client,
            base_url,
            limiter,
            retry,
        })
    }

    /// GETs `path` relative to the base URL and decodes the JSON body.
    ///
    /// Returns `None` on 404. Timeouts, connection failures, 429 and 5xx are
    /// retried until the retry budget runs out.
    pub async fn get_json<T>(&self, path: &str, cancel: &CancellationToken) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ResolveError::invalid_argument(format!("invalid path '{}': {}", path, e)))?;

        let policy = ExponentialBackoff {
            initial_interval: self.retry.initial_interval(),
            max_elapsed_time: Some(self.retry.max_elapsed()),
            ..Default::default()
        };
        let operation = || async {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            debug!(url = %url, "Sending catalog request");

            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| self.classify(e))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                warn!(url = %url, %status, "Transient catalog failure");
                return Err(backoff::Error::transient(ResolveError::transport(
                    &self.catalog,
                    format!("{} returned {}", url, status),
                )));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ResolveError::transport(
                    &self.catalog,
                    format!("{} returned {}", url, status),
                )));
            }

            response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| backoff::Error::permanent(ResolveError::transport(&self.catalog, e)))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            result = retry(policy, operation) => result,
        }
    }

    fn classify(&self, error: reqwest::Error) -> backoff::Error<ResolveError> {
        let transient = error.is_timeout() || error.is_connect();
        let error = ResolveError::transport(&self.catalog, error);
        if transient {
            backoff::Error::transient(error)
        } else {
            backoff::Error::permanent(error)
        }
    }
}

/// Encodes `values` as a URL-escaped JSON array for query parameters
pub fn json_query(values: &[String]) -> String {
    let json = serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string());
    urlencoding::encode(&json).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_waits_for_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_frees_expired_grants() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(11)).await;

        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_json_query_is_escaped() {
        let query = json_query(&["1.20.1".to_string(), "1.20".to_string()]);
        assert_eq!(query, "%5B%221.20.1%22%2C%221.20%22%5D");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = CatalogHttp::new(
            "modrinth",
            "not a url",
            Duration::from_secs(1),
            HeaderMap::new(),
            None,
            RetrySettings::default(),
        );
        assert!(matches!(result, Err(ResolveError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_cancelled_request_returns_cancelled() {
        let http = CatalogHttp::new(
            "modrinth",
            "http://127.0.0.1:9/",
            Duration::from_secs(1),
            HeaderMap::new(),
            None,
            RetrySettings::default(),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<Option<serde_json::Value>> = http.get_json("projects", &cancel).await;
        assert!(matches!(result, Err(ResolveError::Cancelled)));
    }
}
