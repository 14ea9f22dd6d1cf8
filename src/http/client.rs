//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_response};

/// HTTP client with built-in retry logic for registry API calls.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_delay_ms: u64,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry_delay_ms: RETRY_DELAY_MS,
        }
    }

    /// Overrides the pause between retry attempts.
    pub fn with_retry_delay(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Performs a GET request and deserializes the JSON response.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_query(url, &[]).await
    }

    /// Performs a GET request with query parameters and deserializes the JSON response.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!("GET JSON from {} with query {:?}...", url, query);

        self.with_retry("GET JSON", || async {
            let response = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .context("Failed to send request")?;

            let response = check_response(response).await?;

            let result = response
                .json::<T>()
                .await
                .context("Failed to parse JSON response")?;

            Ok(result)
        })
        .await
    }

    /// Performs a GET request with extra headers and deserializes the JSON response.
    /// The body is parsed regardless of the content type the server reports.
    #[tracing::instrument(skip(self, headers))]
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T> {
        debug!("GET JSON from {} with custom headers...", url);

        self.with_retry("GET JSON with headers", || async {
            let response = self
                .client
                .get(url)
                .headers(headers.clone())
                .send()
                .await
                .context("Failed to send request")?;

            let response = check_response(response).await?;

            let body = response
                .bytes()
                .await
                .context("Failed to read response body")?;

            serde_json::from_slice::<T>(&body).context("Failed to parse JSON response")
        })
        .await
    }

    /// Performs a GET request authenticated with HTTP basic auth and
    /// deserializes the JSON response. Replaces any default `Authorization`.
    #[tracing::instrument(skip(self, query, password))]
    pub async fn get_json_with_basic_auth<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        username: &str,
        password: &str,
    ) -> Result<T> {
        debug!("GET JSON from {} as {}...", url, username);

        self.with_retry("GET JSON with basic auth", || async {
            let response = self
                .client
                .get(url)
                .query(query)
                .basic_auth(username, Some(password))
                .send()
                .await
                .context("Failed to send request")?;

            let response = check_response(response).await?;

            response
                .json::<T>()
                .await
                .context("Failed to parse JSON response")
        })
        .await
    }

    /// Performs a DELETE request.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, url: &str) -> Result<()> {
        debug!("DELETE {}...", url);

        self.with_retry("DELETE", || async {
            let response = self
                .client
                .delete(url)
                .send()
                .await
                .context("Failed to send request")?;

            check_response(response).await?;
            Ok(())
        })
        .await
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable_error(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name, attempt, MAX_RETRIES, e, self.retry_delay_ms
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(self.retry_delay_ms))
                            .await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

/// Checks if an anyhow::Error is retryable based on its content.
fn is_retryable_error(e: &anyhow::Error) -> bool {
    // Retry everything that isn't explicitly non-retryable
    e.downcast_ref::<NonRetryableError>().is_none()
}
