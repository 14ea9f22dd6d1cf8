//! Retry logic for registry API calls with error classification.
//!
//! Every non-success response is turned into an error whose message carries
//! the HTTP status code and the registry's own explanation. The deletion
//! executor classifies failures by that message, so both must survive.

use anyhow::Result;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

/// Maximum number of retry attempts for network operations.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Errors that should not be retried.
#[derive(Debug)]
pub enum NonRetryableError {
    /// Rate limit exceeded (HTTP 403 with rate limit message or 429)
    RateLimitExceeded(String),
    /// Authentication failed (HTTP 401)
    AuthenticationFailed(String),
    /// HTTP 401 carrying a `WWW-Authenticate` challenge: (challenge, message)
    AuthenticationRequired(String, String),
    /// Resource not found (HTTP 404)
    NotFound(String),
    /// Forbidden access (HTTP 403 non-rate-limit)
    Forbidden(String),
    /// Other client errors that won't succeed on retry
    ClientError(u16, String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimitExceeded(msg) => {
                write!(
                    f,
                    "API rate limit exceeded: {}. Try again later or use a token with a higher quota.",
                    msg
                )
            }
            NonRetryableError::AuthenticationFailed(msg) => {
                write!(
                    f,
                    "HTTP 401 authentication failed: {}. Check PACKAGE_TOKEN.",
                    msg
                )
            }
            NonRetryableError::AuthenticationRequired(_, msg) => {
                write!(f, "HTTP 401 authentication required: {}", msg)
            }
            NonRetryableError::NotFound(msg) => {
                write!(f, "HTTP 404 not found: {}", msg)
            }
            NonRetryableError::Forbidden(msg) => {
                write!(f, "HTTP 403 forbidden: {}", msg)
            }
            NonRetryableError::ClientError(status, msg) => {
                write!(f, "HTTP {} request error: {}", status, msg)
            }
        }
    }
}

impl std::error::Error for NonRetryableError {}

impl NonRetryableError {
    /// The server's `WWW-Authenticate` challenge, if it sent one.
    pub fn challenge(&self) -> Option<&str> {
        match self {
            NonRetryableError::AuthenticationRequired(challenge, _) => Some(challenge),
            _ => None,
        }
    }
}

/// GitHub wraps error explanations as `{"message": "..."}`.
#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Extracts a human-readable message from an error response body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Classifies a failed response by status code.
/// Returns `None` if the failure is retryable.
pub fn classify_status(status: StatusCode, message: &str) -> Option<NonRetryableError> {
    let message = if message.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no details")
            .to_string()
    } else {
        message.to_string()
    };

    match status {
        StatusCode::UNAUTHORIZED => Some(NonRetryableError::AuthenticationFailed(message)),
        StatusCode::FORBIDDEN => {
            if message.to_lowercase().contains("rate limit") {
                Some(NonRetryableError::RateLimitExceeded(message))
            } else {
                Some(NonRetryableError::Forbidden(message))
            }
        }
        StatusCode::TOO_MANY_REQUESTS => Some(NonRetryableError::RateLimitExceeded(message)),
        StatusCode::NOT_FOUND => Some(NonRetryableError::NotFound(message)),
        // Other 4xx client errors are generally not retryable
        s if s.is_client_error() => Some(NonRetryableError::ClientError(s.as_u16(), message)),
        // 5xx server errors are retryable
        _ => None,
    }
}

/// Passes successful responses through and converts failures into errors.
/// Non-retryable failures become [`NonRetryableError`]; everything else stays
/// a plain error so the retry loop tries again.
pub async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let challenge = response
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);

    if let (StatusCode::UNAUTHORIZED, Some(challenge)) = (status, challenge) {
        let message = if message.is_empty() {
            "Unauthorized".to_string()
        } else {
            message
        };
        return Err(anyhow::Error::from(NonRetryableError::AuthenticationRequired(
            challenge, message,
        )));
    }

    match classify_status(status, &message) {
        Some(non_retryable) => Err(anyhow::Error::from(non_retryable)),
        None => Err(anyhow::anyhow!("HTTP {}: {}", status.as_u16(), message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_retryable_error_display() {
        let err = NonRetryableError::RateLimitExceeded("test".to_string());
        assert!(err.to_string().contains("rate limit"));

        let err = NonRetryableError::AuthenticationFailed("test".to_string());
        assert!(err.to_string().contains("authentication"));
        assert!(err.to_string().contains("PACKAGE_TOKEN"));

        let err = NonRetryableError::NotFound("test".to_string());
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("not found"));

        let err = NonRetryableError::Forbidden("test".to_string());
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_client_error_display_keeps_registry_message() {
        let err = NonRetryableError::ClientError(
            400,
            "Publicly visible package versions with more than 5000 downloads cannot be deleted."
                .to_string(),
        );
        assert!(err.to_string().contains("HTTP 400"));
        assert!(err.to_string().contains("more than 5000 downloads"));
    }

    #[test]
    fn test_error_message_from_json_body() {
        let body = r#"{"message": "Package not found.", "documentation_url": "https://docs"}"#;
        assert_eq!(error_message(body), "Package not found.");
    }

    #[test]
    fn test_error_message_from_plain_body() {
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_classify_status_unauthorized() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "Bad credentials"),
            Some(NonRetryableError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_classify_status_forbidden() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "Resource not accessible"),
            Some(NonRetryableError::Forbidden(_))
        ));
    }

    #[test]
    fn test_classify_status_forbidden_rate_limit() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "API rate limit exceeded for user"),
            Some(NonRetryableError::RateLimitExceeded(_))
        ));
    }

    #[test]
    fn test_classify_status_too_many_requests() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Some(NonRetryableError::RateLimitExceeded(_))
        ));
    }

    #[test]
    fn test_classify_status_not_found_uses_reason_when_empty() {
        let err = classify_status(StatusCode::NOT_FOUND, "").unwrap();
        assert_eq!(err.to_string(), "HTTP 404 not found: Not Found");
    }

    #[test]
    fn test_classify_status_other_client_error() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad"),
            Some(NonRetryableError::ClientError(400, _))
        ));
    }

    #[test]
    fn test_classify_status_server_error_is_retryable() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, "oops").is_none());
    }

    #[tokio::test]
    async fn test_check_response_non_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(404)
            .with_body(r#"{"message": "Package version not found."}"#)
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        let err = check_response(response).await.unwrap_err();

        let non_retryable = err.downcast_ref::<NonRetryableError>().unwrap();
        assert!(matches!(non_retryable, NonRetryableError::NotFound(_)));
        assert!(err.to_string().contains("Package version not found."));
    }

    #[tokio::test]
    async fn test_check_response_keeps_auth_challenge() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(401)
            .with_header(
                "www-authenticate",
                r#"Bearer realm="https://ghcr.io/token",service="ghcr.io""#,
            )
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        let err = check_response(response).await.unwrap_err();

        let non_retryable = err.downcast_ref::<NonRetryableError>().unwrap();
        assert_eq!(
            non_retryable.challenge(),
            Some(r#"Bearer realm="https://ghcr.io/token",service="ghcr.io""#)
        );
        assert!(err.to_string().contains("HTTP 401"));
    }

    #[tokio::test]
    async fn test_check_response_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        let err = check_response(response).await.unwrap_err();

        assert!(err.downcast_ref::<NonRetryableError>().is_none());
        assert_eq!(err.to_string(), "HTTP 503: maintenance");
    }

    #[tokio::test]
    async fn test_check_response_success() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(204)
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        assert!(check_response(response).await.is_ok());
    }
}
