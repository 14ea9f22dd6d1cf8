//! Token handshake for container registries.
//!
//! A distribution registry answers an unauthenticated manifest request with
//! `401` and a challenge such as
//! `Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:owner/app:pull"`.
//! The client fetches a short-lived token from `realm` and repeats the request
//! with `Authorization: Bearer <token>`.

use serde::Deserialize;

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parses a `WWW-Authenticate` value. Returns `None` for other schemes or
    /// when no realm is given.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in auth_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm.filter(|r| !r.is_empty())?,
            service,
            scope,
        })
    }

    /// Query parameters for the token request.
    pub fn query(&self) -> Vec<(&str, &str)> {
        let mut query = Vec::new();
        if let Some(service) = &self.service {
            query.push(("service", service.as_str()));
        }
        if let Some(scope) = &self.scope {
            query.push(("scope", scope.as_str()));
        }
        query
    }
}

/// Token endpoint response. Registries use either field name.
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub token: Option<String>,
    pub access_token: Option<String>,
}

impl TokenResponse {
    pub fn into_token(self) -> Option<String> {
        self.token
            .or(self.access_token)
            .filter(|t| !t.is_empty())
    }
}

/// Splits `key=value` pairs separated by commas. Quoted values may contain
/// commas (`scope="repository:a:pull,push"`).
fn auth_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = input.trim_start();

    while let Some((key, after)) = rest.split_once('=') {
        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            },
        };

        params.push((key.trim().to_string(), value.trim().to_string()));
        rest = remainder.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }

    params
}
