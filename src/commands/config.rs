use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::{
    http::HttpClient,
    registry::GitHubRegistry,
    runtime::{Runtime, first_env_var},
};

/// Token variables, in order of preference.
pub const TOKEN_ENV_VARS: [&str; 2] = ["PACKAGE_TOKEN", "GITHUB_TOKEN"];

pub struct Config<R: Runtime> {
    pub runtime: R,
    pub registry: GitHubRegistry,
}

impl<R: Runtime> Config<R> {
    pub fn new(runtime: R, api_url: &str, registry_url: &str) -> Result<Self> {
        let token = first_env_var(&runtime, &TOKEN_ENV_VARS).map(|t| t.trim().to_string());

        let mut headers = HeaderMap::new();
        if let Some(token) = &token {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using token for authentication: {}", mask(token));
        } else {
            debug!("No PACKAGE_TOKEN or GITHUB_TOKEN set, sending unauthenticated requests");
        }

        let client = Client::builder()
            .user_agent(concat!("package-cleanup/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let mut registry = GitHubRegistry::new(HttpClient::new(client), api_url, registry_url);
        if let Some(token) = token {
            registry = registry.with_credentials(token);
        }

        Ok(Self { runtime, registry })
    }
}

fn mask(token: &str) -> String {
    match (token.get(..8), token.get(token.len().saturating_sub(4)..)) {
        (Some(head), Some(tail)) if token.len() > 12 => format!("{}*********{}", head, tail),
        _ => "*********".to_string(),
    }
}
