use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Failure classes for a lookup. All of them degrade to the fallback
/// fragment at the resolver layer; none is fatal to the page.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rate limited by the lookup service")]
    RateLimited,
    #[error("no record for that lookup")]
    NotFound,
    #[error("transport failure")]
    Transport(#[source] reqwest::Error),
    #[error("malformed response body")]
    Malformed(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    pub avatar_url: String,
    #[serde(default)]
    pub bio: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub html_url: String,
    #[serde(default)]
    pub comments: i64,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("github client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let base_url = Url::parse(&base).context("parse api base url")?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    /// Looks up a profile by handle. One request, no retries.
    pub fn user(&self, handle: &str) -> Result<UserRecord, ApiError> {
        let url = format!("{}/users/{}", self.base(), handle);
        let response = self.get(&url)?;
        decode(check_status(response)?)
    }

    /// Issue/discussion search. The endpoint is appended to the configured
    /// base, so a base with a path prefix keeps it. The query is passed as
    /// a single `q` parameter; encoding is handled by the URL builder.
    pub fn search_issues(&self, query: &str) -> Result<SearchResults, ApiError> {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["search", "issues"]);
        }
        url.query_pairs_mut().append_pair("q", query);
        let response = self.get(url.as_str())?;
        decode(check_status(response)?)
    }

    fn get(&self, url: &str) -> Result<Response, ApiError> {
        self.http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .map_err(ApiError::Transport)
    }

    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

fn check_status(response: Response) -> Result<Response, ApiError> {
    match response.status() {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        _ => response.error_for_status().map_err(ApiError::Transport),
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response.json().map_err(|err| {
        if err.is_decode() {
            ApiError::Malformed(err)
        } else {
            ApiError::Transport(err)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_user_agent() {
        let result = Client::new(ClientConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn accepts_base_url_override() {
        let client = Client::new(ClientConfig {
            user_agent: "sitenotes-test/0".into(),
            base_url: Some("http://127.0.0.1:9/".into()),
            http_client: None,
        })
        .unwrap();
        assert_eq!(client.base(), "http://127.0.0.1:9");
    }
}
